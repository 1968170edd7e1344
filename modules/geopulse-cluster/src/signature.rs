//! Per-item signatures: entity label → set of normalised surface values,
//! combining NER output, structured extractors (numbers, dates, domains)
//! and the SEMANTIC keyword bucket. Weighted Jaccard over signatures is
//! the precision booster on top of the n-gram backbone; the key-identity
//! gate reads the PERSON/ORG/EVENT/LAW labels only.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use geopulse_common::{EntityLabel, EntityRecognizer};

use crate::text::{dominant_script, extract_numbers, extract_percents, extract_timewindows, is_stopword, Script};

pub type Signature = HashMap<String, BTreeSet<String>>;

/// The labels that can satisfy the identity gate on their own. GPE is
/// deliberately absent — a shared country never merges two stories.
pub const KEY_LABELS: [&str; 4] = ["PERSON", "ORG", "EVENT", "LAW"];

static RE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("url regex"));
static RE_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:[a-z0-9-]+\.)+[a-z]{2,}\b").expect("domain regex")
});
static RE_ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("iso date regex"));
static RE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19\d{2}|20\d{2}|2100)\b").expect("year regex"));
static RE_RT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*RT\s+@\w+:\s*").expect("rt regex"));
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("spaces regex"));
static RE_WORD_CLEAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s%]").expect("word clean regex"));

/// Higher weight ⇒ matters more for topic identity. Dates and cardinals
/// are cheap glue and stay low; the date *boundary* is a separate
/// penalty.
pub fn label_weight(label: &str) -> f64 {
    match label {
        "PERSON" => 2.0,
        "ORG" => 2.2,
        "GPE" => 0.9,
        "LOC" => 1.6,
        "FAC" => 1.4,
        "EVENT" => 2.8,
        "LAW" => 1.8,
        "PRODUCT" => 1.2,
        "WORK" => 1.0,
        "DATE" => 1.2,
        "TIME" => 0.8,
        "MONEY" => 0.8,
        "PERCENT" => 0.6,
        "QUANTITY" => 0.6,
        "ORDINAL" => 0.4,
        "CARDINAL" => 0.4,
        "NUM" => 0.7,
        "TW" => 0.7,
        "DOMAIN" => 1.0,
        "URL" => 0.4,
        "ISO_DATE" => 0.7,
        "YEAR" => 0.6,
        "SEMANTIC" => 1.0,
        _ => 1.0,
    }
}

/// Event-frame keyword map. The only place natural-language domain
/// knowledge enters the matcher; kept small and high-signal.
static EVENT_TYPE_KEYWORDS: LazyLock<Vec<(&'static str, HashSet<&'static str>)>> =
    LazyLock::new(|| {
        vec![
            ("protest", ["protest", "protests", "demonstration", "demonstrations", "rally", "rallies", "vigil", "march"].into()),
            ("violence", ["violence", "violent", "riot", "riots", "clash", "clashes", "unrest", "uprising"].into()),
            ("death", ["death", "deaths", "toll", "killed", "killing", "executed", "executions", "casualties", "fatalities"].into()),
            ("internet", ["blackout", "shutdown", "censorship", "blocked", "disrupted", "interrupted", "internet"].into()),
            ("regime", ["regime", "government", "authorities", "security", "forces", "crackdown", "repression"].into()),
            ("sanctions", ["sanctions", "embargo", "export", "ban", "banned", "restrictions", "diplomatic"].into()),
            ("media", ["footage", "video", "videos", "images", "photos", "journalist", "journalists", "coverage"].into()),
            ("activist", ["activist", "activists", "dissident", "dissidents", "rights", "freedom"].into()),
            ("disaster", ["earthquake", "quake", "magnitude", "aftershock", "tsunami", "eruption", "volcano", "flood", "flooding", "wildfire", "landslide", "cyclone", "hurricane", "typhoon"].into()),
        ]
    });

static EVENT_INDICATORS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "protest", "protests", "demonstration", "rally", "unrest", "uprising", "riot", "clash",
        "crackdown", "violence", "death", "deaths", "killed", "executed", "casualties",
        "fatalities", "blackout", "shutdown", "censorship", "blocked", "disrupted", "internet",
        "sanctions", "embargo", "crisis", "conflict", "war", "activist", "rights", "freedom",
        "earthquake", "tsunami", "eruption", "wildfire", "flood",
        "primary_protest", "primary_violence", "primary_death", "primary_internet",
        "primary_regime", "primary_disaster",
    ]
    .into()
});

const INDICATOR_TYPES: [&str; 7] =
    ["protest", "violence", "death", "internet", "regime", "sanctions", "disaster"];

/// NFKC, whitespace collapse, casefold.
fn norm_value(s: &str) -> String {
    let nfkc: String = s.trim().nfkc().collect();
    RE_SPACES.replace_all(&nfkc, " ").to_lowercase()
}

fn is_textual_label(label: EntityLabel) -> bool {
    !matches!(
        label,
        EntityLabel::Date
            | EntityLabel::Time
            | EntityLabel::Money
            | EntityLabel::Percent
            | EntityLabel::Cardinal
            | EntityLabel::Quantity
            | EntityLabel::Ordinal
    )
}

/// SEMANTIC tokens: event-type keywords become `<type>:<word>` plus a
/// dominant `primary_<type>`; other content words survive verbatim when
/// they are ≥6 chars or carry a digit/%.
pub fn extract_semantic_tokens(text: &str) -> BTreeSet<String> {
    let t = text.to_lowercase();
    let t = RE_URL.replace_all(&t, " ");
    let t = RE_WORD_CLEAN.replace_all(&t, " ");

    let mut tokens = BTreeSet::new();
    let mut type_hits: Vec<&'static str> = Vec::new();

    for w in t.split_whitespace() {
        if w.chars().count() < 3 || is_stopword(w) {
            continue;
        }

        let found = EVENT_TYPE_KEYWORDS
            .iter()
            .find(|(_, kws)| kws.contains(w))
            .map(|(ty, _)| *ty);

        if let Some(ty) = found {
            tokens.insert(format!("{ty}:{w}"));
            type_hits.push(ty);
            continue;
        }

        if w.chars().any(|c| c.is_ascii_digit()) || w.contains('%') {
            tokens.insert(w.to_string());
        } else if w.chars().count() >= 6 {
            tokens.insert(w.to_string());
        }
    }

    if !type_hits.is_empty() {
        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for ty in &type_hits {
            *counts.entry(*ty).or_default() += 1;
        }
        // Ties break alphabetically so the bucket is deterministic.
        let dominant = counts
            .into_iter()
            .max_by_key(|(ty, c)| (*c, std::cmp::Reverse(*ty)))
            .map(|(ty, _)| ty);
        if let Some(ty) = dominant {
            tokens.insert(format!("primary_{ty}"));
        }
    }

    tokens
}

/// Build (signature, script bucket) for a text.
pub fn extract_signature(ner: &dyn EntityRecognizer, raw: &str) -> (Signature, Script) {
    let mut sig = Signature::new();
    if raw.trim().is_empty() {
        return (sig, Script::Other);
    }

    let t = RE_RT.replace(raw.trim(), "").into_owned();
    let script = dominant_script(&t);

    for m in RE_URL.find_iter(&t) {
        sig.entry("URL".to_string()).or_default().insert(norm_value(m.as_str()));
    }
    for m in RE_DOMAIN.find_iter(&t) {
        sig.entry("DOMAIN".to_string()).or_default().insert(norm_value(m.as_str()));
    }

    for x in extract_numbers(&t) {
        sig.entry("NUM".to_string()).or_default().insert(x);
    }
    for x in extract_percents(&t) {
        sig.entry("PERCENT".to_string()).or_default().insert(x);
    }
    for x in extract_timewindows(&t) {
        sig.entry("TW".to_string()).or_default().insert(x);
    }
    for m in RE_ISO_DATE.find_iter(&t) {
        sig.entry("ISO_DATE".to_string()).or_default().insert(m.as_str().to_string());
    }
    for m in RE_YEAR.find_iter(&t) {
        sig.entry("YEAR".to_string()).or_default().insert(m.as_str().to_string());
    }

    for entity in ner.entities(&t) {
        let value = norm_value(&entity.text);
        if value.is_empty() {
            continue;
        }
        // Textual surfaces under 3 chars are NER noise; short numeric
        // values ("6", "17") are real signal and keep their own labels.
        if is_textual_label(entity.label) && value.chars().count() <= 2 {
            continue;
        }
        sig.entry(entity.label.as_str().to_string()).or_default().insert(value);
    }

    let semantic = extract_semantic_tokens(&t);
    if !semantic.is_empty() {
        sig.insert("SEMANTIC".to_string(), semantic);
    }

    (sig, script)
}

/// `{label=value}` strings for the cheap prefilter intersection.
pub fn flatten_features(sig: &Signature) -> HashSet<String> {
    sig.iter()
        .flat_map(|(label, values)| values.iter().map(move |v| format!("{label}={v}")))
        .collect()
}

/// Weighted Jaccard: Σ w·|A∩B| / Σ w·|A∪B| over labels.
pub fn weighted_jaccard(a: &Signature, b: &Signature) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let labels: HashSet<&String> = a.keys().chain(b.keys()).collect();
    let mut inter = 0.0;
    let mut union = 0.0;

    static EMPTY: LazyLock<BTreeSet<String>> = LazyLock::new(BTreeSet::new);
    for label in labels {
        let va = a.get(label).unwrap_or(&EMPTY);
        let vb = b.get(label).unwrap_or(&EMPTY);
        if va.is_empty() && vb.is_empty() {
            continue;
        }
        let w = label_weight(label.as_str());
        inter += w * va.intersection(vb).count() as f64;
        union += w * va.union(vb).count() as f64;
    }

    if union <= 1e-9 {
        return 0.0;
    }
    inter / union
}

/// Does this signature carry event-frame indicators in its SEMANTIC
/// bucket?
pub fn has_event_indicators(sig: &Signature) -> bool {
    let Some(sem) = sig.get("SEMANTIC") else {
        return false;
    };
    for token in sem {
        if EVENT_INDICATORS.contains(token.as_str()) {
            return true;
        }
        if let Some((ty, word)) = token.split_once(':') {
            if INDICATOR_TYPES.contains(&ty) || EVENT_INDICATORS.contains(word) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use geopulse_common::LexiconRecognizer;

    fn sig_of(text: &str) -> Signature {
        let ner = LexiconRecognizer::new();
        extract_signature(&ner, text).0
    }

    #[test]
    fn signature_carries_structured_and_ner_labels() {
        let sig = sig_of("Magnitude 6.2 earthquake shakes Tokyo on 2026-01-17; JMA issues alerts");
        assert!(sig["GPE"].contains("tokyo"), "{sig:?}");
        assert!(sig["ORG"].contains("jma"), "{sig:?}");
        assert!(sig["ISO_DATE"].contains("2026-01-17"), "{sig:?}");
        assert!(sig["YEAR"].contains("2026"), "{sig:?}");
        assert!(sig["NUM"].contains("6"), "{sig:?}");
        assert!(sig["SEMANTIC"].contains("disaster:earthquake"), "{sig:?}");
        assert!(sig["SEMANTIC"].contains("primary_disaster"), "{sig:?}");
    }

    #[test]
    fn values_are_normalized() {
        let sig = sig_of("Fires reported near TOKYO tonight");
        assert!(sig["GPE"].contains("tokyo"), "casefold: {sig:?}");
    }

    #[test]
    fn weighted_jaccard_identical_is_one() {
        let a = sig_of("Protests in Belgrade over 2026-03-01 election results");
        assert!((weighted_jaccard(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_jaccard_disjoint_is_zero() {
        let a = sig_of("Wildfire near Athens burns 400 hectares");
        let b = sig_of("Chipmaker profits beat expectations");
        assert!(weighted_jaccard(&a, &b) < 0.05, "{}", weighted_jaccard(&a, &b));
    }

    #[test]
    fn key_label_weights_dominate_gpe() {
        assert!(label_weight("ORG") > label_weight("GPE"));
        assert!(label_weight("EVENT") > label_weight("DATE"));
        assert!(label_weight("CARDINAL") < label_weight("NUM"));
    }

    #[test]
    fn semantic_tokens_typed_and_verbatim() {
        let tokens = extract_semantic_tokens("Protest march after the earthquake; turnout 5000");
        assert!(tokens.contains("protest:protest"), "{tokens:?}");
        assert!(tokens.contains("protest:march"), "{tokens:?}");
        assert!(tokens.contains("disaster:earthquake"), "{tokens:?}");
        assert!(tokens.contains("5000"), "{tokens:?}");
        assert!(tokens.contains("primary_protest"), "dominant type: {tokens:?}");
    }

    #[test]
    fn event_indicator_detection() {
        let with = sig_of("Crackdown after protests in the capital");
        assert!(has_event_indicators(&with));

        let without = sig_of("Annual flower show opens quietly this weekend");
        assert!(!has_event_indicators(&without));
    }

    #[test]
    fn flattened_features_pair_label_and_value() {
        let sig = sig_of("Earthquake hits Tokyo");
        let flat = flatten_features(&sig);
        assert!(flat.contains("GPE=tokyo"), "{flat:?}");
    }
}
