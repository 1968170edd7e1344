//! Text canonicalisation shared by the lexical near-dup path and the
//! n-gram backbone: strip the social-media noise (URLs, mentions,
//! hashtags, emoji), pull out structured tokens (bare numbers, percents,
//! time windows), and reduce what remains to a sorted unique token set.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static RE_RT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*RT\s+@\w+:\s*").expect("rt regex"));
static RE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("url regex"));
static RE_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").expect("mention regex"));
static RE_HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("hashtag regex"));
static RE_EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{1F000}-\x{1FAFF}]+").expect("emoji regex"));
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("spaces regex"));
static RE_PUNCT_KEEP_PCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s%]").expect("punct regex"));

static RE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(?:,\d{3})+\b|\b\d+\b").expect("number regex"));
static RE_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3})\s*%").expect("percent regex"));
static RE_TIMEWINDOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(hours?|days?|weeks?|months?|years?)\b")
        .expect("timewindow regex")
});

/// Small and generic on purpose. Country names and event words stay out;
/// they are signal, not noise.
pub(crate) const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "to", "of", "in", "on", "at", "for", "from", "with",
    "by", "as", "is", "are", "was", "were", "be", "been", "being", "this", "that", "these",
    "those", "it", "its", "they", "them", "their", "we", "you", "said", "says", "say", "report",
    "reports", "reported", "according", "via", "new", "latest", "breaking", "news",
];

pub(crate) fn is_stopword(w: &str) -> bool {
    STOPWORDS.contains(&w)
}

/// Bare numbers, comma groups collapsed, 1–10 digits.
pub fn extract_numbers(raw: &str) -> Vec<String> {
    RE_NUMBER
        .find_iter(raw)
        .map(|m| m.as_str().replace(',', ""))
        .filter(|s| (1..=10).contains(&s.len()))
        .collect()
}

pub fn extract_percents(raw: &str) -> Vec<String> {
    RE_PERCENT
        .captures_iter(raw)
        .map(|c| format!("{}%", &c[1]))
        .collect()
}

/// "24 hours" → "24h", "7 days" → "7d".
pub fn extract_timewindows(raw: &str) -> Vec<String> {
    RE_TIMEWINDOW
        .captures_iter(raw)
        .filter_map(|c| {
            let unit = c[2].to_lowercase();
            let unit = unit.strip_suffix('s').unwrap_or(&unit);
            let short = match unit {
                "hour" => "h",
                "day" => "d",
                "week" => "w",
                "month" => "m",
                "year" => "y",
                _ => return None,
            };
            Some(format!("{}{short}", &c[1]))
        })
        .collect()
}

fn strip_noise(raw: &str) -> String {
    let t = RE_RT.replace(raw.trim(), "");
    let t = RE_URL.replace_all(&t, " ");
    let t = RE_MENTION.replace_all(&t, " ");
    let t = RE_HASHTAG.replace_all(&t, " ");
    RE_EMOJI.replace_all(&t, " ").into_owned()
}

/// Returns (canon, rare_tokens).
///
/// canon: sorted unique tokens joined by spaces — words of ≥3 chars that
/// survive the stoplist, plus numbers, percents and time windows.
/// rare: canon tokens that are ≥4 chars or carry a digit/% — the generic
/// anti-overmerge guard.
pub fn canonicalize(raw: &str) -> (String, BTreeSet<String>) {
    if raw.trim().is_empty() {
        return (String::new(), BTreeSet::new());
    }

    let t = strip_noise(raw);
    let nums = extract_numbers(&t);
    let pcts = extract_percents(&t);
    let tws = extract_timewindows(&t);

    let words_text = RE_PUNCT_KEEP_PCT.replace_all(&t, " ");
    let words_text = RE_SPACES.replace_all(&words_text, " ");
    let words_text = words_text.trim().to_lowercase();

    let mut tokens: BTreeSet<String> = words_text
        .split(' ')
        .filter(|w| w.chars().count() >= 3 && !is_stopword(w))
        .map(str::to_string)
        .collect();
    tokens.extend(nums);
    tokens.extend(pcts);
    tokens.extend(tws);

    let canon = tokens.iter().cloned().collect::<Vec<_>>().join(" ");

    let rare: BTreeSet<String> = tokens
        .iter()
        .filter(|tok| {
            tok.chars().any(|c| c.is_ascii_digit())
                || tok.contains('%')
                || tok.chars().count() >= 4
        })
        .cloned()
        .collect();

    (canon, rare)
}

/// Cleaning for the n-gram vectors: same noise removal as canon, minus
/// the structured-token extraction, lowercased with punctuation spaced.
pub fn clean_for_ngrams(raw: &str) -> String {
    let t = strip_noise(&raw.to_lowercase());
    let t = RE_PUNCT_KEEP_PCT.replace_all(&t, " ");
    RE_SPACES.replace_all(&t, " ").trim().to_string()
}

// --- Script buckets ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
    Arabic,
    Hebrew,
    Greek,
    Devanagari,
    Han,
    Hiragana,
    Katakana,
    Hangul,
    Other,
}

fn script_of(c: char) -> Script {
    match c as u32 {
        0x0041..=0x024F | 0x1E00..=0x1EFF => Script::Latin,
        0x0400..=0x04FF | 0x0500..=0x052F => Script::Cyrillic,
        0x0600..=0x06FF | 0x0750..=0x077F => Script::Arabic,
        0x0590..=0x05FF => Script::Hebrew,
        0x0370..=0x03FF => Script::Greek,
        0x0900..=0x097F => Script::Devanagari,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF => Script::Han,
        0x3040..=0x309F => Script::Hiragana,
        0x30A0..=0x30FF => Script::Katakana,
        0xAC00..=0xD7AF | 0x1100..=0x11FF => Script::Hangul,
        _ => Script::Other,
    }
}

/// Dominant script among alphabetic characters. A weak guard only — used
/// by the matcher to demand a stronger score across scripts, never to
/// reject outright.
pub fn dominant_script(text: &str) -> Script {
    let mut counts: std::collections::HashMap<Script, usize> = std::collections::HashMap::new();
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        *counts.entry(script_of(c)).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .map(|(s, _)| s)
        .unwrap_or(Script::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_idempotent_and_sorted() {
        let (canon1, rare1) = canonicalize("Earthquake shakes Tokyo, earthquake again!");
        let (canon2, rare2) = canonicalize("Earthquake shakes Tokyo, earthquake again!");
        assert_eq!(canon1, canon2);
        assert_eq!(rare1, rare2);

        let tokens: Vec<&str> = canon1.split(' ').collect();
        let mut sorted = tokens.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(tokens, sorted, "canon must be sorted unique: {canon1}");
    }

    #[test]
    fn canonicalize_strips_noise() {
        let (canon, _) = canonicalize(
            "RT @user: Protest in Ljubljana! https://example.com/x #protest 🙂 @another",
        );
        assert!(!canon.contains("http"), "{canon}");
        assert!(!canon.contains('@'), "{canon}");
        assert!(!canon.contains('#'), "{canon}");
        assert!(canon.contains("ljubljana"), "{canon}");
        assert!(canon.contains("protest"), "{canon}");
    }

    #[test]
    fn structured_tokens_survive() {
        let (canon, rare) = canonicalize("Turnout was 64% across 1,200 stations in 24 hours");
        assert!(canon.contains("64%"), "{canon}");
        assert!(canon.contains("1200"), "{canon}");
        assert!(canon.contains("24h"), "{canon}");
        assert!(rare.contains("64%"));
        assert!(rare.contains("1200"));
    }

    #[test]
    fn stopwords_and_short_words_drop() {
        let (canon, _) = canonicalize("The news is on at it");
        assert_eq!(canon, "", "all tokens are stop or short: {canon}");
    }

    #[test]
    fn rare_excludes_three_letter_plain_words() {
        let (_, rare) = canonicalize("jma issues alerts");
        assert!(!rare.contains("jma"), "3-char no-digit token is not rare");
        assert!(rare.contains("issues"));
    }

    #[test]
    fn timewindow_unit_normalisation() {
        assert_eq!(extract_timewindows("past 24 hours and 7 days"), vec!["24h", "7d"]);
        assert_eq!(extract_timewindows("3 weeks, 2 months, 1 year"), vec!["3w", "2m", "1y"]);
    }

    #[test]
    fn script_detection() {
        assert_eq!(dominant_script("Earthquake in Tokyo"), Script::Latin);
        assert_eq!(dominant_script("Землетрясение в Токио"), Script::Cyrillic);
        assert_eq!(dominant_script("زلزال في طوكيو"), Script::Arabic);
        assert_eq!(dominant_script("東京で地震"), Script::Han);
        assert_eq!(dominant_script("12345 !!"), Script::Other);
    }

    #[test]
    fn clean_for_ngrams_keeps_percent() {
        assert_eq!(clean_for_ngrams("Up 40%! See https://x.co"), "up 40% see");
    }
}
