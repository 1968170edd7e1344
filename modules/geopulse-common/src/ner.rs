//! Named-entity extraction seam.
//!
//! The ingestion pipeline needs LOC/GPE surfaces to feed the gazetteer;
//! the clustering engine needs the full label set for signatures. Both
//! consume the `EntityRecognizer` trait so the backing model can change
//! without touching either. The built-in `LexiconRecognizer` is a
//! heuristic chunker: capitalized spans classified by a place lexicon,
//! organization/facility cues and person-title cues, plus regex
//! extractors for dates, times, money, percents and bare numbers.
//! Unknown multi-token proper nouns land in ORG, unknown single tokens
//! in GPE; GPE carries no weight in the clustering key gate, so that is
//! the safe default for a mislabel.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::GeoPulseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityLabel {
    Person,
    Org,
    Gpe,
    Loc,
    Fac,
    Event,
    Law,
    Product,
    Work,
    Date,
    Time,
    Money,
    Percent,
    Quantity,
    Ordinal,
    Cardinal,
}

impl EntityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLabel::Person => "PERSON",
            EntityLabel::Org => "ORG",
            EntityLabel::Gpe => "GPE",
            EntityLabel::Loc => "LOC",
            EntityLabel::Fac => "FAC",
            EntityLabel::Event => "EVENT",
            EntityLabel::Law => "LAW",
            EntityLabel::Product => "PRODUCT",
            EntityLabel::Work => "WORK",
            EntityLabel::Date => "DATE",
            EntityLabel::Time => "TIME",
            EntityLabel::Money => "MONEY",
            EntityLabel::Percent => "PERCENT",
            EntityLabel::Quantity => "QUANTITY",
            EntityLabel::Ordinal => "ORDINAL",
            EntityLabel::Cardinal => "CARDINAL",
        }
    }

    /// Labels the ingestion pipeline treats as location surfaces.
    pub fn is_location(&self) -> bool {
        matches!(self, EntityLabel::Loc | EntityLabel::Gpe)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub text: String,
    pub label: EntityLabel,
}

pub trait EntityRecognizer: Send + Sync {
    fn entities(&self, text: &str) -> Vec<Entity>;
}

// Countries and a handful of major cities / regions. Enough for the
// connectors this deployment runs; extend via NER_LEXICON_PATH.
const PLACES: &[&str] = &[
    "afghanistan", "albania", "algeria", "argentina", "armenia", "australia", "austria",
    "azerbaijan", "bangladesh", "belarus", "belgium", "bolivia", "bosnia", "brazil", "bulgaria",
    "canada", "chile", "china", "colombia", "croatia", "cuba", "cyprus", "czechia", "denmark",
    "ecuador", "egypt", "estonia", "ethiopia", "finland", "france", "georgia", "germany",
    "ghana", "greece", "haiti", "hungary", "iceland", "india", "indonesia", "iran", "iraq",
    "ireland", "israel", "italy", "japan", "jordan", "kazakhstan", "kenya", "kosovo", "kuwait",
    "latvia", "lebanon", "libya", "lithuania", "malaysia", "mexico", "moldova", "mongolia",
    "morocco", "myanmar", "nepal", "netherlands", "nicaragua", "nigeria", "norway", "pakistan",
    "palestine", "peru", "philippines", "poland", "portugal", "qatar", "romania", "russia",
    "rwanda", "serbia", "singapore", "slovakia", "slovenia", "somalia", "spain", "sudan",
    "sweden", "switzerland", "syria", "taiwan", "thailand", "tunisia", "turkey", "ukraine",
    "uganda", "uruguay", "venezuela", "vietnam", "yemen", "zimbabwe",
    "usa", "uk", "united states", "united kingdom", "south korea", "north korea",
    "saudi arabia", "new zealand", "south africa", "sri lanka", "costa rica",
    "amsterdam", "ankara", "athens", "baghdad", "bangkok", "barcelona", "beijing", "beirut",
    "belgrade", "berlin", "bogota", "boston", "brussels", "bucharest", "budapest",
    "buenos aires", "cairo", "caracas", "chicago", "copenhagen", "damascus", "delhi",
    "dubai", "dublin", "gaza", "geneva", "hanoi", "havana", "helsinki", "hong kong",
    "istanbul", "jakarta", "jerusalem", "johannesburg", "kabul", "karachi", "kathmandu",
    "khartoum", "kyiv", "kyoto", "lagos", "lisbon", "ljubljana", "london", "los angeles",
    "madrid", "manila", "melbourne", "mexico city", "miami", "milan", "minsk", "moscow",
    "mumbai", "munich", "nairobi", "new york", "osaka", "oslo", "paris", "prague",
    "riga", "rome", "san francisco", "santiago", "sarajevo", "seoul", "shanghai",
    "singapore", "stockholm", "sydney", "taipei", "tallinn", "tehran", "tel aviv",
    "tokyo", "toronto", "tripoli", "vienna", "vilnius", "warsaw", "washington", "zagreb",
    "zurich",
];

// Physical-feature terms; a span starting or ending with one is LOC.
const GEO_SUFFIXES: &[&str] = &[
    "river", "lake", "mountain", "mountains", "island", "islands", "valley", "strait",
    "gulf", "bay", "sea", "ocean", "desert", "peninsula", "volcano", "glacier", "coast",
];

const ORG_CUES: &[&str] = &[
    "ministry", "police", "university", "council", "agency", "authority", "bank", "airlines",
    "airways", "corp", "corporation", "inc", "ltd", "committee", "commission", "court",
    "parliament", "army", "navy", "railway", "metro", "company", "institute", "organization",
    "organisation", "union", "nations", "news", "times", "press", "port", "department",
    "bureau", "center", "centre", "party", "group", "federation", "association",
];

const PERSON_TITLES: &[&str] = &[
    "mr", "mrs", "ms", "dr", "president", "minister", "prime", "chancellor", "senator",
    "governor", "mayor", "general", "colonel", "king", "queen", "prince", "pope", "sheikh",
];

// Lowercase connectors allowed inside a capitalized span.
const SPAN_CONNECTORS: &[&str] = &["of", "de", "da", "del", "la", "le", "al", "von", "van", "the"];

static RE_ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("iso date regex"));
static RE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}(?::\d{2})?\b").expect("time regex"));
static RE_MONEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$€£]\s?\d[\d,.]*\b").expect("money regex"));
static RE_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}\s?%").expect("percent regex"));
static RE_CARDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,10}\b").expect("cardinal regex"));

/// Override lexicon file shape: `{"gpe": [...], "loc": [...], "org": [...]}`.
#[derive(Debug, Default, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    gpe: Vec<String>,
    #[serde(default)]
    loc: Vec<String>,
    #[serde(default)]
    org: Vec<String>,
}

#[derive(Debug)]
pub struct LexiconRecognizer {
    places: HashSet<String>,
    extra_locs: HashSet<String>,
    extra_orgs: HashSet<String>,
}

impl Default for LexiconRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconRecognizer {
    pub fn new() -> Self {
        Self {
            places: PLACES.iter().map(|s| s.to_string()).collect(),
            extra_locs: HashSet::new(),
            extra_orgs: HashSet::new(),
        }
    }

    /// Build a recognizer, merging an override lexicon when configured.
    /// A configured-but-unreadable path is fatal: the operator asked for a
    /// specific lexicon and silently running without it would skew every
    /// downstream label.
    pub fn from_config(lexicon_path: Option<&str>) -> Result<Self, GeoPulseError> {
        let mut rec = Self::new();
        if let Some(path) = lexicon_path {
            rec.merge_file(Path::new(path))?;
        }
        Ok(rec)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), GeoPulseError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            GeoPulseError::Fatal(format!("NER lexicon {} unreadable: {e}", path.display()))
        })?;
        let parsed: LexiconFile = serde_json::from_str(&data).map_err(|e| {
            GeoPulseError::Fatal(format!("NER lexicon {} invalid: {e}", path.display()))
        })?;
        self.places.extend(parsed.gpe.iter().map(|s| s.to_lowercase()));
        self.extra_locs.extend(parsed.loc.iter().map(|s| s.to_lowercase()));
        self.extra_orgs.extend(parsed.org.iter().map(|s| s.to_lowercase()));
        Ok(())
    }

    fn classify_span(&self, tokens: &[SpanToken<'_>]) -> Option<EntityLabel> {
        let lowered: Vec<String> = tokens.iter().map(|t| t.text.to_lowercase()).collect();
        let joined = lowered.join(" ");

        if self.places.contains(&joined) {
            return Some(EntityLabel::Gpe);
        }
        if self.extra_locs.contains(&joined) {
            return Some(EntityLabel::Loc);
        }
        if self.extra_orgs.contains(&joined) {
            return Some(EntityLabel::Org);
        }

        let first = lowered.first().map(String::as_str).unwrap_or("");
        let last = lowered.last().map(String::as_str).unwrap_or("");
        if GEO_SUFFIXES.contains(&first) || GEO_SUFFIXES.contains(&last) {
            return Some(EntityLabel::Loc);
        }
        if lowered.iter().any(|t| ORG_CUES.contains(&t.as_str())) {
            return Some(EntityLabel::Org);
        }

        // Short all-caps token reads as an acronym (JMA, ECB, RATP).
        if tokens.len() == 1 {
            let t = tokens[0];
            let alpha = t.text.chars().all(|c| c.is_alphabetic());
            if alpha && t.text.len() >= 2 && t.text.len() <= 6 && t.text.chars().all(|c| c.is_uppercase())
            {
                return Some(EntityLabel::Org);
            }
            // Mid-sentence single proper noun: likely a place we do not
            // know; the gazetteer is the arbiter downstream.
            if !t.sentence_initial {
                return Some(EntityLabel::Gpe);
            }
            return None;
        }

        // Multi-token unknown proper noun: the multilingual MISC bucket,
        // folded into ORG like the label map does.
        Some(EntityLabel::Org)
    }
}

#[derive(Clone, Copy)]
struct SpanToken<'a> {
    text: &'a str,
    sentence_initial: bool,
}

impl LexiconRecognizer {
    fn flush_span(&self, span: &mut Vec<SpanToken<'_>>, titled: bool, out: &mut Vec<Entity>) {
        if span.is_empty() {
            return;
        }
        let label = if titled { Some(EntityLabel::Person) } else { self.classify_span(span) };
        if let Some(label) = label {
            let surface = span.iter().map(|t| t.text).collect::<Vec<_>>().join(" ");
            out.push(Entity { text: surface, label });
        }
        span.clear();
    }
}

impl EntityRecognizer for LexiconRecognizer {
    fn entities(&self, text: &str) -> Vec<Entity> {
        let mut out = Vec::new();

        // Capitalized-span pass
        let mut span: Vec<SpanToken<'_>> = Vec::new();
        let mut pending_connectors: Vec<SpanToken<'_>> = Vec::new();
        let mut prev_title = false;
        let mut title_before_span = false;
        let mut sentence_start = true;

        for raw in text.split_whitespace() {
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
            let ends_sentence = raw.ends_with(['.', '!', '?', ':', ';']);
            if word.is_empty() {
                self.flush_span(&mut span, title_before_span, &mut out);
                pending_connectors.clear();
                prev_title = false;
                sentence_start = sentence_start || ends_sentence;
                continue;
            }

            let lower = word.to_lowercase();
            let capitalized = word.chars().next().is_some_and(|c| c.is_uppercase());

            let is_title = PERSON_TITLES.contains(&lower.as_str());
            if capitalized && is_title && span.is_empty() {
                // "President X", "Prime Minister Y": the title marks the
                // following span as a person, it is not part of the name.
            } else if capitalized {
                if span.is_empty() {
                    title_before_span = prev_title;
                } else {
                    // Connectors seen between capitalized tokens join the span.
                    span.append(&mut pending_connectors);
                }
                span.push(SpanToken { text: word, sentence_initial: sentence_start });
            } else if !span.is_empty() && SPAN_CONNECTORS.contains(&lower.as_str()) {
                pending_connectors.push(SpanToken { text: word, sentence_initial: false });
            } else {
                self.flush_span(&mut span, title_before_span, &mut out);
                pending_connectors.clear();
            }

            prev_title = PERSON_TITLES.contains(&lower.as_str());
            sentence_start = ends_sentence;
        }
        self.flush_span(&mut span, title_before_span, &mut out);

        // Structured pass
        for m in RE_ISO_DATE.find_iter(text) {
            out.push(Entity { text: m.as_str().to_string(), label: EntityLabel::Date });
        }
        for m in RE_TIME.find_iter(text) {
            out.push(Entity { text: m.as_str().to_string(), label: EntityLabel::Time });
        }
        for m in RE_MONEY.find_iter(text) {
            out.push(Entity { text: m.as_str().to_string(), label: EntityLabel::Money });
        }
        for m in RE_PERCENT.find_iter(text) {
            out.push(Entity { text: m.as_str().to_string(), label: EntityLabel::Percent });
        }
        for m in RE_CARDINAL.find_iter(text) {
            out.push(Entity { text: m.as_str().to_string(), label: EntityLabel::Cardinal });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_of<'a>(ents: &'a [Entity], label: EntityLabel) -> Vec<&'a str> {
        ents.iter()
            .filter(|e| e.label == label)
            .map(|e| e.text.as_str())
            .collect()
    }

    #[test]
    fn known_place_is_gpe() {
        let rec = LexiconRecognizer::new();
        let ents = rec.entities("Earthquake strikes Tokyo after midnight");
        assert!(labels_of(&ents, EntityLabel::Gpe).contains(&"Tokyo"), "{ents:?}");
    }

    #[test]
    fn acronym_is_org() {
        let rec = LexiconRecognizer::new();
        let ents = rec.entities("Alerts were issued by JMA within minutes");
        assert!(labels_of(&ents, EntityLabel::Org).contains(&"JMA"), "{ents:?}");
    }

    #[test]
    fn sentence_initial_unknown_word_skipped() {
        let rec = LexiconRecognizer::new();
        let ents = rec.entities("Buildings shook for a minute. Nothing collapsed.");
        assert!(labels_of(&ents, EntityLabel::Gpe).is_empty(), "{ents:?}");
        assert!(labels_of(&ents, EntityLabel::Org).is_empty(), "{ents:?}");
    }

    #[test]
    fn org_cue_wins_over_place_guess() {
        let rec = LexiconRecognizer::new();
        let ents = rec.entities("Workers at the Port of Tallinn confirmed the damage");
        assert!(
            labels_of(&ents, EntityLabel::Org).contains(&"Port of Tallinn"),
            "{ents:?}"
        );
    }

    #[test]
    fn geo_suffix_is_loc() {
        let rec = LexiconRecognizer::new();
        let ents = rec.entities("Oil spill reported in the Gulf of Finland yesterday");
        assert!(
            labels_of(&ents, EntityLabel::Loc).contains(&"Gulf of Finland"),
            "{ents:?}"
        );
    }

    #[test]
    fn person_title_cue() {
        let rec = LexiconRecognizer::new();
        let ents = rec.entities("Statement from President Halla Tomasdottir this morning");
        assert!(
            labels_of(&ents, EntityLabel::Person).contains(&"Halla Tomasdottir"),
            "{ents:?}"
        );
    }

    #[test]
    fn structured_extractors() {
        let rec = LexiconRecognizer::new();
        let ents = rec.entities("Turnout hit 64% on 2026-01-17 at 09:30, costing $1,200");
        assert!(labels_of(&ents, EntityLabel::Date).contains(&"2026-01-17"));
        assert!(labels_of(&ents, EntityLabel::Percent).contains(&"64%"));
        assert!(labels_of(&ents, EntityLabel::Time).contains(&"09:30"));
        assert!(!labels_of(&ents, EntityLabel::Cardinal).is_empty());
    }

    #[test]
    fn missing_override_lexicon_is_fatal() {
        let err = LexiconRecognizer::from_config(Some("/nonexistent/lexicon.json")).unwrap_err();
        assert!(matches!(err, GeoPulseError::Fatal(_)), "{err}");
    }
}
