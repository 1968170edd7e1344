//! Client for the external gazetteer service plus the candidate scoring
//! that turns its hit list into zero-or-one best location. The service
//! answers `GET /query?key=<surface>&limit=N` with candidate rows; the
//! scoring here is deliberately kept in this crate so the selection
//! behaviour stays testable even if the service implementation changes.
//! Resolved surfaces are cached in a small local KV, so repeats are free.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const QUERY_LIMIT: usize = 10;

/// Administrative qualifiers that official names append to a surface
/// ("Gaza" vs "Gaza Province"). Matching one of these as the only extra
/// token is a scoring penalty, not a different place.
const ADMIN_QUALIFIERS: &[&str] = &[
    "province", "region", "district", "county", "state", "governorate", "prefecture",
    "oblast", "raion", "municipality", "department", "commune", "parish", "canton",
    "voivodeship", "shire",
];

/// Country-code aliases recognised in surfaces beyond bare 2-letter codes.
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("usa", "US"),
    ("america", "US"),
    ("uk", "GB"),
    ("england", "GB"),
    ("britain", "GB"),
    ("uae", "AE"),
    ("drc", "CD"),
];

/// Feature-intent keywords: a surface like "Ohio river" wants the stream,
/// not the state.
const FEATURE_INTENTS: &[(&str, char)] = &[
    ("river", 'H'),
    ("lake", 'H'),
    ("mountain", 'T'),
    ("mount", 'T'),
    ("city", 'P'),
    ("town", 'P'),
    ("country", 'A'),
];

#[derive(Debug, Clone, Default)]
pub struct GazetteerCandidate {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub feature_class: String,
    pub feature_code: String,
    pub country_code: String,
    pub population: i64,
    pub is_preferred: bool,
    pub is_short: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// The single surface-string → best-candidate contract the pipeline
/// consumes. Implementations must return `None` on any failure; the
/// record is simply persisted without location.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve(&self, surface: &str) -> Option<ResolvedLocation>;
}

pub struct GazetteerClient {
    base_url: String,
    client: reqwest::Client,
    cache: Option<sled::Db>,
}

impl GazetteerClient {
    pub fn new(base_url: &str, cache_path: Option<&str>) -> Self {
        let cache = cache_path.and_then(|path| match sled::open(path) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(path, error = %e, "Gazetteer cache unavailable; continuing without");
                None
            }
        });
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(QUERY_TIMEOUT)
            .build()
            .expect("Failed to build gazetteer HTTP client");
        Self { base_url: base_url.trim_end_matches('/').to_string(), client, cache }
    }

    fn cache_key(surface: &str) -> String {
        surface.trim().to_lowercase()
    }

    fn cache_get(&self, key: &str) -> Option<ResolvedLocation> {
        let db = self.cache.as_ref()?;
        let bytes = db.get(key).ok().flatten()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn cache_put(&self, key: &str, value: &ResolvedLocation) {
        if let Some(db) = &self.cache {
            if let Ok(bytes) = serde_json::to_vec(value) {
                if let Err(e) = db.insert(key, bytes) {
                    warn!(error = %e, "Gazetteer cache write failed");
                }
            }
        }
    }

    async fn query(&self, surface: &str) -> Option<Vec<GazetteerCandidate>> {
        let limit = QUERY_LIMIT.to_string();
        let resp = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[("key", surface), ("limit", limit.as_str())])
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;

        let value: serde_json::Value = resp.json().await.ok()?;
        let rows = value
            .get("candidates")
            .and_then(|v| v.as_array())
            .cloned()
            .or_else(|| value.as_array().cloned())?;

        Some(rows.iter().filter_map(candidate_from_json).collect())
    }
}

#[async_trait]
impl LocationResolver for GazetteerClient {
    async fn resolve(&self, surface: &str) -> Option<ResolvedLocation> {
        let key = Self::cache_key(surface);
        if key.len() < 2 {
            return None;
        }

        if let Some(hit) = self.cache_get(&key) {
            debug!(surface, "Gazetteer cache hit");
            return Some(hit);
        }

        let candidates = self.query(surface).await?;
        let best = pick_best(surface, &candidates)?;

        let resolved = ResolvedLocation {
            name: surface.trim().to_string(),
            lat: best.lat,
            lon: best.lon,
        };
        self.cache_put(&key, &resolved);
        Some(resolved)
    }
}

/// Upstream rows are dirty: populations arrive as strings, flags as 0/1
/// numbers. Everything is parsed defensively; a row without coordinates
/// is no candidate at all.
fn candidate_from_json(v: &serde_json::Value) -> Option<GazetteerCandidate> {
    let lat = float_field(v, "lat")?;
    let lon = float_field(v, "lon").or_else(|| float_field(v, "lng"))?;
    Some(GazetteerCandidate {
        name: v.get("name").and_then(|x| x.as_str()).unwrap_or_default().to_string(),
        lat,
        lon,
        feature_class: v
            .get("feature_class")
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string(),
        feature_code: v
            .get("feature_code")
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string(),
        country_code: v
            .get("country_code")
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string(),
        population: float_field(v, "population").unwrap_or(0.0) as i64,
        is_preferred: bool_field(v, "is_preferred"),
        is_short: bool_field(v, "is_short"),
    })
}

fn float_field(v: &serde_json::Value, key: &str) -> Option<f64> {
    match v.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_float_prefix(s),
        _ => None,
    }
}

fn bool_field(v: &serde_json::Value, key: &str) -> bool {
    match v.get(key) {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(serde_json::Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Accept strings with a float prefix ("1234.0 approx" → 1234.0) — some
/// upstream values are dirty.
pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    s[..end].parse().ok()
}

fn simple_tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Country-code bias in the surface: a bare 2-letter code token or a
/// known alias.
fn detect_country_bias(tokens: &[String]) -> Option<String> {
    for t in tokens {
        if t.len() == 2 && t.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some(t.to_uppercase());
        }
        if let Some((_, code)) = COUNTRY_ALIASES.iter().find(|(alias, _)| alias == t) {
            return Some(code.to_string());
        }
    }
    None
}

fn detect_feature_intent(tokens: &[String]) -> Option<char> {
    for t in tokens {
        if let Some((_, class)) = FEATURE_INTENTS.iter().find(|(kw, _)| kw == t) {
            return Some(*class);
        }
    }
    None
}

/// Score one candidate for a surface. Weighted sum of: population prior,
/// preferred-name bonus, short-name penalty, surface-length boost,
/// feature-class bias, country match/mismatch, and the missing-admin-
/// qualifier penalty.
pub fn score_candidate(surface: &str, candidate: &GazetteerCandidate) -> f64 {
    let surface_tokens = simple_tokens(surface);
    let single_token = surface_tokens.len() == 1;
    let country_bias = detect_country_bias(&surface_tokens);
    let feature_intent = detect_feature_intent(&surface_tokens);

    let pop_score = ((candidate.population.max(0) + 10) as f64).log10();
    let pref_boost = if candidate.is_preferred { 0.35 } else { 0.0 };
    let short_penalty = if candidate.is_short { -0.6 } else { 0.0 };
    let len_boost = (surface.len() as f64 / 20.0).min(1.0) * 0.4;

    let mut feature_bias = 0.0;
    if let Some(class) = feature_intent {
        // Near-gate strength: "ohio river" must beat the state's entire
        // population prior.
        if candidate.feature_class.starts_with(class) {
            feature_bias += 1.0;
        } else {
            feature_bias -= 8.0;
        }
    } else if single_token {
        // Country-level entities beat identically named towns; towns beat
        // admin areas.
        if candidate.feature_class == "A" && candidate.feature_code.starts_with("PCL") {
            feature_bias += 1.0;
        } else if candidate.feature_code.starts_with('P') {
            feature_bias += 0.25;
        } else if candidate.feature_code.starts_with("ADM") {
            feature_bias -= 0.15;
        }
    }

    let country_score = match &country_bias {
        Some(code) if candidate.country_code.eq_ignore_ascii_case(code) => 2.5,
        Some(_) => -1.5,
        None => 0.0,
    };

    // "gaza" matching official "Gaza Province": every surface token is in
    // the official name and the only extras are admin qualifiers.
    let official_tokens = simple_tokens(&candidate.name);
    let mut subset_penalty = 0.0;
    if !official_tokens.is_empty() {
        let missing: Vec<&String> = official_tokens
            .iter()
            .filter(|t| !surface_tokens.contains(t))
            .collect();
        let surface_subset = surface_tokens.iter().all(|t| official_tokens.contains(t));
        if !missing.is_empty()
            && surface_subset
            && missing.iter().any(|t| ADMIN_QUALIFIERS.contains(&t.as_str()))
        {
            subset_penalty = -0.75;
        }
    }

    pop_score + pref_boost + short_penalty + len_boost + feature_bias + country_score
        + subset_penalty
}

/// Zero or one best candidate for a surface.
pub fn pick_best<'a>(
    surface: &str,
    candidates: &'a [GazetteerCandidate],
) -> Option<&'a GazetteerCandidate> {
    candidates
        .iter()
        .map(|c| (c, score_candidate(surface, c)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, pop: i64, class: &str, code: &str, country: &str) -> GazetteerCandidate {
        GazetteerCandidate {
            name: name.to_string(),
            lat: 1.0,
            lon: 2.0,
            feature_class: class.to_string(),
            feature_code: code.to_string(),
            country_code: country.to_string(),
            population: pop,
            is_preferred: false,
            is_short: false,
        }
    }

    #[test]
    fn population_prior_dominates_between_towns() {
        let big = candidate("Springfield", 150_000, "P", "PPL", "US");
        let small = candidate("Springfield", 900, "P", "PPL", "US");
        let candidates = [small, big.clone()];
        let best = pick_best("Springfield", &candidates).unwrap();
        assert_eq!(best.population, big.population);
    }

    #[test]
    fn single_token_prefers_country_over_town() {
        // A town named "Georgia" with a big population vs the country.
        let town = candidate("Georgia", 2_000_000, "P", "PPL", "US");
        let country = candidate("Georgia", 3_700_000, "A", "PCLI", "GE");
        let candidates = [town, country.clone()];
        let best = pick_best("georgia", &candidates).unwrap();
        assert_eq!(best.feature_code, "PCLI");
    }

    #[test]
    fn country_code_bias_flips_the_pick() {
        let paris_fr = candidate("Paris", 2_100_000, "P", "PPLC", "FR");
        let paris_us = candidate("Paris", 25_000, "P", "PPL", "US");
        let candidates = [paris_fr.clone(), paris_us.clone()];
        let best = pick_best("Paris US", &candidates).unwrap();
        assert_eq!(best.country_code, "US", "explicit country code must win");

        let candidates = [paris_fr.clone(), paris_us];
        let best = pick_best("Paris", &candidates).unwrap();
        assert_eq!(best.country_code, "FR", "without bias, population wins");
    }

    #[test]
    fn admin_qualifier_subset_penalized() {
        let strip = candidate("Gaza", 600_000, "P", "PPLA", "PS");
        let province = candidate("Gaza Province", 1_400_000, "A", "ADM1", "MZ");
        let candidates = [strip.clone(), province];
        let best = pick_best("gaza", &candidates).unwrap();
        assert_eq!(best.name, "Gaza", "admin-qualified official name must lose");
    }

    #[test]
    fn feature_intent_prefers_matching_class() {
        let state = candidate("Ohio", 11_000_000, "A", "ADM1", "US");
        let river = candidate("Ohio", 0, "H", "STM", "US");
        let candidates = [state, river.clone()];
        let best = pick_best("ohio river", &candidates).unwrap();
        assert_eq!(best.feature_class, "H");
    }

    #[test]
    fn short_name_penalty_applies() {
        let mut short = candidate("NY", 8_400_000, "P", "PPL", "US");
        short.is_short = true;
        let long = candidate("New York", 8_400_000, "P", "PPL", "US");
        let s_short = score_candidate("new york", &short);
        let s_long = score_candidate("new york", &long);
        assert!(s_long > s_short, "long={s_long} short={s_short}");
    }

    #[test]
    fn float_prefix_parsing_is_defensive() {
        assert_eq!(parse_float_prefix("1234.5"), Some(1234.5));
        assert_eq!(parse_float_prefix("1234.5 approx"), Some(1234.5));
        assert_eq!(parse_float_prefix("-7.25abc"), Some(-7.25));
        assert_eq!(parse_float_prefix("abc"), None);
        assert_eq!(parse_float_prefix(""), None);
    }

    #[test]
    fn dirty_candidate_rows_parse() {
        let row = serde_json::json!({
            "name": "Tokyo",
            "lat": "35.6895",
            "lon": 139.6917,
            "population": "37400068.0",
            "feature_class": "P",
            "feature_code": "PPLC",
            "country_code": "JP",
            "is_preferred": 1,
        });
        let c = candidate_from_json(&row).unwrap();
        assert_eq!(c.lat, 35.6895);
        assert_eq!(c.population, 37_400_068);
        assert!(c.is_preferred);
    }

    #[test]
    fn rows_without_coordinates_are_dropped() {
        let row = serde_json::json!({ "name": "Nowhere", "population": 5 });
        assert!(candidate_from_json(&row).is_none());
    }
}
