use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Sources ---

/// Every connector this deployment knows about. `source` on a record must
/// be one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Gdelt,
    Telegram,
    Mastodon,
    Adsb,
    Ais,
    Rss,
    Gdacs,
    Usgs,
}

impl SourceKind {
    pub const ALL: [SourceKind; 8] = [
        SourceKind::Gdelt,
        SourceKind::Telegram,
        SourceKind::Mastodon,
        SourceKind::Adsb,
        SourceKind::Ais,
        SourceKind::Rss,
        SourceKind::Gdacs,
        SourceKind::Usgs,
    ];
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Gdelt => write!(f, "gdelt"),
            SourceKind::Telegram => write!(f, "telegram"),
            SourceKind::Mastodon => write!(f, "mastodon"),
            SourceKind::Adsb => write!(f, "adsb"),
            SourceKind::Ais => write!(f, "ais"),
            SourceKind::Rss => write!(f, "rss"),
            SourceKind::Gdacs => write!(f, "gdacs"),
            SourceKind::Usgs => write!(f, "usgs"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "gdelt" => Ok(Self::Gdelt),
            "telegram" => Ok(Self::Telegram),
            "mastodon" => Ok(Self::Mastodon),
            "adsb" => Ok(Self::Adsb),
            "ais" => Ok(Self::Ais),
            "rss" => Ok(Self::Rss),
            "gdacs" => Ok(Self::Gdacs),
            "usgs" => Ok(Self::Usgs),
            other => Err(format!("unknown SourceKind: {other}")),
        }
    }
}

// --- Ingestion record (connector output, pipeline input) ---

/// The unified record every connector produces. (source, source_id) is the
/// global identity; everything else is optional content or structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub source: String,
    pub source_id: String,
    /// Unix seconds at collection time. Strictly positive.
    pub collected_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_urls: Option<Vec<String>>,
    /// Event time as an ISO-8601 string, exactly as the upstream gave it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    /// Free-form structured payload (magnitude, alert_level, domain, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Original upstream payload, kept opaque for debugging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl IngestionRecord {
    pub fn new(source: SourceKind, source_id: impl Into<String>, collected_at: i64) -> Self {
        Self {
            source: source.to_string(),
            source_id: source_id.into(),
            collected_at,
            title: None,
            text: None,
            url: None,
            author: None,
            media_urls: None,
            published_at: None,
            entities: None,
            location_name: None,
            lat: None,
            lon: None,
            raw: None,
        }
    }

    pub fn has_location(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    /// Title and body joined for NER / clustering input.
    pub fn combined_text(&self) -> String {
        let title = self.title.as_deref().unwrap_or("").trim();
        let text = self.text.as_deref().unwrap_or("").trim();
        match (title.is_empty(), text.is_empty()) {
            (false, false) => format!("{title}\n{text}"),
            (false, true) => title.to_string(),
            (true, false) => text.to_string(),
            (true, true) => String::new(),
        }
    }
}

/// Validate a record. Returns human-readable problems; empty means valid.
/// Pure and idempotent — validating twice yields the same result.
pub fn validate_record(record: &IngestionRecord) -> Vec<String> {
    let mut errors = Vec::new();

    if record.source.trim().is_empty() {
        errors.push("source must not be empty".to_string());
    } else if record.source.parse::<SourceKind>().is_err() {
        errors.push(format!("source '{}' is not a known source", record.source));
    }

    if record.source_id.trim().is_empty() {
        errors.push("source_id must not be empty".to_string());
    }

    if record.collected_at <= 0 {
        errors.push(format!(
            "collected_at must be a positive unix timestamp, got {}",
            record.collected_at
        ));
    }

    match (record.lat, record.lon) {
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push(format!("lat {lat} outside [-90, 90]"));
            }
            if !(-180.0..=180.0).contains(&lon) {
                errors.push(format!("lon {lon} outside [-180, 180]"));
            }
        }
        (Some(_), None) => errors.push("lat present without lon".to_string()),
        (None, Some(_)) => errors.push("lon present without lat".to_string()),
        (None, None) => {}
    }

    errors
}

// --- Persisted model ---

/// A deduplicated, geo-enriched record as persisted in the item store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: i64,
    pub source: String,
    pub source_id: String,
    pub collected_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub media_urls: Option<serde_json::Value>,
    pub entities: Option<serde_json::Value>,
    pub location_name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Set exactly once by the clustering engine; null until assigned.
    pub cluster_id: Option<Uuid>,
}

impl NormalizedItem {
    /// Event time when known, ingest time otherwise. All ordering in the
    /// system prefers this.
    pub fn preferred_time(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.collected_at)
    }

    pub fn combined_text(&self) -> String {
        let title = self.title.as_deref().unwrap_or("").trim();
        let text = self.text.as_deref().unwrap_or("").trim();
        format!("{title} {text}").trim().to_string()
    }
}

/// One real-world story across sources and languages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: Uuid,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub representative_lat: Option<f64>,
    pub representative_lon: Option<f64>,
    pub representative_location_name: Option<String>,
    pub item_count: i64,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> IngestionRecord {
        IngestionRecord::new(SourceKind::Rss, "https://example.com/story", 1_700_000_000)
    }

    #[test]
    fn valid_record_passes() {
        assert!(validate_record(&record()).is_empty());
    }

    #[test]
    fn validation_is_idempotent() {
        let r = record();
        assert_eq!(validate_record(&r), validate_record(&r));
    }

    #[test]
    fn unknown_source_rejected() {
        let mut r = record();
        r.source = "pigeon".to_string();
        let errors = validate_record(&r);
        assert_eq!(errors.len(), 1, "unexpected errors: {errors:?}");
        assert!(errors[0].contains("pigeon"));
    }

    #[test]
    fn empty_source_id_rejected() {
        let mut r = record();
        r.source_id = "  ".to_string();
        assert!(!validate_record(&r).is_empty());
    }

    #[test]
    fn nonpositive_collected_at_rejected() {
        let mut r = record();
        r.collected_at = 0;
        assert!(!validate_record(&r).is_empty());
        r.collected_at = -5;
        assert!(!validate_record(&r).is_empty());
    }

    #[test]
    fn coordinate_boundaries() {
        let mut r = record();
        r.lat = Some(90.0);
        r.lon = Some(-180.0);
        assert!(validate_record(&r).is_empty(), "corner of the range is valid");

        r.lat = Some(90.0001);
        let errors = validate_record(&r);
        assert_eq!(errors.len(), 1, "unexpected errors: {errors:?}");
    }

    #[test]
    fn lat_without_lon_rejected() {
        let mut r = record();
        r.lat = Some(46.05);
        let errors = validate_record(&r);
        assert!(errors.iter().any(|e| e.contains("without lon")), "{errors:?}");
    }

    #[test]
    fn source_kind_round_trips() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.to_string().parse::<SourceKind>(), Ok(kind));
        }
    }

    #[test]
    fn combined_text_joins_title_and_body() {
        let mut r = record();
        r.title = Some("Earthquake strikes Tokyo".to_string());
        assert_eq!(r.combined_text(), "Earthquake strikes Tokyo");
        r.text = Some("Buildings shook for a minute.".to_string());
        assert_eq!(
            r.combined_text(),
            "Earthquake strikes Tokyo\nBuildings shook for a minute."
        );
    }
}
