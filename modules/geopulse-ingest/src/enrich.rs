//! Location enrichment: records that arrive without coordinates but with
//! text get a NER pass for place surfaces, and the first surface the
//! gazetteer resolves wins. A miss leaves the record untouched — whether
//! that drops it later is the persistence stage's business.

use tracing::debug;

use geopulse_common::{EntityRecognizer, IngestionRecord};

use crate::gazetteer::LocationResolver;
use crate::stats::IngestStats;

/// How many NER candidates we are willing to push through the gazetteer
/// per record.
const MAX_RESOLVE_CANDIDATES: usize = 5;

/// Extract location-surface candidates from text: LOC/GPE entities,
/// minus junk (too short, stoplisted, all-lowercase single tokens),
/// case-insensitively deduped in first-seen order.
pub fn location_candidates(
    ner: &dyn EntityRecognizer,
    text: &str,
    stopwords: &[String],
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for entity in ner.entities(text) {
        if !entity.label.is_location() {
            continue;
        }
        let surface = entity.text.trim();
        let lower = surface.to_lowercase();

        if surface.len() < 3 {
            continue;
        }
        if stopwords.iter().any(|s| s == &lower) {
            continue;
        }
        // All-lowercase single tokens are the classic NER false positive.
        if !surface.contains(' ') && surface.chars().all(|c| !c.is_uppercase()) {
            continue;
        }

        if seen.insert(lower) {
            out.push(surface.to_string());
        }
    }

    out
}

/// Enrich one batch in place. Counter contract:
/// `location_ner_attempted` per record we ran NER on,
/// `location_ner_found` per record with ≥1 usable candidate,
/// `location_resolved` per record that ended up with coordinates.
pub async fn enrich_locations(
    records: &mut [IngestionRecord],
    ner: &dyn EntityRecognizer,
    resolver: &dyn LocationResolver,
    stopwords: &[String],
    stats: &mut IngestStats,
) {
    for record in records.iter_mut() {
        if record.has_location() {
            continue;
        }
        let text = record.combined_text();
        if text.is_empty() {
            continue;
        }

        stats.location_ner_attempted += 1;

        let candidates = location_candidates(ner, &text, stopwords);
        if candidates.is_empty() {
            continue;
        }
        stats.location_ner_found += 1;

        for candidate in candidates.iter().take(MAX_RESOLVE_CANDIDATES) {
            if let Some(resolved) = resolver.resolve(candidate).await {
                debug!(
                    source = %record.source,
                    source_id = %record.source_id,
                    surface = %candidate,
                    lat = resolved.lat,
                    lon = resolved.lon,
                    "Location resolved"
                );
                record.location_name = Some(resolved.name);
                record.lat = Some(resolved.lat);
                record.lon = Some(resolved.lon);
                stats.location_resolved += 1;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geopulse_common::{LexiconRecognizer, SourceKind};

    use crate::gazetteer::ResolvedLocation;

    /// Resolver stub mapping fixed surfaces to fixed coordinates.
    struct StubResolver(Vec<(&'static str, f64, f64)>);

    #[async_trait]
    impl LocationResolver for StubResolver {
        async fn resolve(&self, surface: &str) -> Option<ResolvedLocation> {
            let lower = surface.to_lowercase();
            self.0.iter().find(|(name, _, _)| *name == lower).map(|(name, lat, lon)| {
                ResolvedLocation { name: name.to_string(), lat: *lat, lon: *lon }
            })
        }
    }

    fn record_with_title(title: &str) -> IngestionRecord {
        let mut r = IngestionRecord::new(SourceKind::Rss, "u1", 1_700_000_000);
        r.title = Some(title.to_string());
        r
    }

    #[tokio::test]
    async fn tokyo_headline_resolves() {
        let ner = LexiconRecognizer::new();
        let resolver = StubResolver(vec![("tokyo", 35.6895, 139.6917)]);
        let mut records = vec![record_with_title("Earthquake strikes Tokyo")];
        let mut stats = IngestStats::default();

        enrich_locations(&mut records, &ner, &resolver, &[], &mut stats).await;

        let r = &records[0];
        assert_eq!(r.location_name.as_deref(), Some("tokyo"));
        assert!((r.lat.unwrap() - 35.6895).abs() < 1e-6);
        assert!((r.lon.unwrap() - 139.6917).abs() < 1e-6);
        assert_eq!(stats.location_ner_attempted, 1);
        assert_eq!(stats.location_ner_found, 1);
        assert_eq!(stats.location_resolved, 1);
    }

    #[tokio::test]
    async fn located_records_left_alone() {
        let ner = LexiconRecognizer::new();
        let resolver = StubResolver(vec![("tokyo", 35.6895, 139.6917)]);
        let mut r = record_with_title("Earthquake strikes Tokyo");
        r.lat = Some(1.0);
        r.lon = Some(2.0);
        let mut stats = IngestStats::default();

        enrich_locations(&mut [r], &ner, &resolver, &[], &mut stats).await;
        assert_eq!(stats.location_ner_attempted, 0);
    }

    #[tokio::test]
    async fn resolver_miss_leaves_record_unlocated() {
        let ner = LexiconRecognizer::new();
        let resolver = StubResolver(vec![]);
        let mut records = vec![record_with_title("Earthquake strikes Tokyo")];
        let mut stats = IngestStats::default();

        enrich_locations(&mut records, &ner, &resolver, &[], &mut stats).await;
        assert!(records[0].lat.is_none());
        assert_eq!(stats.location_ner_found, 1);
        assert_eq!(stats.location_resolved, 0);
    }

    #[test]
    fn candidate_filters_apply() {
        let ner = LexiconRecognizer::new();
        let stopwords = vec!["der".to_string()];
        // "Tokyo" passes; "it" (stop/short) never surfaces from NER anyway;
        // duplicate mention of Tokyo collapses to one candidate.
        let candidates = location_candidates(
            &ner,
            "Fires near Tokyo tonight; TOKYO officials respond; Der Spiegel reports",
            &stopwords,
        );
        let lowered: Vec<String> = candidates.iter().map(|c| c.to_lowercase()).collect();
        assert_eq!(
            lowered.iter().filter(|c| c.contains("tokyo")).count(),
            1,
            "case-insensitive dedup: {candidates:?}"
        );
    }
}
