//! The ingestion pipeline: drain the intake queue on a poll interval and
//! push every batch through a fixed sequence — validate, intra-batch
//! dedup, store dedup, location enrichment, persist. Each record persists
//! in its own transaction; a bad record costs only itself, a database
//! error aborts the batch and the poll loop retries after a sleep.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{error, info, warn};

use geopulse_common::{
    epoch_secs_to_utc, parse_iso_datetime, validate_record, EntityRecognizer, IngestionRecord,
};
use geopulse_intake::IntakeClient;
use geopulse_store::{ItemStore, NewItem, StoreError, UpsertOutcome};

use crate::enrich;
use crate::gazetteer::LocationResolver;
use crate::stats::IngestStats;

pub struct IngestPipeline {
    intake: IntakeClient,
    items: ItemStore,
    ner: Box<dyn EntityRecognizer>,
    resolver: Box<dyn LocationResolver>,
    stopwords: Vec<String>,
    batch_size: usize,
    stats: IngestStats,
}

/// Why a record was not persisted. Every variant maps to exactly one
/// stats counter.
#[derive(Debug, PartialEq, Eq)]
enum RecordSkip {
    Ignored,
    NoLocation,
    MissingPublishedAt,
    InvalidCollectedAt,
    InvalidPublishedAt,
}

impl IngestPipeline {
    pub fn new(
        intake: IntakeClient,
        items: ItemStore,
        ner: Box<dyn EntityRecognizer>,
        resolver: Box<dyn LocationResolver>,
        stopwords: Vec<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            intake,
            items,
            ner,
            resolver,
            stopwords,
            batch_size: batch_size.clamp(1, 250),
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Poll the intake queue forever. Database errors sleep and retry;
    /// nothing here brings the process down.
    pub async fn run(&mut self, poll_interval: Duration) {
        info!(poll_secs = poll_interval.as_secs(), "Starting ingestion loop");
        loop {
            match self.intake.drain_raw_items().await {
                Ok(records) if !records.is_empty() => {
                    let before = self.stats;
                    if let Err(e) = self.process_records(records).await {
                        error!(error = %e, "Batch processing failed; will retry next poll");
                    }
                    if self.stats != before {
                        info!("Processed batch; stats: {}", self.stats);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Intake queue drain failed"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Process a pile of records in batches of `batch_size`.
    pub async fn process_records(
        &mut self,
        records: Vec<IngestionRecord>,
    ) -> Result<IngestStats, StoreError> {
        let mut batch = Vec::with_capacity(self.batch_size);
        for record in records {
            batch.push(record);
            if batch.len() >= self.batch_size {
                self.process_batch(std::mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            self.process_batch(batch).await?;
        }
        Ok(self.stats)
    }

    async fn process_batch(&mut self, records: Vec<IngestionRecord>) -> Result<(), StoreError> {
        // 1 + 2: validate, then intra-batch dedup
        let survivors = prepare_batch(records, &mut self.stats);
        if survivors.is_empty() {
            return Ok(());
        }

        // 3: store dedup — one existence query per source
        let mut existing: HashSet<(String, String)> = HashSet::new();
        let mut by_source: std::collections::HashMap<String, Vec<String>> =
            std::collections::HashMap::new();
        for r in &survivors {
            by_source.entry(r.source.clone()).or_default().push(r.source_id.clone());
        }
        for (source, ids) in by_source {
            for id in self.items.existing_source_ids(&source, &ids).await? {
                existing.insert((source.clone(), id));
            }
        }
        let mut survivors = drop_existing(survivors, &existing, &mut self.stats);
        if survivors.is_empty() {
            return Ok(());
        }

        // 4: location enrichment for records that still lack coordinates
        enrich::enrich_locations(
            &mut survivors,
            self.ner.as_ref(),
            self.resolver.as_ref(),
            &self.stopwords,
            &mut self.stats,
        )
        .await;

        // 5: persist, one transaction per record
        for record in survivors {
            match classify_for_persist(&record) {
                Err(skip) => self.count_skip(&record, skip),
                Ok(item) => match self.items.upsert(&item).await {
                    Ok(UpsertOutcome::Inserted(_)) => self.stats.inserted += 1,
                    Ok(UpsertOutcome::Duplicate) => self.stats.skipped_duplicates += 1,
                    Err(e) => {
                        self.stats.unknown_error += 1;
                        error!(
                            source = %record.source,
                            source_id = %record.source_id,
                            error = %e,
                            "Database error storing item"
                        );
                        return Err(e);
                    }
                },
            }
        }

        Ok(())
    }

    fn count_skip(&mut self, record: &IngestionRecord, skip: RecordSkip) {
        match skip {
            RecordSkip::Ignored => self.stats.ignored += 1,
            RecordSkip::NoLocation => {
                warn!(source = %record.source, source_id = %record.source_id, "No location data");
                self.stats.no_location_data += 1;
            }
            RecordSkip::MissingPublishedAt => {
                warn!(source = %record.source, source_id = %record.source_id, "Missing published_at");
                self.stats.missing_published_at += 1;
            }
            RecordSkip::InvalidCollectedAt => self.stats.invalid_collected_at += 1,
            RecordSkip::InvalidPublishedAt => self.stats.invalid_published_at += 1,
        }
    }
}

/// Validation plus intra-batch dedup. Later occurrences of the same
/// (source, source_id) lose.
fn prepare_batch(records: Vec<IngestionRecord>, stats: &mut IngestStats) -> Vec<IngestionRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        stats.processed += 1;

        let errors = validate_record(&record);
        if !errors.is_empty() {
            warn!(
                source = %record.source,
                source_id = %record.source_id,
                ?errors,
                "Invalid record dropped"
            );
            stats.validation_errors += 1;
            continue;
        }

        if !seen.insert((record.source.clone(), record.source_id.clone())) {
            stats.skipped_duplicates += 1;
            continue;
        }
        out.push(record);
    }
    out
}

/// Store dedup against the keys an existence query returned.
fn drop_existing(
    records: Vec<IngestionRecord>,
    existing: &HashSet<(String, String)>,
    stats: &mut IngestStats,
) -> Vec<IngestionRecord> {
    records
        .into_iter()
        .filter(|r| {
            let present = existing.contains(&(r.source.clone(), r.source_id.clone()));
            if present {
                stats.skipped_duplicates += 1;
            }
            !present
        })
        .collect()
}

/// The persistence gate: domain ignores, required fields, timestamp
/// parsing. Pure — the store only ever sees records that passed.
fn classify_for_persist(record: &IngestionRecord) -> Result<NewItem, RecordSkip> {
    if record.source == "mastodon" && record.source_id.contains("emsc") {
        return Err(RecordSkip::Ignored);
    }
    if !record.has_location() {
        return Err(RecordSkip::NoLocation);
    }
    let Some(published_raw) = record.published_at.as_deref() else {
        return Err(RecordSkip::MissingPublishedAt);
    };

    let collected_at =
        epoch_secs_to_utc(record.collected_at).ok_or(RecordSkip::InvalidCollectedAt)?;
    let published_at =
        parse_iso_datetime(published_raw).ok_or(RecordSkip::InvalidPublishedAt)?;

    Ok(NewItem {
        source: record.source.clone(),
        source_id: record.source_id.clone(),
        collected_at,
        published_at: Some(published_at),
        title: record.title.clone(),
        text: record.text.clone(),
        url: record.url.clone(),
        author: record.author.clone(),
        media_urls: record.media_urls.as_ref().and_then(|m| serde_json::to_value(m).ok()),
        entities: record.entities.as_ref().and_then(|e| serde_json::to_value(e).ok()),
        location_name: record.location_name.clone(),
        lat: record.lat,
        lon: record.lon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geopulse_common::SourceKind;

    fn located_record(source_id: &str) -> IngestionRecord {
        let mut r = IngestionRecord::new(SourceKind::Rss, source_id, 1_700_000_000);
        r.title = Some("Something happened".to_string());
        r.published_at = Some("2026-01-17T10:00:00Z".to_string());
        r.lat = Some(46.05);
        r.lon = Some(14.51);
        r
    }

    #[test]
    fn intra_batch_dedup_drops_later_occurrence() {
        let mut stats = IngestStats::default();
        let batch = vec![located_record("https://x/y"), located_record("https://x/y")];
        let survivors = prepare_batch(batch, &mut stats);
        assert_eq!(survivors.len(), 1);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.skipped_duplicates, 1);
    }

    #[test]
    fn same_source_id_different_source_both_survive() {
        let mut stats = IngestStats::default();
        let mut from_gdelt = located_record("https://x/y");
        from_gdelt.source = SourceKind::Gdelt.to_string();
        let batch = vec![located_record("https://x/y"), from_gdelt];
        let survivors = prepare_batch(batch, &mut stats);
        assert_eq!(survivors.len(), 2, "identity is (source, source_id)");
    }

    #[test]
    fn invalid_records_are_counted_and_dropped() {
        let mut stats = IngestStats::default();
        let mut bad = located_record("u");
        bad.collected_at = 0;
        let survivors = prepare_batch(vec![bad, located_record("v")], &mut stats);
        assert_eq!(survivors.len(), 1);
        assert_eq!(stats.validation_errors, 1);
    }

    #[test]
    fn store_dedup_respects_existing_keys() {
        let mut stats = IngestStats::default();
        let mut existing = HashSet::new();
        existing.insert(("rss".to_string(), "https://x/y".to_string()));

        let survivors = drop_existing(
            vec![located_record("https://x/y"), located_record("https://x/z")],
            &existing,
            &mut stats,
        );
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].source_id, "https://x/z");
        assert_eq!(stats.skipped_duplicates, 1);
    }

    #[test]
    fn emsc_mastodon_records_are_ignored() {
        let mut r = located_record("emsc-12345");
        r.source = SourceKind::Mastodon.to_string();
        assert_eq!(classify_for_persist(&r).unwrap_err(), RecordSkip::Ignored);
    }

    #[test]
    fn unlocated_record_is_skipped() {
        let mut r = located_record("u");
        r.lat = None;
        r.lon = None;
        assert_eq!(classify_for_persist(&r).unwrap_err(), RecordSkip::NoLocation);
    }

    #[test]
    fn missing_published_at_is_skipped() {
        let mut r = located_record("u");
        r.published_at = None;
        assert_eq!(
            classify_for_persist(&r).unwrap_err(),
            RecordSkip::MissingPublishedAt
        );
    }

    #[test]
    fn bad_published_at_is_invalid() {
        let mut r = located_record("u");
        r.published_at = Some("not a date".to_string());
        assert_eq!(
            classify_for_persist(&r).unwrap_err(),
            RecordSkip::InvalidPublishedAt
        );
    }

    #[test]
    fn good_record_maps_to_new_item() {
        let item = classify_for_persist(&located_record("u")).unwrap();
        assert_eq!(item.source, "rss");
        assert_eq!(item.lat, Some(46.05));
        assert!(item.published_at.is_some());
    }

    #[test]
    fn naive_published_at_defaults_to_utc() {
        let mut r = located_record("u");
        r.published_at = Some("2026-01-17T10:00:00".to_string());
        let item = classify_for_persist(&r).unwrap();
        assert_eq!(
            item.published_at.unwrap().to_rfc3339(),
            "2026-01-17T10:00:00+00:00"
        );
    }
}
