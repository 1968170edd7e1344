/// Cumulative pipeline counters — the observability surface the tests
/// and the log line after every batch rely on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub processed: u64,
    pub inserted: u64,
    pub skipped_duplicates: u64,
    pub validation_errors: u64,
    pub no_location_data: u64,
    pub missing_published_at: u64,
    pub invalid_collected_at: u64,
    pub invalid_published_at: u64,
    pub ignored: u64,
    pub location_ner_attempted: u64,
    pub location_ner_found: u64,
    pub location_resolved: u64,
    pub unknown_error: u64,
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} inserted={} dup={} invalid={} no_loc={} no_pub={} \
             bad_ts={}/{} ignored={} ner={}/{}/{} unknown={}",
            self.processed,
            self.inserted,
            self.skipped_duplicates,
            self.validation_errors,
            self.no_location_data,
            self.missing_published_at,
            self.invalid_collected_at,
            self.invalid_published_at,
            self.ignored,
            self.location_ner_attempted,
            self.location_ner_found,
            self.location_resolved,
            self.unknown_error
        )
    }
}
