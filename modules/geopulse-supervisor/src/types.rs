use chrono::{DateTime, Utc};

/// Counters for the whole supervisor run, shared by every worker.
#[derive(Debug, Clone, Default)]
pub struct SupervisorStats {
    pub start_time: Option<DateTime<Utc>>,
    pub connectors_scheduled: u32,
    pub connectors_completed: u32,
    pub records_processed: u64,
    pub errors: u32,
    pub restarts: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl std::fmt::Display for SupervisorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scheduled={} completed={} records={} errors={} restarts={}",
            self.connectors_scheduled,
            self.connectors_completed,
            self.records_processed,
            self.errors,
            self.restarts
        )
    }
}
