//! Orchestrates connector execution: one worker task per enabled
//! connector, each on its own interval with capped error backoff, plus a
//! ten-second supervision cycle that respawns dead workers and persists
//! state. Workers never die silently — an error sleeps and retries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use geopulse_connectors::Connector;
use geopulse_intake::IntakeClient;

use crate::schedule::ConnectorSchedule;
use crate::state::SupervisorState;
use crate::types::SupervisorStats;

const SUPERVISION_INTERVAL: Duration = Duration::from_secs(10);
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(300);

pub struct Supervisor {
    intake: IntakeClient,
    state_path: PathBuf,
    state: SupervisorState,
    stats: Arc<Mutex<SupervisorStats>>,
    workers: HashMap<String, JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(intake: IntakeClient, state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let state = SupervisorState::load(&state_path);
        Self {
            intake,
            state_path,
            state,
            stats: Arc::new(Mutex::new(SupervisorStats {
                start_time: Some(Utc::now()),
                ..SupervisorStats::default()
            })),
            workers: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// A token callers can use to stop the supervisor from outside.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats.lock().expect("supervisor stats poisoned").clone()
    }

    /// Run until cancelled. Spawns every enabled connector, then loops the
    /// supervision cycle.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting supervisor");
        self.start_all_connectors();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(SUPERVISION_INTERVAL) => {
                    self.supervision_cycle();
                }
            }
        }

        self.stop().await;
        Ok(())
    }

    /// Cancel all workers, await completion, flush state.
    pub async fn stop(&mut self) {
        info!("Stopping supervisor");
        self.cancel.cancel();
        for (name, handle) in self.workers.drain() {
            if let Err(e) = handle.await {
                warn!(connector = %name, error = %e, "Worker ended abnormally");
            }
        }
        self.state.save(&self.state_path);
        info!("Supervisor stopped. Final stats: {}", self.stats());
    }

    fn start_all_connectors(&mut self) {
        let schedules: Vec<(String, ConnectorSchedule)> = self
            .state
            .schedules
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(name, s)| (name.clone(), s.clone()))
            .collect();
        for (name, schedule) in schedules {
            self.start_connector(&name, &schedule);
        }
    }

    fn start_connector(&mut self, name: &str, schedule: &ConnectorSchedule) {
        if self.workers.get(name).is_some_and(|h| !h.is_finished()) {
            return; // already running
        }

        let Some(connector) = geopulse_connectors::build(name, &schedule.config) else {
            error!(connector = name, "No connector implementation; skipping");
            return;
        };

        info!(connector = name, interval = schedule.interval_seconds, "Starting connector");
        let handle = tokio::spawn(run_worker(
            connector,
            Duration::from_secs(schedule.interval_seconds.max(1)),
            self.intake.clone(),
            self.stats.clone(),
            self.cancel.clone(),
        ));
        self.workers.insert(name.to_string(), handle);

        let mut stats = self.stats.lock().expect("supervisor stats poisoned");
        stats.connectors_scheduled += 1;
    }

    /// One supervision pass: heartbeat, respawn dead workers, persist
    /// state, log stats now and then.
    fn supervision_cycle(&mut self) {
        let completed = {
            let mut stats = self.stats.lock().expect("supervisor stats poisoned");
            stats.last_heartbeat = Some(Utc::now());
            stats.connectors_completed
        };

        let dead: Vec<(String, ConnectorSchedule)> = self
            .state
            .schedules
            .iter()
            .filter(|(name, s)| {
                s.enabled && self.workers.get(*name).map_or(true, |h| h.is_finished())
            })
            .map(|(name, s)| (name.clone(), s.clone()))
            .collect();

        for (name, schedule) in dead {
            warn!(connector = %name, "Worker is dead, respawning");
            self.workers.remove(&name);
            self.start_connector(&name, &schedule);
            self.stats.lock().expect("supervisor stats poisoned").restarts += 1;
        }

        self.state.save(&self.state_path);

        if completed > 0 && completed % 10 == 0 {
            info!("Supervisor stats: {}", self.stats());
        }
    }
}

/// The per-connector loop: fetch, hand the batch to the intake queue,
/// sleep the interval. On error: count it, sleep min(interval, 300 s),
/// continue.
async fn run_worker(
    connector: Box<dyn Connector>,
    interval: Duration,
    intake: IntakeClient,
    stats: Arc<Mutex<SupervisorStats>>,
    cancel: CancellationToken,
) {
    let name = connector.name();
    info!(connector = name, "Connector loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let started = std::time::Instant::now();
        let sleep_for = match connector.fetch().await {
            Ok(records) => {
                if !records.is_empty() {
                    match intake.push_records(&records).await {
                        Ok(queue_size) => {
                            info!(
                                connector = name,
                                records = records.len(),
                                queue_size,
                                "Pushed batch to intake queue"
                            );
                        }
                        Err(e) => {
                            error!(connector = name, error = %e, "Failed to push batch to intake queue");
                        }
                    }
                }

                let mut s = stats.lock().expect("supervisor stats poisoned");
                s.connectors_completed += 1;
                s.records_processed += records.len() as u64;
                drop(s);

                info!(
                    connector = name,
                    records = records.len(),
                    secs = started.elapsed().as_secs_f64(),
                    "Connector cycle complete"
                );
                interval
            }
            Err(e) => {
                error!(connector = name, error = %e, "Connector cycle failed");
                stats.lock().expect("supervisor stats poisoned").errors += 1;
                interval.min(MAX_ERROR_BACKOFF)
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }

    info!(connector = name, "Connector loop ended");
}
