//! The clustering service: scan unassigned items, match each against the
//! index, persist the assignment (or open a new cluster), and keep the
//! index fresh on a timer channel with a force-refresh path. The index
//! is owned by this worker alone.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use geopulse_common::{EntityRecognizer, NormalizedItem};
use geopulse_store::{ClusterStore, ItemStore, NewCluster, StoreError};

use crate::index::ClusterIndex;
use crate::matcher::{ItemFeatures, Matcher};

const INDEX_WINDOW_HOURS: i64 = 72;
const INDEX_LIMIT: i64 = 5000;
const REFRESH_INTERVAL: Duration = Duration::from_secs(300);
const BATCH_SIZE: i64 = 100;
/// Per-pass ceiling; anything left is picked up next poll.
const SAFETY_LIMIT: u64 = 10_000;
const RECALC_WINDOW_HOURS: i64 = 1;

#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    pub processed: u64,
    pub clustered: u64,
    pub new_clusters: u64,
    pub skipped_stale: u64,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} clustered={} new_clusters={} skipped_stale={}",
            self.processed, self.clustered, self.new_clusters, self.skipped_stale
        )
    }
}

pub struct ClusteringEngine {
    items: ItemStore,
    clusters: ClusterStore,
    ner: Box<dyn EntityRecognizer>,
    matcher: Matcher,
    index: ClusterIndex,
    cleanup_max_age_days: i64,
    stats: EngineStats,
}

impl ClusteringEngine {
    pub fn new(
        items: ItemStore,
        clusters: ClusterStore,
        ner: Box<dyn EntityRecognizer>,
        matcher: Matcher,
        cleanup_max_age_days: i64,
    ) -> Self {
        Self {
            items,
            clusters,
            ner,
            matcher,
            index: ClusterIndex::new(),
            cleanup_max_age_days,
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Rebuild the index from clusters active in the window. The
    /// representative text prefers the cluster title and falls back to
    /// the newest member's title and body.
    pub async fn refresh_index(&mut self) -> Result<(), StoreError> {
        let clusters = self.clusters.active_within(INDEX_WINDOW_HOURS, INDEX_LIMIT).await?;
        let mut reps = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let rep_text = match &cluster.title {
                Some(title) if !title.trim().is_empty() => title.clone(),
                _ => match self.clusters.newest_member_text(cluster.cluster_id).await? {
                    Some(text) if !text.is_empty() => text,
                    _ => continue,
                },
            };
            reps.push((cluster.cluster_id, rep_text, cluster.last_seen_at));
        }
        info!(entries = reps.len(), "Cluster index refreshed");
        self.index.refresh_with(self.ner.as_ref(), reps);
        Ok(())
    }

    /// One pass over the unassigned backlog, bounded by the safety limit.
    pub async fn process_unassigned(&mut self) -> Result<EngineStats, StoreError> {
        let total = self.items.count_unassigned().await?;
        if total == 0 {
            return Ok(self.stats);
        }
        info!(total, "Found unassigned items");

        let mut handled: u64 = 0;
        // Items we skipped stay unassigned, so they must be jumped over
        // when the next batch is fetched.
        let mut skipped: i64 = 0;

        while handled < SAFETY_LIMIT {
            let batch = self.items.unassigned(BATCH_SIZE, skipped).await?;
            if batch.is_empty() {
                break;
            }
            for item in batch {
                handled += 1;
                match self.assign_one(&item).await {
                    Ok(true) => {}
                    Ok(false) => skipped += 1,
                    Err(e) => {
                        error!(item_id = item.id, error = %e, "Error clustering item");
                        skipped += 1;
                    }
                }
                if handled >= SAFETY_LIMIT {
                    warn!("Reached per-pass safety limit; deferring the rest");
                    break;
                }
            }
        }

        info!(handled, "Clustering pass complete: {}", self.stats);
        Ok(self.stats)
    }

    /// Returns Ok(true) if the item ended up in a cluster, Ok(false) if
    /// it was skipped for this pass (stale index entry, empty text).
    async fn assign_one(&mut self, item: &NormalizedItem) -> Result<bool, StoreError> {
        let text = item.combined_text();
        if text.is_empty() {
            // Nothing to match on; leave it for a future pass in case a
            // backfill adds text.
            return Ok(false);
        }

        let features = ItemFeatures::compute(self.ner.as_ref(), &text);
        let now = Utc::now();

        if let Some(found) = self.matcher.assign(&features, &self.index, now) {
            match self.clusters.assign_item(item.id, found.cluster_id).await {
                Ok(()) => {
                    self.stats.processed += 1;
                    self.stats.clustered += 1;
                    tracing::debug!(
                        item_id = item.id,
                        cluster_id = %found.cluster_id,
                        score = found.score,
                        kind = found.kind.as_str(),
                        "Item joined cluster"
                    );
                    return Ok(true);
                }
                Err(StoreError::StaleCluster(id)) => {
                    // Deleted between index read and persist: drop the
                    // entry and retry the item next pass.
                    warn!(cluster_id = %id, "Stale index entry dropped");
                    self.index.remove(id);
                    self.stats.skipped_stale += 1;
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }

        // No good match anywhere: open a new cluster and make it visible
        // to the rest of this batch immediately.
        let title: String = text.chars().take(200).collect();
        let created = self
            .clusters
            .create(&NewCluster {
                title: Some(title.clone()),
                representative_lat: item.lat,
                representative_lon: item.lon,
                representative_location_name: item.location_name.clone(),
                first_seen_at: item.preferred_time(),
                last_seen_at: item.preferred_time(),
            })
            .await?;
        self.clusters.assign_item(item.id, created.cluster_id).await?;
        self.index.add_or_update(
            self.ner.as_ref(),
            created.cluster_id,
            &title,
            created.last_seen_at,
        );

        self.stats.processed += 1;
        self.stats.new_clusters += 1;
        tracing::debug!(item_id = item.id, cluster_id = %created.cluster_id, "Opened new cluster");
        Ok(true)
    }

    /// Maintenance: recompute aggregates for recently touched clusters
    /// and delete clusters idle past the horizon.
    pub async fn maintain(&mut self) -> Result<(), StoreError> {
        let recalculated = self.clusters.recalculate_stats(RECALC_WINDOW_HOURS).await?;
        if recalculated > 0 {
            info!(recalculated, "Recalculated cluster stats");
        }
        let removed = self.clusters.cleanup_older_than(self.cleanup_max_age_days).await?;
        if removed > 0 {
            // Members were detached; they re-cluster on the next pass.
            self.refresh_index().await?;
        }
        Ok(())
    }

    /// Run forever: a poll tick drives assignment, a refresh tick (or a
    /// message on `force_refresh`) rebuilds the index and runs
    /// maintenance.
    pub async fn run(
        &mut self,
        poll_interval: Duration,
        mut force_refresh: mpsc::Receiver<()>,
    ) -> Result<()> {
        if let Err(e) = self.refresh_index().await {
            warn!(error = %e, "Initial index refresh failed");
        }

        let mut poll = tokio::time::interval(poll_interval);
        let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
        refresh.reset(); // the initial refresh just happened

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.process_unassigned().await {
                        error!(error = %e, "Clustering pass failed; will retry");
                    }
                }
                _ = refresh.tick() => {
                    if let Err(e) = self.refresh_index().await {
                        warn!(error = %e, "Index refresh failed");
                    }
                    if let Err(e) = self.maintain().await {
                        warn!(error = %e, "Cluster maintenance failed");
                    }
                }
                Some(()) = force_refresh.recv() => {
                    info!("Force refresh requested");
                    if let Err(e) = self.refresh_index().await {
                        warn!(error = %e, "Forced index refresh failed");
                    }
                }
            }
        }
    }
}
