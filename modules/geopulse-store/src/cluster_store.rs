use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use geopulse_common::Cluster;

use crate::error::{Result, StoreError};
use crate::rows::ClusterRow;

/// Writes and reads for the clusters table. The clustering engine is the
/// only writer.
#[derive(Clone)]
pub struct ClusterStore {
    pool: PgPool,
}

#[derive(Debug, Clone)]
pub struct NewCluster {
    pub title: Option<String>,
    pub representative_lat: Option<f64>,
    pub representative_lon: Option<f64>,
    pub representative_location_name: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl ClusterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: &NewCluster) -> Result<Cluster> {
        let row = sqlx::query_as::<_, ClusterRow>(
            r#"
            INSERT INTO clusters
                (cluster_id, title, representative_lat, representative_lon,
                 representative_location_name, item_count, first_seen_at, last_seen_at,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(new.representative_lat)
        .bind(new.representative_lon)
        .bind(&new.representative_location_name)
        .bind(new.first_seen_at)
        .bind(new.last_seen_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    pub async fn get(&self, cluster_id: Uuid) -> Result<Option<Cluster>> {
        let row = sqlx::query_as::<_, ClusterRow>("SELECT * FROM clusters WHERE cluster_id = $1")
            .bind(cluster_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Clusters active within the window, newest first. Feeds the
    /// in-memory index refresh.
    pub async fn active_within(&self, hours: i64, limit: i64) -> Result<Vec<Cluster>> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let rows = sqlx::query_as::<_, ClusterRow>(
            r#"
            SELECT * FROM clusters
            WHERE last_seen_at IS NOT NULL AND last_seen_at >= $1
            ORDER BY last_seen_at DESC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Representative text fallback: title and body of the newest member.
    pub async fn newest_member_text(&self, cluster_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            r#"
            SELECT title, text FROM items
            WHERE cluster_id = $1
            ORDER BY COALESCE(published_at, collected_at) DESC
            LIMIT 1
            "#,
        )
        .bind(cluster_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(title, text)| {
            let title = title.unwrap_or_default();
            let text = text.unwrap_or_default();
            format!("{} {}", title.trim(), text.trim()).trim().to_string()
        }))
    }

    /// Assign an item to a cluster and bump the cluster aggregates, all in
    /// one transaction. A cluster deleted between index read and persist
    /// surfaces as `StaleCluster`; the caller drops the index entry and
    /// retries the item on the next pass.
    pub async fn assign_item(&self, item_id: i64, cluster_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, i32>("SELECT 1 FROM clusters WHERE cluster_id = $1")
            .bind(cluster_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::StaleCluster(cluster_id));
        }

        sqlx::query("UPDATE items SET cluster_id = $1 WHERE id = $2")
            .bind(cluster_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE clusters SET
                first_seen_at = COALESCE(first_seen_at, now()),
                last_seen_at = now(),
                updated_at = now(),
                item_count = (SELECT COUNT(*) FROM items WHERE cluster_id = $1)
            WHERE cluster_id = $1
            "#,
        )
        .bind(cluster_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Recompute aggregates for clusters touched within the window:
    /// member-mean coordinates, modal location name, min/max of
    /// COALESCE(published_at, collected_at), exact item_count.
    pub async fn recalculate_stats(&self, touched_within_hours: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::hours(touched_within_hours);
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT cluster_id FROM clusters WHERE updated_at >= $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for id in &ids {
            let result = sqlx::query(
                r#"
                UPDATE clusters c SET
                    item_count = stats.n,
                    representative_lat = COALESCE(stats.avg_lat, c.representative_lat),
                    representative_lon = COALESCE(stats.avg_lon, c.representative_lon),
                    representative_location_name =
                        COALESCE(stats.modal_name, c.representative_location_name),
                    first_seen_at = COALESCE(stats.first_seen, c.first_seen_at),
                    last_seen_at = COALESCE(stats.last_seen, c.last_seen_at)
                FROM (
                    SELECT
                        COUNT(*) AS n,
                        AVG(lat) FILTER (WHERE lat IS NOT NULL AND lon IS NOT NULL) AS avg_lat,
                        AVG(lon) FILTER (WHERE lat IS NOT NULL AND lon IS NOT NULL) AS avg_lon,
                        MIN(COALESCE(published_at, collected_at)) AS first_seen,
                        MAX(COALESCE(published_at, collected_at)) AS last_seen,
                        (
                            SELECT location_name FROM items
                            WHERE cluster_id = $1 AND location_name IS NOT NULL
                            GROUP BY location_name
                            ORDER BY COUNT(*) DESC
                            LIMIT 1
                        ) AS modal_name
                    FROM items WHERE cluster_id = $1
                ) AS stats
                WHERE c.cluster_id = $1
                "#,
            )
            .bind(id)
            .execute(&self.pool)
            .await;

            if let Err(e) = result {
                warn!(cluster_id = %id, error = %e, "Failed to recalculate cluster stats");
            }
        }

        Ok(ids.len() as u64)
    }

    /// Delete clusters idle past the horizon. Members are detached first so
    /// they become eligible for re-clustering.
    pub async fn cleanup_older_than(&self, max_age_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT cluster_id FROM clusters WHERE last_seen_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut removed = 0u64;
        for id in ids {
            let mut tx = self.pool.begin().await?;
            sqlx::query("UPDATE items SET cluster_id = NULL WHERE cluster_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM clusters WHERE cluster_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            removed += 1;
        }

        if removed > 0 {
            info!(removed, "Cleaned up idle clusters");
        }
        Ok(removed)
    }

    /// Clusters for the read API, most recently active first.
    pub async fn seen_since(&self, since: Option<DateTime<Utc>>, limit: i64) -> Result<Vec<Cluster>> {
        let rows = match since {
            Some(t) => {
                sqlx::query_as::<_, ClusterRow>(
                    r#"
                    SELECT * FROM clusters
                    WHERE last_seen_at >= $1
                    ORDER BY last_seen_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(t)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ClusterRow>(
                    "SELECT * FROM clusters ORDER BY last_seen_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
