use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use geopulse_common::NormalizedItem;

use crate::error::Result;
use crate::rows::ItemRow;

/// Writes and reads for the items table. The ingestion pipeline is the
/// only writer; the clustering engine and the read API are readers.
#[derive(Clone)]
pub struct ItemStore {
    pool: PgPool,
}

/// Fields for a fresh insert. `id` and `cluster_id` are owned by the store.
#[derive(Debug, Clone)]
pub struct NewItem {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Duplicate,
}

/// Counts surfaced by the read API.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    pub items: i64,
    pub clustered_items: i64,
    pub clusters: i64,
}

impl ItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert with `(source, source_id)` as the conflict target, action
    /// DO NOTHING. Races between connectors resolve here: the loser is a
    /// duplicate, never an error.
    pub async fn upsert(&self, item: &NewItem) -> Result<UpsertOutcome> {
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO items
                (source, source_id, collected_at, published_at, title, text, url,
                 author, media_urls, entities, location_name, lat, lon)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (source, source_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&item.source)
        .bind(&item.source_id)
        .bind(item.collected_at)
        .bind(item.published_at)
        .bind(&item.title)
        .bind(&item.text)
        .bind(&item.url)
        .bind(&item.author)
        .bind(&item.media_urls)
        .bind(&item.entities)
        .bind(&item.location_name)
        .bind(item.lat)
        .bind(item.lon)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some(id) => UpsertOutcome::Inserted(id),
            None => UpsertOutcome::Duplicate,
        })
    }

    /// Which of these source_ids already exist for a source. One query per
    /// source per batch; the pipeline's store-dedup stage.
    pub async fn existing_source_ids(
        &self,
        source: &str,
        source_ids: &[String],
    ) -> Result<HashSet<String>> {
        if source_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT source_id FROM items
            WHERE source = $1 AND source_id = ANY($2)
            "#,
        )
        .bind(source)
        .bind(source_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Items the clustering engine has not assigned yet, newest first.
    pub async fn unassigned(&self, limit: i64, offset: i64) -> Result<Vec<NormalizedItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT * FROM items
            WHERE cluster_id IS NULL
            ORDER BY collected_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count_unassigned(&self) -> Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items WHERE cluster_id IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// All members of a cluster, newest event first.
    pub async fn items_for_cluster(&self, cluster_id: uuid::Uuid) -> Result<Vec<NormalizedItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT * FROM items
            WHERE cluster_id = $1
            ORDER BY COALESCE(published_at, collected_at) DESC
            "#,
        )
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn counts(&self) -> Result<StoreCounts> {
        let (items, clustered_items, clusters) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM items),
                (SELECT COUNT(*) FROM items WHERE cluster_id IS NOT NULL),
                (SELECT COUNT(*) FROM clusters)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreCounts { items, clustered_items, clusters })
    }

    /// Truncate both stores. Only the read API's delete-all endpoint calls
    /// this.
    pub async fn delete_all(&self) -> Result<()> {
        sqlx::query("TRUNCATE items, clusters RESTART IDENTITY")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
