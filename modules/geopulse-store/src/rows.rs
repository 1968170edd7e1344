// Row structs are internal; the store surfaces the shared model types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use geopulse_common::{Cluster, NormalizedItem};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
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
    pub cluster_id: Option<Uuid>,
}

impl From<ItemRow> for NormalizedItem {
    fn from(r: ItemRow) -> Self {
        NormalizedItem {
            id: r.id,
            source: r.source,
            source_id: r.source_id,
            collected_at: r.collected_at,
            published_at: r.published_at,
            title: r.title,
            text: r.text,
            url: r.url,
            author: r.author,
            media_urls: r.media_urls,
            entities: r.entities,
            location_name: r.location_name,
            lat: r.lat,
            lon: r.lon,
            cluster_id: r.cluster_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ClusterRow {
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

impl From<ClusterRow> for Cluster {
    fn from(r: ClusterRow) -> Self {
        Cluster {
            cluster_id: r.cluster_id,
            title: r.title,
            summary: r.summary,
            tags: r.tags,
            representative_lat: r.representative_lat,
            representative_lon: r.representative_lon,
            representative_location_name: r.representative_location_name,
            item_count: r.item_count,
            first_seen_at: r.first_seen_at,
            last_seen_at: r.last_seen_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
