use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use geopulse_common::{parse_iso_datetime, Cluster, NormalizedItem};

use crate::AppState;

const DEFAULT_LIMIT: i64 = 2000;
const MAX_LIMIT: i64 = 5000;

#[derive(Deserialize)]
pub struct ClustersQuery {
    since: Option<String>,
    limit: Option<i64>,
}

/// `since` accepts "24h", "7d", or ISO-8601. Unparseable values are
/// treated as absent rather than erroring — the map keeps rendering.
pub fn parse_since(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(hours) = s.strip_suffix('h').and_then(|n| n.parse::<i64>().ok()) {
        return Some(now - Duration::hours(hours));
    }
    if let Some(days) = s.strip_suffix('d').and_then(|n| n.parse::<i64>().ok()) {
        return Some(now - Duration::days(days));
    }
    parse_iso_datetime(s)
}

fn item_json(item: &NormalizedItem) -> serde_json::Value {
    json!({
        "id": item.id,
        "source": item.source,
        "source_id": item.source_id,
        "collected_at": item.collected_at.to_rfc3339(),
        "published_at": item.published_at.map(|t| t.to_rfc3339()),
        "title": item.title,
        "text": item.text,
        "url": item.url,
        "author": item.author,
        "media_urls": item.media_urls,
        "entities": item.entities,
        "location_name": item.location_name,
        "lat": item.lat,
        "lon": item.lon,
        "cluster_id": item.cluster_id.map(|id| id.to_string()),
    })
}

/// Clusters without representative coordinates have nothing to put on a
/// map and are left out of the FeatureCollection.
pub fn clusters_to_geojson(clusters: &[(Cluster, Vec<NormalizedItem>)]) -> serde_json::Value {
    let features: Vec<serde_json::Value> = clusters
        .iter()
        .filter_map(|(cluster, items)| {
            let lat = cluster.representative_lat?;
            let lon = cluster.representative_lon?;
            Some(json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [lon, lat] },
                "properties": {
                    "cluster_id": cluster.cluster_id.to_string(),
                    "item_count": cluster.item_count,
                    "title": cluster.title,
                    "summary": cluster.summary,
                    "tags": cluster.tags,
                    "representative_location_name": cluster.representative_location_name,
                    "representative_lat": lat,
                    "representative_lon": lon,
                    "first_seen_at": cluster.first_seen_at.map(|t| t.to_rfc3339()),
                    "last_seen_at": cluster.last_seen_at.map(|t| t.to_rfc3339()),
                    "created_at": cluster.created_at.to_rfc3339(),
                    "updated_at": cluster.updated_at.to_rfc3339(),
                    "items": items.iter().map(item_json).collect::<Vec<_>>(),
                },
            }))
        })
        .collect();

    json!({ "type": "FeatureCollection", "features": features })
}

pub async fn get_clusters(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClustersQuery>,
) -> impl IntoResponse {
    let since = params.since.as_deref().and_then(|s| parse_since(s, Utc::now()));
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let clusters = match state.clusters.seen_since(since, limit).await {
        Ok(clusters) => clusters,
        Err(e) => {
            warn!(error = %e, "Failed to load clusters");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load clusters");
        }
    };

    let mut with_items = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        match state.items.items_for_cluster(cluster.cluster_id).await {
            Ok(items) => with_items.push((cluster, items)),
            Err(e) => {
                warn!(cluster_id = %cluster.cluster_id, error = %e, "Failed to load cluster items");
                with_items.push((cluster, Vec::new()));
            }
        }
    }

    Json(clusters_to_geojson(&with_items)).into_response()
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.items.counts().await {
        Ok(counts) => Json(json!({
            "items": counts.items,
            "clustered_items": counts.clustered_items,
            "clusters": counts.clusters,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to load stats");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load stats")
        }
    }
}

pub async fn delete_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.items.delete_all().await {
        Ok(()) => Json(json!({ "status": "success" })).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to delete data");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to delete data")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn since_relative_hours_and_days() {
        let now = Utc::now();
        let t = parse_since("24h", now).unwrap();
        assert_eq!((now - t).num_hours(), 24);
        let t = parse_since("7d", now).unwrap();
        assert_eq!((now - t).num_days(), 7);
    }

    #[test]
    fn since_iso_and_garbage() {
        let now = Utc::now();
        let t = parse_since("2026-01-15T10:30:00Z", now).unwrap();
        assert_eq!(t.to_rfc3339(), "2026-01-15T10:30:00+00:00");
        assert!(parse_since("soonish", now).is_none());
        assert!(parse_since("", now).is_none());
    }

    fn cluster(lat: Option<f64>, lon: Option<f64>) -> Cluster {
        Cluster {
            cluster_id: Uuid::new_v4(),
            title: Some("Quake near Tokyo".to_string()),
            summary: None,
            tags: vec![],
            representative_lat: lat,
            representative_lon: lon,
            representative_location_name: Some("Tokyo".to_string()),
            item_count: 2,
            first_seen_at: Some(Utc::now()),
            last_seen_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn geojson_skips_unlocated_clusters() {
        let located = cluster(Some(35.7), Some(139.7));
        let unlocated = cluster(None, None);
        let value = clusters_to_geojson(&[(located, vec![]), (unlocated, vec![])]);

        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["geometry"]["coordinates"][0], 139.7);
        assert_eq!(features[0]["properties"]["item_count"], 2);
    }
}
