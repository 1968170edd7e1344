//! Read-side API: clusters as GeoJSON for the map, counts for the
//! sidebar, and a wipe endpoint for development resets. This layer only
//! reads what the pipeline and engine wrote — its one job is shaping.

pub mod routes;

use std::sync::Arc;

use axum::{routing::delete, routing::get, Router};
use tower_http::cors::CorsLayer;

use geopulse_store::{ClusterStore, ItemStore};

pub struct AppState {
    pub items: ItemStore,
    pub clusters: ClusterStore,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/clusters", get(routes::get_clusters))
        .route("/api/stats", get(routes::get_stats))
        .route("/api/delete-all", delete(routes::delete_all))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
