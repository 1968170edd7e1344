//! HTTP surface over the intake queue — the only inter-component
//! interface in the system. Permissive CORS, ~100 MB body cap, no auth.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::queue::IntakeQueue;

const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

#[derive(Deserialize)]
struct PostBody {
    key: String,
    value: serde_json::Value,
}

pub fn router(queue: Arc<IntakeQueue>) -> Router {
    Router::new()
        .route("/get/{key}", get(handle_get))
        .route("/post", post(handle_post))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(queue)
}

pub async fn serve(queue: Arc<IntakeQueue>, address: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((address, port)).await?;
    info!(address, port, "Intake queue listening");
    axum::serve(listener, router(queue)).await?;
    Ok(())
}

async fn handle_get(
    State(queue): State<Arc<IntakeQueue>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match key.as_str() {
        "raw_items" => {
            let items = queue.drain_raw_items();
            Json(json!({ "raw_items": items })).into_response()
        }
        "tweet_sources" => {
            Json(json!({ "tweet_sources": queue.tweet_sources() })).into_response()
        }
        "search_queries" => {
            Json(json!({ "search_queries": queue.search_queries() })).into_response()
        }
        "health" => Json(serde_json::to_value(queue.health()).unwrap_or_default()).into_response(),
        _ => (StatusCode::NOT_FOUND, "Key not found").into_response(),
    }
}

async fn handle_post(
    State(queue): State<Arc<IntakeQueue>>,
    Json(body): Json<PostBody>,
) -> impl IntoResponse {
    match body.key.as_str() {
        "raw_items" => match body.value {
            serde_json::Value::Array(items) => {
                let (added, queue_size) = queue.push_raw_items(items);
                Json(json!({
                    "status": "success",
                    "added": added,
                    "queue_size": queue_size,
                }))
                .into_response()
            }
            _ => error_response("raw_items must be an array"),
        },
        "tweet_sources" => match serde_json::from_value(body.value) {
            Ok(map) => {
                queue.set_tweet_sources(map);
                Json(json!({
                    "status": "success",
                    "tweet_sources": queue.tweet_sources(),
                }))
                .into_response()
            }
            Err(_) => error_response("tweet_sources must be an object of booleans"),
        },
        "search_queries" => match serde_json::from_value(body.value) {
            Ok(list) => {
                queue.set_search_queries(list);
                Json(json!({
                    "status": "success",
                    "search_queries": queue.search_queries(),
                }))
                .into_response()
            }
            Err(_) => error_response("search_queries must be an array of strings"),
        },
        _ => error_response("Unknown key"),
    }
}

fn error_response(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}
