use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geopulse_api::{router, AppState};
use geopulse_common::Config;
use geopulse_store::{ClusterStore, ItemStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("geopulse=info".parse()?))
        .init();

    let config = Config::api_from_env();
    let pool = geopulse_store::connect(&config.database_url).await?;

    let state = Arc::new(AppState {
        items: ItemStore::new(pool.clone()),
        clusters: ClusterStore::new(pool),
    });

    let listener =
        tokio::net::TcpListener::bind((config.api_host.as_str(), config.api_port)).await?;
    info!(host = %config.api_host, port = config.api_port, "Read API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
