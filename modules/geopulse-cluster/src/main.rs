use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geopulse_cluster::{ClusteringEngine, Matcher};
use geopulse_common::{Config, LexiconRecognizer};
use geopulse_store::{ClusterStore, ItemStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("geopulse=info".parse()?))
        .init();

    let config = Config::cluster_from_env();

    let ner = LexiconRecognizer::from_config(config.ner_lexicon_path.as_deref())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let pool = geopulse_store::connect(&config.database_url).await?;

    let mut engine = ClusteringEngine::new(
        ItemStore::new(pool.clone()),
        ClusterStore::new(pool),
        Box::new(ner),
        Matcher::default(),
        config.cluster_cleanup_days,
    );

    // The loop refreshes its index on its own timer; SIGHUP asks for a
    // rebuild right now (e.g. after an operator wipes or backfills data).
    let (force_refresh_tx, force_refresh_rx) = mpsc::channel(1);
    spawn_force_refresh_listener(force_refresh_tx);

    engine
        .run(Duration::from_secs(config.cluster_poll_secs), force_refresh_rx)
        .await
}

#[cfg(unix)]
fn spawn_force_refresh_listener(tx: mpsc::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "SIGHUP handler unavailable; force refresh disabled");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, requesting index refresh");
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_force_refresh_listener(_tx: mpsc::Sender<()>) {
    warn!("Force refresh via SIGHUP is unix-only; timer refresh still runs");
}
