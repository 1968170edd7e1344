use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geopulse_common::{Config, LexiconRecognizer};
use geopulse_ingest::{GazetteerClient, IngestPipeline};
use geopulse_intake::IntakeClient;
use geopulse_store::ItemStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("geopulse=info".parse()?))
        .init();

    let config = Config::ingest_from_env();

    // A bad NER lexicon or an unreachable database is fatal at startup;
    // everything after this point degrades gracefully instead.
    let ner = LexiconRecognizer::from_config(config.ner_lexicon_path.as_deref())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let pool = geopulse_store::connect(&config.database_url).await?;

    let resolver = GazetteerClient::new(
        &config.location_service_url,
        Some(config.gazetteer_cache_path.as_str()),
    );

    let mut pipeline = IngestPipeline::new(
        IntakeClient::new(&config.memory_store_url),
        ItemStore::new(pool),
        Box::new(ner),
        Box::new(resolver),
        config.location_stopwords.clone(),
        config.ingest_batch_size,
    );

    info!(batch_size = config.ingest_batch_size, "Ingestion service starting");
    pipeline.run(Duration::from_secs(config.ingest_poll_secs)).await;
    Ok(())
}
