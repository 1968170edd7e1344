use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use geopulse_common::Config;
use geopulse_intake::{server, IntakeQueue};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("geopulse=info".parse()?))
        .init();

    let config = Config::intake_from_env();
    let queue = Arc::new(IntakeQueue::new());
    server::serve(queue, &config.intake_bind_address, config.intake_port).await
}
