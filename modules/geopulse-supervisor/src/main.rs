use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geopulse_common::Config;
use geopulse_intake::IntakeClient;
use geopulse_supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("geopulse=info".parse()?))
        .init();

    let config = Config::supervisor_from_env();
    let intake = IntakeClient::new(&config.memory_store_url);
    let mut supervisor = Supervisor::new(intake, &config.supervisor_state_path);

    let cancel = supervisor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    supervisor.run().await
}
