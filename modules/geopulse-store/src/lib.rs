pub mod cluster_store;
pub mod error;
pub mod item_store;
mod rows;

pub use cluster_store::{ClusterStore, NewCluster};
pub use error::{Result, StoreError};
pub use item_store::{ItemStore, NewItem, StoreCounts, UpsertOutcome};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to Postgres and run the embedded migrations.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
