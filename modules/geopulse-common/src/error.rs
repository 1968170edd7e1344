use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoPulseError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Duplicate item {source_name}:{source_id}")]
    Duplicate { source_name: String, source_id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Stale cluster reference: {0}")]
    StaleCluster(uuid::Uuid),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
