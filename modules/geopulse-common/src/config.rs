use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres (item + cluster stores)
    pub database_url: String,

    // Intake queue (the "memory store")
    pub memory_store_url: String,
    pub intake_bind_address: String,
    pub intake_port: u16,

    // Gazetteer service
    pub location_service_url: String,
    pub gazetteer_cache_path: String,

    // NER
    pub ner_lexicon_path: Option<String>,
    pub location_stopwords: Vec<String>,

    // Ingestion
    pub ingest_batch_size: usize,
    pub ingest_poll_secs: u64,

    // Clustering
    pub cluster_poll_secs: u64,
    pub cluster_cleanup_days: i64,

    // Supervisor
    pub supervisor_state_path: String,

    // Read API
    pub api_host: String,
    pub api_port: u16,

    // AIS
    pub ais_api_key: String,
}

impl Config {
    /// Load config for the intake queue service.
    pub fn intake_from_env() -> Self {
        Self {
            intake_bind_address: env::var("INTAKE_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            intake_port: env_parsed("INTAKE_PORT", 6379),
            ..Self::empty()
        }
    }

    /// Load config for the supervisor (intake URL + state file + AIS key).
    pub fn supervisor_from_env() -> Self {
        Self {
            memory_store_url: memory_store_url(),
            supervisor_state_path: env::var("SUPERVISOR_STATE_PATH")
                .unwrap_or_else(|_| "supervisor_state.json".to_string()),
            ais_api_key: env::var("AIS_API_KEY").unwrap_or_default(),
            ..Self::empty()
        }
    }

    /// Load config for the ingestion pipeline (DB + intake + gazetteer + NER).
    pub fn ingest_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            memory_store_url: memory_store_url(),
            location_service_url: env::var("LOCATION_SERVICE_URL")
                .unwrap_or_else(|_| "http://location:8787".to_string()),
            gazetteer_cache_path: env::var("GAZETTEER_CACHE_PATH")
                .unwrap_or_else(|_| "/tmp/geopulse-gazetteer-cache".to_string()),
            ner_lexicon_path: env::var("NER_LEXICON_PATH").ok(),
            location_stopwords: env::var("LOC_STOPWORDS")
                .unwrap_or_else(|_| "man,it,der".to_string())
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            ingest_batch_size: env_parsed::<usize>("INGEST_BATCH_SIZE", 50).clamp(1, 250),
            ingest_poll_secs: env_parsed("INGEST_POLL_SECS", 5),
            ..Self::empty()
        }
    }

    /// Load config for the clustering engine (DB + NER).
    pub fn cluster_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            ner_lexicon_path: env::var("NER_LEXICON_PATH").ok(),
            cluster_poll_secs: env_parsed("CLUSTER_POLL_SECS", 5),
            cluster_cleanup_days: env_parsed("CLUSTER_CLEANUP_DAYS", 7),
            ..Self::empty()
        }
    }

    /// Load config for the read-side API server.
    pub fn api_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env_parsed("API_PORT", 8080),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            database_url: String::new(),
            memory_store_url: String::new(),
            intake_bind_address: String::new(),
            intake_port: 0,
            location_service_url: String::new(),
            gazetteer_cache_path: String::new(),
            ner_lexicon_path: None,
            location_stopwords: Vec::new(),
            ingest_batch_size: 50,
            ingest_poll_secs: 5,
            cluster_poll_secs: 5,
            cluster_cleanup_days: 7,
            supervisor_state_path: String::new(),
            api_host: String::new(),
            api_port: 0,
            ais_api_key: String::new(),
        }
    }
}

fn memory_store_url() -> String {
    env::var("MEMORY_STORE_URL").unwrap_or_else(|_| "http://memory-store:6379".to_string())
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
