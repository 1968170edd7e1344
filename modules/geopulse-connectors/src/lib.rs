//! Source connectors. Each connector fetches one upstream and converts
//! its payloads into `IngestionRecord`s at the edge; unknown upstream
//! fields ride along opaquely in `raw`. Connectors hold no process-global
//! state and are safe to run concurrently — per-connector caches (seen
//! URLs, probed endpoints) live on the instance.

pub mod adsb;
pub mod ais;
pub mod gdacs;
pub mod gdelt;
pub mod mastodon;
pub mod rss;
pub mod telegram;
pub mod usgs;

mod http;

use anyhow::Result;
use async_trait::async_trait;

use geopulse_common::IngestionRecord;

/// The one contract the supervisor consumes: a stable name and a fetch
/// that yields whatever the source produced this cycle.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<IngestionRecord>>;
}

/// Connector config is a free-form JSON object, the same shape the
/// supervisor persists in its schedules.
pub type ConnectorConfig = serde_json::Map<String, serde_json::Value>;

/// Instantiate a connector by schedule name. Unknown names are a config
/// error the supervisor logs and skips.
pub fn build(name: &str, config: &ConnectorConfig) -> Option<Box<dyn Connector>> {
    match name {
        "rss" => Some(Box::new(rss::RssConnector::new(config))),
        "gdelt" => Some(Box::new(gdelt::GdeltConnector::new(config))),
        "usgs" => Some(Box::new(usgs::UsgsConnector::new(config))),
        "gdacs" => Some(Box::new(gdacs::GdacsConnector::new(config))),
        "mastodon" => Some(Box::new(mastodon::MastodonConnector::new(config))),
        "telegram" => Some(Box::new(telegram::TelegramConnector::new(config))),
        "adsb" => Some(Box::new(adsb::AdsbConnector::new(config))),
        "ais" => Some(Box::new(ais::AisConnector::new(config))),
        _ => None,
    }
}

pub(crate) fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn config_str(config: &ConnectorConfig, key: &str, default: &str) -> String {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

pub(crate) fn config_u64(config: &ConnectorConfig, key: &str, default: u64) -> u64 {
    config.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

pub(crate) fn config_f64(config: &ConnectorConfig, key: &str, default: f64) -> f64 {
    config.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

pub(crate) fn config_str_list(config: &ConnectorConfig, key: &str) -> Vec<String> {
    config
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}
