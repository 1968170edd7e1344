use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use geopulse_connectors::ConnectorConfig;

/// How one connector runs: cycle interval, on/off switch, and the
/// free-form config handed to the connector at spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSchedule {
    pub interval_seconds: u64,
    pub enabled: bool,
    #[serde(default)]
    pub config: ConnectorConfig,
}

impl ConnectorSchedule {
    fn new(interval_seconds: u64, config: serde_json::Value) -> Self {
        let config = match config {
            serde_json::Value::Object(map) => map,
            _ => ConnectorConfig::new(),
        };
        Self { interval_seconds, enabled: true, config }
    }

    fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Built-in schedules. A state file on disk overrides these field by
/// field; fast chatter sources run every minute, aggregators every five,
/// slow official feeds every ten.
pub fn default_schedules() -> HashMap<String, ConnectorSchedule> {
    let mut schedules = HashMap::new();

    schedules.insert(
        "gdelt".to_string(),
        ConnectorSchedule::new(
            300,
            json!({
                "query": "(protest OR riot OR earthquake OR flood OR cyclone OR breaking news OR news OR battle)",
                "max_records": 50,
            }),
        ),
    );
    schedules.insert(
        "telegram".to_string(),
        ConnectorSchedule::new(60, json!({ "channels": [] })),
    );
    schedules.insert(
        "mastodon".to_string(),
        ConnectorSchedule::new(
            300,
            json!({ "hashtags": ["news", "breaking", "earthquake", "protest"] }),
        ),
    );
    schedules.insert(
        "rss".to_string(),
        ConnectorSchedule::new(300, json!({ "max_workers": 8 })),
    );
    schedules.insert("usgs".to_string(), ConnectorSchedule::new(300, json!({ "feed": "significant_hour" })));
    schedules.insert("gdacs".to_string(), ConnectorSchedule::new(600, json!({})));

    // Telemetry sources need a deployment-specific bbox / API key; off
    // until the operator turns them on.
    schedules.insert("adsb".to_string(), ConnectorSchedule::new(120, json!({})).disabled());
    schedules.insert("ais".to_string(), ConnectorSchedule::new(300, json!({})).disabled());

    schedules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_connector() {
        let schedules = default_schedules();
        for name in ["gdelt", "telegram", "mastodon", "rss", "usgs", "gdacs", "adsb", "ais"] {
            assert!(schedules.contains_key(name), "missing schedule for {name}");
        }
    }

    #[test]
    fn telemetry_sources_start_disabled() {
        let schedules = default_schedules();
        assert!(!schedules["adsb"].enabled);
        assert!(!schedules["ais"].enabled);
        assert!(schedules["rss"].enabled);
    }

    #[test]
    fn schedule_round_trips_through_json() {
        let schedules = default_schedules();
        let encoded = serde_json::to_string(&schedules).unwrap();
        let decoded: HashMap<String, ConnectorSchedule> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.len(), schedules.len());
        assert_eq!(decoded["gdelt"].interval_seconds, 300);
    }
}
