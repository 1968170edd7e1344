//! Supervisor persistence: one small JSON file carrying the schedules and
//! each connector's opaque cursor state. Last writer wins. Losing the
//! file is not an emergency — defaults cover a fresh start — so loading
//! failures warn and saving failures log.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::schedule::{default_schedules, ConnectorSchedule};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SupervisorState {
    #[serde(default)]
    pub schedules: HashMap<String, ConnectorSchedule>,
    #[serde(default)]
    pub connector_states: serde_json::Map<String, serde_json::Value>,
}

impl SupervisorState {
    /// Load from disk, overlaying defaults. Missing or corrupt files fall
    /// back to defaults.
    pub fn load(path: &Path) -> Self {
        let mut schedules = default_schedules();

        let from_disk: Option<SupervisorState> = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not parse supervisor state");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load supervisor state");
                None
            }
        };

        let mut connector_states = serde_json::Map::new();
        if let Some(state) = from_disk {
            for (name, stored) in state.schedules {
                match schedules.get_mut(&name) {
                    Some(schedule) => {
                        schedule.interval_seconds = stored.interval_seconds;
                        schedule.enabled = stored.enabled;
                        for (k, v) in stored.config {
                            schedule.config.insert(k, v);
                        }
                    }
                    None => {
                        schedules.insert(name, stored);
                    }
                }
            }
            connector_states = state.connector_states;
            info!(path = %path.display(), "Loaded supervisor state");
        }

        Self { schedules, connector_states }
    }

    pub fn save(&self, path: &Path) {
        let data = match serde_json::to_string_pretty(self) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "Could not serialize supervisor state");
                return;
            }
        };
        if let Err(e) = std::fs::write(path, data) {
            error!(path = %path.display(), error = %e, "Could not save supervisor state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let state = SupervisorState::load(Path::new("/nonexistent/supervisor_state.json"));
        assert!(state.schedules.contains_key("rss"));
        assert!(state.connector_states.is_empty());
    }

    #[test]
    fn disk_state_overlays_defaults() {
        let dir = std::env::temp_dir().join("geopulse-supervisor-state-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        std::fs::write(
            &path,
            r#"{
                "schedules": { "rss": { "interval_seconds": 900, "enabled": false, "config": {} } },
                "connector_states": { "rss": { "cursor": "abc" } }
            }"#,
        )
        .unwrap();

        let state = SupervisorState::load(&path);
        assert_eq!(state.schedules["rss"].interval_seconds, 900);
        assert!(!state.schedules["rss"].enabled);
        assert_eq!(state.schedules["gdelt"].interval_seconds, 300, "untouched defaults stay");
        assert_eq!(
            state.connector_states["rss"]["cursor"],
            serde_json::json!("abc")
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join("geopulse-supervisor-roundtrip-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let mut state = SupervisorState::load(Path::new("/nonexistent"));
        state.schedules.get_mut("gdacs").unwrap().interval_seconds = 1200;
        state.save(&path);

        let reloaded = SupervisorState::load(&path);
        assert_eq!(reloaded.schedules["gdacs"].interval_seconds, 1200);

        std::fs::remove_file(&path).ok();
    }
}
