//! AIS vessel snapshots over the aisstream.io websocket. The stream never
//! ends on its own, so the collector watches for saturation: once no new
//! MMSI has appeared for a stable window it stops, bounded by a hard
//! timeout either way.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use geopulse_common::{IngestionRecord, SourceKind};

use crate::{config_f64, config_str, config_str_list, config_u64, now_epoch, Connector, ConnectorConfig};

const WS_URL: &str = "wss://stream.aisstream.io/v0/stream";

#[derive(Debug, Default, Clone)]
struct Vessel {
    mmsi: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    name: Option<String>,
    callsign: Option<String>,
    ship_type: Option<serde_json::Value>,
    destination: Option<String>,
    sog: Option<f64>,
    cog: Option<f64>,
    last_message_type: String,
}

pub struct AisConnector {
    api_key: String,
    bbox: [[f64; 2]; 2],
    mmsi_filter: Vec<String>,
    min_duration: Duration,
    stable_window: Duration,
    hard_timeout: Duration,
}

impl AisConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            api_key: config_str(config, "api_key", &std::env::var("AIS_API_KEY").unwrap_or_default()),
            bbox: [
                [
                    config_f64(config, "min_lat", -90.0),
                    config_f64(config, "min_lon", -180.0),
                ],
                [
                    config_f64(config, "max_lat", 90.0),
                    config_f64(config, "max_lon", 180.0),
                ],
            ],
            mmsi_filter: config_str_list(config, "mmsi"),
            min_duration: Duration::from_secs(config_u64(config, "min_duration_s", 5)),
            stable_window: Duration::from_secs(config_u64(config, "stable_window_s", 4)),
            hard_timeout: Duration::from_secs(config_u64(config, "hard_timeout_s", 30)),
        }
    }

    fn merge_message(vessels: &mut HashMap<i64, Vessel>, msg: &serde_json::Value) -> bool {
        let mtype = msg
            .get("MessageType")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown");
        let body = msg
            .get("Message")
            .and_then(|m| m.get(mtype))
            .cloned()
            .unwrap_or_default();
        let Some(mmsi) = body.get("UserID").and_then(|v| v.as_i64()) else {
            return false;
        };

        let is_new = !vessels.contains_key(&mmsi);
        let vessel = vessels.entry(mmsi).or_insert_with(|| Vessel { mmsi, ..Vessel::default() });
        vessel.last_message_type = mtype.to_string();

        if let Some(meta) = msg.get("Metadata") {
            if let (Some(lat), Some(lon)) = (
                meta.get("Latitude").and_then(|v| v.as_f64()),
                meta.get("Longitude").and_then(|v| v.as_f64()),
            ) {
                vessel.lat = Some(lat);
                vessel.lon = Some(lon);
            }
        }

        if let Some(sog) = body.get("Sog").and_then(|v| v.as_f64()) {
            vessel.sog = Some(sog);
        }
        if let Some(cog) = body.get("Cog").and_then(|v| v.as_f64()) {
            vessel.cog = Some(cog);
        }
        for (key, slot) in [
            ("Name", &mut vessel.name),
            ("CallSign", &mut vessel.callsign),
            ("Destination", &mut vessel.destination),
        ] {
            if let Some(v) = body.get(key).and_then(|v| v.as_str()) {
                let v = v.trim();
                if !v.is_empty() {
                    *slot = Some(v.to_string());
                }
            }
        }
        if let Some(st) = body.get("ShipType") {
            vessel.ship_type = Some(st.clone());
        }

        is_new
    }

    fn vessel_to_record(&self, vessel: &Vessel) -> Option<IngestionRecord> {
        let lat = vessel.lat?;
        let lon = vessel.lon?;
        let now = now_epoch();

        let mut record =
            IngestionRecord::new(SourceKind::Ais, format!("{}:{now}", vessel.mmsi), now);
        record.title = Some(match &vessel.name {
            Some(name) => format!("Vessel {name} ({})", vessel.mmsi),
            None => format!("Vessel {}", vessel.mmsi),
        });
        record.lat = Some(lat);
        record.lon = Some(lon);
        record.published_at = Some(chrono::DateTime::from_timestamp(now, 0)?.to_rfc3339());
        record.entities = Some(
            [
                ("mmsi", Some(json!(vessel.mmsi))),
                ("callsign", vessel.callsign.clone().map(Into::into)),
                ("ship_type", vessel.ship_type.clone()),
                ("destination", vessel.destination.clone().map(Into::into)),
                ("sog", vessel.sog.map(Into::into)),
                ("cog", vessel.cog.map(Into::into)),
                (
                    "last_message_type",
                    Some(vessel.last_message_type.clone().into()),
                ),
            ]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect(),
        );
        Some(record)
    }

    async fn snapshot(&self) -> Result<HashMap<i64, Vessel>> {
        let (ws, _) = tokio_tungstenite::connect_async(WS_URL)
            .await
            .context("aisstream connect failed")?;
        let (mut tx, mut rx) = ws.split();

        let mut sub = json!({
            "APIKey": self.api_key,
            "BoundingBoxes": [[ [self.bbox[0][0], self.bbox[0][1]], [self.bbox[1][0], self.bbox[1][1]] ]],
        });
        if !self.mmsi_filter.is_empty() {
            sub["FiltersShipMMSI"] = json!(self.mmsi_filter);
        }
        tx.send(Message::Text(sub.to_string().into()))
            .await
            .context("aisstream subscribe failed")?;

        let started = Instant::now();
        let mut last_new_mmsi = Instant::now();
        let mut vessels: HashMap<i64, Vessel> = HashMap::new();

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.hard_timeout {
                break;
            }
            if elapsed >= self.min_duration && last_new_mmsi.elapsed() >= self.stable_window {
                break;
            }

            match tokio::time::timeout(Duration::from_millis(500), rx.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    if let Ok(msg) = serde_json::from_str::<serde_json::Value>(&text) {
                        if Self::merge_message(&mut vessels, &msg) {
                            last_new_mmsi = Instant::now();
                        }
                    }
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "aisstream read error");
                    break;
                }
                Err(_) => {} // recv timeout; loop re-checks the deadlines
            }
        }

        Ok(vessels)
    }
}

#[async_trait]
impl Connector for AisConnector {
    fn name(&self) -> &'static str {
        "ais"
    }

    async fn fetch(&self) -> Result<Vec<IngestionRecord>> {
        if self.api_key.is_empty() {
            warn!("AIS_API_KEY not set; skipping AIS cycle");
            return Ok(Vec::new());
        }

        let vessels = self.snapshot().await?;
        let records: Vec<IngestionRecord> = vessels
            .values()
            .filter_map(|v| self.vessel_to_record(v))
            .collect();

        info!(vessels = records.len(), "AIS snapshot complete");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_tracks_new_mmsi() {
        let mut vessels = HashMap::new();
        let msg = json!({
            "MessageType": "PositionReport",
            "Message": { "PositionReport": { "UserID": 123456789, "Sog": 11.5 } },
            "Metadata": { "Latitude": 59.4, "Longitude": 24.7 }
        });

        assert!(AisConnector::merge_message(&mut vessels, &msg), "first sighting is new");
        assert!(!AisConnector::merge_message(&mut vessels, &msg), "second sighting is not");

        let v = &vessels[&123456789];
        assert_eq!(v.lat, Some(59.4));
        assert_eq!(v.sog, Some(11.5));
    }

    #[test]
    fn merge_ignores_bodyless_messages() {
        let mut vessels = HashMap::new();
        let msg = json!({ "MessageType": "Unknown", "Message": {} });
        assert!(!AisConnector::merge_message(&mut vessels, &msg));
        assert!(vessels.is_empty());
    }
}
