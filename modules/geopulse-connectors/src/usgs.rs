//! USGS real-time earthquake feed — the authoritative, map-native event
//! stream. Every feature already carries coordinates, so these records
//! skip location enrichment entirely.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use geopulse_common::{epoch_secs_to_utc, IngestionRecord, SourceKind};

use crate::{config_str, http, now_epoch, Connector, ConnectorConfig};

fn feed_url(name: &str) -> &'static str {
    match name {
        "all_hour" => "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_hour.geojson",
        "all_day" => "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson",
        "significant_day" => {
            "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/significant_day.geojson"
        }
        _ => "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/significant_hour.geojson",
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    properties: serde_json::Value,
    #[serde(default)]
    geometry: serde_json::Value,
}

pub struct UsgsConnector {
    feed_name: String,
    client: reqwest::Client,
}

impl UsgsConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            feed_name: config_str(config, "feed", "significant_hour"),
            client: http::client(5, 30),
        }
    }

    fn feature_to_record(&self, feature: &Feature) -> Option<IngestionRecord> {
        let props = &feature.properties;
        let event_id = props
            .get("code")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| feature.id.clone())?;

        let magnitude = props.get("mag").and_then(|v| v.as_f64());
        let place = props.get("place").and_then(|v| v.as_str()).unwrap_or("");

        let mut record = IngestionRecord::new(SourceKind::Usgs, event_id, now_epoch());
        record.title = Some(match magnitude {
            Some(mag) => format!("M{mag:.1} - {place}"),
            None => place.to_string(),
        });
        record.url = props.get("url").and_then(|v| v.as_str()).map(str::to_string);

        // USGS time is epoch milliseconds
        record.published_at = props
            .get("time")
            .and_then(|v| v.as_i64())
            .and_then(|ms| epoch_secs_to_utc(ms / 1000))
            .map(|dt| dt.to_rfc3339());

        let coords = feature.geometry.get("coordinates").and_then(|v| v.as_array());
        if let Some(coords) = coords {
            if let (Some(lon), Some(lat)) =
                (coords.first().and_then(|v| v.as_f64()), coords.get(1).and_then(|v| v.as_f64()))
            {
                record.lat = Some(lat);
                record.lon = Some(lon);
                record.location_name = (!place.is_empty()).then(|| place.to_string());
            }
        }

        record.entities = Some(
            [
                ("magnitude", props.get("mag").cloned()),
                ("depth_km", coords.and_then(|c| c.get(2)).cloned()),
                ("tsunami", props.get("tsunami").cloned()),
                ("significance", props.get("sig").cloned()),
                (
                    "usgs_feed",
                    Some(serde_json::Value::String(self.feed_name.clone())),
                ),
            ]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect(),
        );
        record.raw = serde_json::to_value(&feature.properties).ok();
        Some(record)
    }
}

#[async_trait]
impl Connector for UsgsConnector {
    fn name(&self) -> &'static str {
        "usgs"
    }

    async fn fetch(&self) -> Result<Vec<IngestionRecord>> {
        let collection: FeatureCollection = self
            .client
            .get(feed_url(&self.feed_name))
            .send()
            .await
            .context("USGS request failed")?
            .error_for_status()?
            .json()
            .await
            .context("USGS response parse failed")?;

        let records: Vec<IngestionRecord> = collection
            .features
            .iter()
            .filter_map(|f| self.feature_to_record(f))
            .collect();

        info!(earthquakes = records.len(), feed = %self.feed_name, "Fetched USGS events");
        Ok(records)
    }
}
