//! GDACS — official multi-hazard alerting (floods, cyclones, volcanoes).
//! The GeoJSON feed is the canonical one here; event type, alert level and
//! country travel in `entities`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use geopulse_common::{parse_iso_datetime, IngestionRecord, SourceKind};

use crate::{http, now_epoch, Connector, ConnectorConfig};

const GEOJSON_FEED: &str = "https://www.gdacs.org/contentdata/xml/gdacs.geojson";

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    properties: serde_json::Value,
    #[serde(default)]
    geometry: serde_json::Value,
}

pub struct GdacsConnector {
    client: reqwest::Client,
}

impl GdacsConnector {
    pub fn new(_config: &ConnectorConfig) -> Self {
        Self { client: http::client(5, 30) }
    }

    fn feature_to_record(&self, feature: &Feature) -> Option<IngestionRecord> {
        let props = &feature.properties;

        let event_id = props
            .get("eventid")
            .map(json_to_string)
            .or_else(|| feature.id.as_ref().map(json_to_string))
            .filter(|s| !s.is_empty())?;

        let mut record = IngestionRecord::new(SourceKind::Gdacs, event_id, now_epoch());
        record.title = props.get("title").and_then(|v| v.as_str()).map(str::to_string);
        record.text = props.get("description").and_then(|v| v.as_str()).map(str::to_string);
        record.url = props.get("link").and_then(|v| v.as_str()).map(str::to_string);

        // fromdate arrives in a couple of naive formats; both parse as UTC.
        record.published_at = props
            .get("fromdate")
            .and_then(|v| v.as_str())
            .and_then(parse_iso_datetime)
            .map(|dt| dt.to_rfc3339());

        if feature.geometry.get("type").and_then(|v| v.as_str()) == Some("Point") {
            if let Some(coords) = feature.geometry.get("coordinates").and_then(|v| v.as_array()) {
                if let (Some(lon), Some(lat)) = (
                    coords.first().and_then(|v| v.as_f64()),
                    coords.get(1).and_then(|v| v.as_f64()),
                ) {
                    record.lat = Some(lat);
                    record.lon = Some(lon);
                    record.location_name =
                        props.get("country").and_then(|v| v.as_str()).map(str::to_string);
                }
            }
        }

        record.entities = Some(
            [
                ("event_type", props.get("eventtype").cloned()),
                ("alert_level", props.get("alertlevel").cloned()),
                ("country", props.get("country").cloned()),
                ("severity", props.get("severity").cloned()),
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
impl Connector for GdacsConnector {
    fn name(&self) -> &'static str {
        "gdacs"
    }

    async fn fetch(&self) -> Result<Vec<IngestionRecord>> {
        let collection: FeatureCollection = self
            .client
            .get(GEOJSON_FEED)
            .send()
            .await
            .context("GDACS request failed")?
            .error_for_status()?
            .json()
            .await
            .context("GDACS response parse failed")?;

        let records: Vec<IngestionRecord> = collection
            .features
            .iter()
            .filter_map(|f| self.feature_to_record(f))
            .collect();

        info!(events = records.len(), "Fetched GDACS events");
        Ok(records)
    }
}

fn json_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
