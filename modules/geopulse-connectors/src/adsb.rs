//! ADS-B aircraft positions from adsb.lol. The service has moved its
//! route shape more than once, so the connector probes a list of endpoint
//! templates once, caches the winner on the instance, and re-probes a
//! single time if the cached one stops answering.

use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use geopulse_common::{IngestionRecord, SourceKind};

use crate::{config_f64, http, now_epoch, Connector, ConnectorConfig};

const ENDPOINT_TEMPLATES: &[&str] = &[
    "https://api.adsb.lol/v2/lat/{lat}/lon/{lon}/dist/{dist}",
    "https://api.adsb.lol/v2/lat/{lat}/lon/{lon}/dist/{dist}/",
    "https://api.adsb.lol/api/aircraft/lat/{lat}/lon/{lon}/dist/{dist}",
];

pub struct AdsbConnector {
    center_lat: f64,
    center_lon: f64,
    radius_nm: f64,
    client: reqwest::Client,
    working_template: Mutex<Option<&'static str>>,
}

impl AdsbConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            center_lat: config_f64(config, "center_lat", 46.05),
            center_lon: config_f64(config, "center_lon", 14.51),
            radius_nm: config_f64(config, "radius_nm", 250.0),
            client: http::client(5, 10),
            working_template: Mutex::new(None),
        }
    }

    fn render(template: &str, lat: f64, lon: f64, dist: f64) -> String {
        template
            .replace("{lat}", &format!("{lat:.6}"))
            .replace("{lon}", &format!("{lon:.6}"))
            .replace("{dist}", &format!("{dist:.0}"))
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        Ok(self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn probe_endpoint(&self) -> Result<&'static str> {
        let probe_dist = self.radius_nm.clamp(1.0, 10.0);
        for template in ENDPOINT_TEMPLATES {
            let url = Self::render(template, self.center_lat, self.center_lon, probe_dist);
            match self.get_json(&url).await {
                Ok(data)
                    if data.get("ac").is_some()
                        || data.get("aircraft").is_some()
                        || data.get("states").is_some() =>
                {
                    return Ok(template);
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(url, error = %e, "adsb.lol probe failed");
                    continue;
                }
            }
        }
        anyhow::bail!("no working adsb.lol endpoint (all probes failed)")
    }

    async fn working_endpoint(&self) -> Result<&'static str> {
        if let Some(template) = *self.working_template.lock().expect("adsb memo poisoned") {
            return Ok(template);
        }
        let template = self.probe_endpoint().await?;
        *self.working_template.lock().expect("adsb memo poisoned") = Some(template);
        Ok(template)
    }

    fn aircraft_to_record(&self, aircraft: &serde_json::Value) -> Option<IngestionRecord> {
        let icao = aircraft
            .get("icao")
            .or_else(|| aircraft.get("hex"))
            .or_else(|| aircraft.get("icao24"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())?;

        let lat = aircraft.get("lat").and_then(|v| v.as_f64())?;
        let lon = aircraft.get("lon").and_then(|v| v.as_f64())?;

        let callsign = aircraft
            .get("flight")
            .or_else(|| aircraft.get("call"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let now = now_epoch();
        let mut record =
            IngestionRecord::new(SourceKind::Adsb, format!("{icao}:{now}"), now);
        record.title = Some(match &callsign {
            Some(cs) => format!("Aircraft {cs} ({icao})"),
            None => format!("Aircraft {icao}"),
        });
        record.lat = Some(lat);
        record.lon = Some(lon);
        record.published_at =
            Some(chrono::DateTime::from_timestamp(now, 0)?.to_rfc3339());
        record.entities = Some(
            [
                ("icao", Some(serde_json::Value::String(icao))),
                ("callsign", callsign.map(serde_json::Value::String)),
                ("alt_baro_ft", aircraft.get("alt_baro").cloned()),
                ("speed_knots", aircraft.get("gs").cloned()),
                ("heading_deg", aircraft.get("track").cloned()),
                ("squawk", aircraft.get("squawk").cloned()),
                ("category", aircraft.get("category").cloned()),
            ]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect(),
        );
        record.raw = Some(aircraft.clone());
        Some(record)
    }
}

#[async_trait]
impl Connector for AdsbConnector {
    fn name(&self) -> &'static str {
        "adsb"
    }

    async fn fetch(&self) -> Result<Vec<IngestionRecord>> {
        let template = self.working_endpoint().await?;
        let url = Self::render(template, self.center_lat, self.center_lon, self.radius_nm);

        let payload = match self.get_json(&url).await {
            Ok(payload) => payload,
            Err(_) => {
                // Cached endpoint may have rotted; drop it and re-probe once.
                *self.working_template.lock().expect("adsb memo poisoned") = None;
                let template = self.working_endpoint().await?;
                let url = Self::render(template, self.center_lat, self.center_lon, self.radius_nm);
                self.get_json(&url).await.context("adsb.lol re-probe failed")?
            }
        };

        let aircraft = payload
            .get("ac")
            .or_else(|| payload.get("aircraft"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let records: Vec<IngestionRecord> = aircraft
            .iter()
            .filter_map(|a| self.aircraft_to_record(a))
            .collect();

        info!(aircraft = records.len(), "Fetched ADS-B positions");
        Ok(records)
    }
}
