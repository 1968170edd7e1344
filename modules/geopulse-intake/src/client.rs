//! Reqwest client for the intake queue, used by the supervisor (push
//! side) and the ingestion pipeline (drain side).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::warn;

use geopulse_common::IngestionRecord;

#[derive(Clone)]
pub struct IntakeClient {
    base_url: String,
    client: reqwest::Client,
}

impl IntakeClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build intake HTTP client");
        Self { base_url: base_url.trim_end_matches('/').to_string(), client }
    }

    /// Push a batch of records. Returns the queue size after the push.
    pub async fn push_records(&self, records: &[IngestionRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let body = json!({ "key": "raw_items", "value": records });
        let resp = self
            .client
            .post(format!("{}/post", self.base_url))
            .json(&body)
            .send()
            .await
            .context("intake push failed")?
            .error_for_status()
            .context("intake push rejected")?;

        let value: serde_json::Value = resp.json().await.context("intake push response")?;
        Ok(value.get("queue_size").and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }

    /// Drain the queue. Unparseable entries are logged and skipped — one
    /// bad record must not block the rest of the batch.
    pub async fn drain_raw_items(&self) -> Result<Vec<IngestionRecord>> {
        let value: serde_json::Value = self
            .get_key("raw_items")
            .await
            .context("intake drain failed")?;

        let items = value
            .get("raw_items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<IngestionRecord>(item) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Failed to parse record from intake queue"),
            }
        }
        Ok(records)
    }

    pub async fn tweet_sources(&self) -> Result<HashMap<String, bool>> {
        let value = self.get_key("tweet_sources").await?;
        Ok(serde_json::from_value(
            value.get("tweet_sources").cloned().unwrap_or_default(),
        )?)
    }

    pub async fn search_queries(&self) -> Result<Vec<String>> {
        let value = self.get_key("search_queries").await?;
        Ok(serde_json::from_value(
            value.get("search_queries").cloned().unwrap_or_default(),
        )?)
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        self.get_key("health").await
    }

    async fn get_key(&self, key: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(format!("{}/get/{key}", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}
