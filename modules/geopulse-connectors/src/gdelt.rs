//! GDELT DOC 2.0 — the global news radar. One ArtList query per cycle;
//! articles are keyed by URL and carry domain/language/country in
//! `entities`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::info;

use geopulse_common::{IngestionRecord, SourceKind};

use crate::{config_str, config_u64, http, now_epoch, Connector, ConnectorConfig};

const DOC_ENDPOINT: &str = "https://api.gdeltproject.org/api/v2/doc/doc";
const DEFAULT_QUERY: &str =
    "(protest OR riot OR earthquake OR flood OR cyclone OR breaking news OR news OR battle)";

#[derive(Debug, Deserialize)]
struct ArtList {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    seendate: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default, rename = "sourceCountry")]
    source_country: Option<String>,
    #[serde(default)]
    socialimage: Option<String>,
}

pub struct GdeltConnector {
    query: String,
    max_records: u64,
    client: reqwest::Client,
}

impl GdeltConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            query: config_str(config, "query", DEFAULT_QUERY),
            max_records: config_u64(config, "max_records", 50),
            client: http::client(5, 20),
        }
    }
}

#[async_trait]
impl Connector for GdeltConnector {
    fn name(&self) -> &'static str {
        "gdelt"
    }

    async fn fetch(&self) -> Result<Vec<IngestionRecord>> {
        let max_records = self.max_records.to_string();
        let resp = self
            .client
            .get(DOC_ENDPOINT)
            .query(&[
                ("query", self.query.as_str()),
                ("mode", "ArtList"),
                ("format", "json"),
                ("maxrecords", max_records.as_str()),
                ("sort", "datedesc"),
            ])
            .send()
            .await
            .context("GDELT request failed")?
            .error_for_status()?;

        let body = resp.text().await?;
        if body.trim().is_empty() {
            anyhow::bail!("empty response from GDELT");
        }
        let list: ArtList = serde_json::from_str(&body).context("GDELT response parse failed")?;

        let mut records = Vec::with_capacity(list.articles.len());
        for article in list.articles {
            if article.url.is_empty() {
                continue;
            }
            let raw = Some(serde_json::json!({
                "url": article.url.clone(),
                "title": article.title.clone(),
                "seendate": article.seendate.clone(),
                "domain": article.domain.clone(),
                "language": article.language.clone(),
                "sourceCountry": article.source_country.clone(),
            }));

            let mut record =
                IngestionRecord::new(SourceKind::Gdelt, article.url.clone(), now_epoch());
            record.title = article.title;
            record.url = Some(article.url);
            record.published_at = article.seendate.as_deref().and_then(seendate_to_iso);
            record.media_urls = article.socialimage.filter(|s| !s.is_empty()).map(|s| vec![s]);
            record.entities = Some(
                [
                    ("domain", article.domain),
                    ("language", article.language),
                    ("source_country", article.source_country),
                ]
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k.to_string(), serde_json::Value::String(v))))
                .collect(),
            );
            record.raw = raw;
            records.push(record);
        }

        info!(articles = records.len(), "Fetched GDELT articles");
        Ok(records)
    }
}

/// GDELT timestamps come compact ("20260117T143000Z"); normalize at the
/// edge so the pipeline sees ordinary ISO-8601.
fn seendate_to_iso(seendate: &str) -> Option<String> {
    let naive = NaiveDateTime::parse_from_str(seendate, "%Y%m%dT%H%M%SZ").ok()?;
    Some(format!("{}Z", naive.format("%Y-%m-%dT%H:%M:%S")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seendate_normalizes() {
        assert_eq!(
            seendate_to_iso("20260117T143000Z").as_deref(),
            Some("2026-01-17T14:30:00Z")
        );
        assert!(seendate_to_iso("not a date").is_none());
    }
}
