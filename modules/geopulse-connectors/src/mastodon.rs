//! Mastodon public timelines — open microblog chatter and hashtag bursts.
//! Fan-out across instances is bounded; each instance gets its own short
//! timeout so one dead server cannot stall the cycle. Reblogs are skipped
//! (the original post will surface on its own instance).

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use geopulse_common::{IngestionRecord, SourceKind};

use crate::rss::strip_tags;
use crate::{config_str_list, config_u64, http, now_epoch, Connector, ConnectorConfig};

const DEFAULT_INSTANCES: &[&str] = &[
    "https://mastodon.social",
    "https://fosstodon.org",
    "https://mastodon.world",
    "https://hachyderm.io",
    "https://mstdn.social",
    "https://infosec.exchange",
    "https://newsie.social",
    "https://mastodon.online",
];

const MAX_CONCURRENT_INSTANCES: usize = 10;

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    reblog: Option<serde_json::Value>,
    #[serde(default)]
    account: Option<Account>,
    #[serde(default)]
    media_attachments: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(default)]
    acct: String,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(default)]
    url: Option<String>,
}

pub struct MastodonConnector {
    instances: Vec<String>,
    hashtags: Vec<String>,
    client: reqwest::Client,
}

impl MastodonConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        let mut instances = config_str_list(config, "instances");
        if instances.is_empty() {
            instances = DEFAULT_INSTANCES.iter().map(|s| s.to_string()).collect();
        }
        let timeout = config_u64(config, "timeout", 10);
        Self {
            instances,
            hashtags: config_str_list(config, "hashtags"),
            client: http::client(5, timeout),
        }
    }

    async fn fetch_timeline(&self, instance: &str, path: &str) -> Vec<Status> {
        let url = format!("{instance}{path}");
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<Vec<Status>>().await.unwrap_or_default()
            }
            Ok(resp) => {
                warn!(instance, status = %resp.status(), "Mastodon timeline refused");
                Vec::new()
            }
            Err(e) => {
                warn!(instance, error = %e, "Mastodon timeline failed");
                Vec::new()
            }
        }
    }

    async fn fetch_instance(&self, instance: &str) -> Vec<IngestionRecord> {
        let mut statuses = self
            .fetch_timeline(instance, "/api/v1/timelines/public?local=true&limit=40")
            .await;
        for tag in &self.hashtags {
            statuses.extend(
                self.fetch_timeline(instance, &format!("/api/v1/timelines/tag/{tag}?limit=40"))
                    .await,
            );
        }

        let host = instance.trim_start_matches("https://").trim_start_matches("http://");
        statuses
            .into_iter()
            .filter(|s| s.reblog.is_none())
            .map(|s| self.status_to_record(host, s))
            .collect()
    }

    fn status_to_record(&self, host: &str, status: Status) -> IngestionRecord {
        let text = strip_tags(&status.content);
        let mut record =
            IngestionRecord::new(SourceKind::Mastodon, format!("{host}:{}", status.id), now_epoch());
        record.title = Some(text.chars().take(100).collect());
        record.text = Some(text);
        record.url = status.url;
        record.author = status.account.map(|a| a.acct);
        record.published_at = status.created_at;
        let media: Vec<String> = status.media_attachments.into_iter().filter_map(|m| m.url).collect();
        record.media_urls = (!media.is_empty()).then_some(media);
        record.entities = status.language.map(|lang| {
            [("language".to_string(), serde_json::Value::String(lang))]
                .into_iter()
                .collect()
        });
        record
    }
}

#[async_trait]
impl Connector for MastodonConnector {
    fn name(&self) -> &'static str {
        "mastodon"
    }

    async fn fetch(&self) -> Result<Vec<IngestionRecord>> {
        let mut futs = Vec::new();
        for instance in self.instances.iter() {
            futs.push(self.fetch_instance(instance));
        }
        let records: Vec<IngestionRecord> = stream::iter(futs)
            .buffer_unordered(MAX_CONCURRENT_INSTANCES)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        info!(
            posts = records.len(),
            instances = self.instances.len(),
            "Fetched Mastodon statuses"
        );
        Ok(records)
    }
}
