//! Telegram public channels, scraped through the keyless web previews at
//! `https://t.me/s/<channel>`. Message blocks are pulled out of the HTML
//! with regexes; this stays deliberately shallow — the preview page is
//! the whole contract.

use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::{info, warn};

use geopulse_common::{IngestionRecord, SourceKind};

use crate::rss::strip_tags;
use crate::{config_str_list, http, now_epoch, Connector, ConnectorConfig};

const TG_PUBLIC_BASE: &str = "https://t.me/s";
const MAX_CONCURRENT_CHANNELS: usize = 8;

static RE_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-post="([^/"]+)/(\d+)""#).expect("telegram post regex")
});
static RE_TEXT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div class="tgme_widget_message_text[^"]*"[^>]*>(.*?)</div>"#)
        .expect("telegram text regex")
});
static RE_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"datetime="([^"]+)""#).expect("telegram datetime regex")
});

pub struct TelegramConnector {
    channels: Vec<String>,
    client: reqwest::Client,
}

impl TelegramConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        let channels = config_str_list(config, "channels")
            .into_iter()
            .map(|c| c.trim_start_matches('@').to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Self { channels, client: http::client(5, 15) }
    }

    async fn scrape_channel(&self, channel: &str) -> Vec<IngestionRecord> {
        let url = format!("{TG_PUBLIC_BASE}/{channel}");
        let html = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(resp) => {
                warn!(channel, status = %resp.status(), "Telegram preview refused");
                return Vec::new();
            }
            Err(e) => {
                warn!(channel, error = %e, "Telegram preview failed");
                return Vec::new();
            }
        };

        // The preview page is a flat list of message widgets; split on the
        // data-post markers and pair each with the nearest text block.
        let ids: Vec<(String, String)> = RE_MESSAGE
            .captures_iter(&html)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        let texts: Vec<String> = RE_TEXT_BLOCK
            .captures_iter(&html)
            .map(|c| strip_tags(&c[1]))
            .collect();
        let times: Vec<String> = RE_DATETIME
            .captures_iter(&html)
            .map(|c| c[1].to_string())
            .collect();

        ids.into_iter()
            .enumerate()
            .filter_map(|(i, (chan, message_id))| {
                let text = texts.get(i).cloned().unwrap_or_default();
                if text.is_empty() {
                    return None;
                }
                let mut record = IngestionRecord::new(
                    SourceKind::Telegram,
                    format!("{chan}/{message_id}"),
                    now_epoch(),
                );
                record.title = Some(text.chars().take(100).collect());
                record.text = Some(text);
                record.url = Some(format!("https://t.me/{chan}/{message_id}"));
                record.author = Some(chan);
                record.published_at = times.get(i).cloned();
                Some(record)
            })
            .collect()
    }
}

#[async_trait]
impl Connector for TelegramConnector {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn fetch(&self) -> Result<Vec<IngestionRecord>> {
        if self.channels.is_empty() {
            return Ok(Vec::new());
        }

        let mut futs = Vec::new();
        for channel in self.channels.iter() {
            futs.push(self.scrape_channel(channel));
        }
        let records: Vec<IngestionRecord> = stream::iter(futs)
            .buffer_unordered(MAX_CONCURRENT_CHANNELS)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        info!(
            posts = records.len(),
            channels = self.channels.len(),
            "Fetched Telegram previews"
        );
        Ok(records)
    }
}
