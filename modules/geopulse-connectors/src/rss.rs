//! RSS/Atom news aggregation. Feeds are fetched with a bounded fan-out;
//! a single slow or broken feed can neither hang the worker (connect/read
//! timeouts plus a per-feed wall-clock deadline) nor balloon the batch
//! (per-feed item cap). A per-instance seen-URL set means only articles
//! new since the last cycle are emitted.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use geopulse_common::IngestionRecord;
use geopulse_common::SourceKind;

use crate::{config_str_list, config_u64, http, now_epoch, Connector, ConnectorConfig};

const DEFAULT_FEEDS: &[&str] = &[
    "https://feeds.bbci.co.uk/news/world/rss.xml",
    "https://rss.dw.com/rdf/rss-en-world",
    "https://www.aljazeera.com/xml/rss/all.xml",
    "http://rss.cnn.com/rss/edition_world.rss",
    "https://www.reutersagency.com/feed/?best-topics=world",
];

pub struct RssConnector {
    feeds: Vec<String>,
    max_concurrency: usize,
    max_items_per_feed: usize,
    feed_deadline: Duration,
    fetch_deadline: Option<Duration>,
    client: reqwest::Client,
    seen_urls: Mutex<HashSet<String>>,
}

impl RssConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        let mut feeds = config_str_list(config, "feeds");
        if feeds.is_empty() {
            feeds = DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect();
        }
        let fetch_total = config_u64(config, "fetch_total_timeout_s", 0);
        Self {
            feeds,
            max_concurrency: config_u64(config, "max_workers", 8) as usize,
            max_items_per_feed: config_u64(config, "max_items_per_feed", 200) as usize,
            feed_deadline: Duration::from_secs(config_u64(config, "feed_total_timeout_s", 20)),
            fetch_deadline: (fetch_total > 0).then(|| Duration::from_secs(fetch_total)),
            client: http::client(5, 10),
            seen_urls: Mutex::new(HashSet::new()),
        }
    }

    async fn fetch_one_feed(&self, feed_url: &str) -> Result<Vec<IngestionRecord>> {
        let bytes = self
            .client
            .get(feed_url)
            .send()
            .await
            .context("feed fetch failed")?
            .error_for_status()?
            .bytes()
            .await
            .context("feed body read failed")?;

        let feed = feed_rs::parser::parse(&bytes[..]).context("feed parse failed")?;
        let feed_title = feed.title.as_ref().map(|t| t.content.clone());

        let mut records = Vec::new();
        for entry in feed.entries.into_iter().take(self.max_items_per_feed) {
            let Some(link) = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
            else {
                continue;
            };

            let title = entry.title.map(|t| t.content);
            if title.as_deref().unwrap_or("").is_empty() {
                continue;
            }

            let summary = entry.summary.map(|s| strip_tags(&s.content));
            let published = entry
                .published
                .or(entry.updated)
                .unwrap_or_else(chrono::Utc::now);

            let mut record = IngestionRecord::new(SourceKind::Rss, link.clone(), now_epoch());
            record.title = title.clone();
            record.text = match (&title, &summary) {
                (Some(t), Some(s)) if !s.is_empty() => Some(format!("{t}. {s}")),
                (Some(t), _) => Some(t.clone()),
                (None, s) => s.clone(),
            };
            record.url = Some(link);
            record.author = feed_title.clone();
            record.published_at = Some(published.to_rfc3339());
            records.push(record);
        }
        Ok(records)
    }

    async fn fetch_one_feed_guarded(&self, url: &str) -> Vec<IngestionRecord> {
        match tokio::time::timeout(self.feed_deadline, self.fetch_one_feed(url)).await {
            Ok(Ok(records)) => {
                debug!(feed = %url, items = records.len(), "Feed fetched");
                records
            }
            Ok(Err(e)) => {
                warn!(feed = %url, error = %e, "Feed failed");
                Vec::new()
            }
            Err(_) => {
                warn!(feed = %url, "Feed deadline exceeded");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Connector for RssConnector {
    fn name(&self) -> &'static str {
        "rss"
    }

    async fn fetch(&self) -> Result<Vec<IngestionRecord>> {
        let mut futs = Vec::new();
        for url in self.feeds.iter() {
            futs.push(self.fetch_one_feed_guarded(url));
        }
        let fan_out = stream::iter(futs)
            .buffer_unordered(self.max_concurrency.max(1))
            .collect::<Vec<_>>();

        // Optional global deadline: return whatever is already produced.
        let batches = match self.fetch_deadline {
            Some(deadline) => tokio::time::timeout(deadline, fan_out)
                .await
                .unwrap_or_default(),
            None => fan_out.await,
        };

        let mut seen = self.seen_urls.lock().expect("rss seen set poisoned");
        let mut fresh = Vec::new();
        let mut skipped = 0usize;
        for record in batches.into_iter().flatten() {
            let key = normalized_url(&record.source_id);
            if seen.insert(key) {
                fresh.push(record);
            } else {
                skipped += 1;
            }
        }

        info!(new = fresh.len(), skipped, feeds = self.feeds.len(), "RSS cycle complete");
        Ok(fresh)
    }
}

/// Lowercase scheme and host so the same article under shouty-cased URLs
/// dedups; path and query are case-significant and stay as-is.
fn normalized_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(u) => u.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Feed summaries frequently carry markup; keep the text.
pub(crate) fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_drops_markup() {
        assert_eq!(
            strip_tags("<p>Fire <b>spreads</b> fast</p>"),
            "Fire spreads fast"
        );
        assert_eq!(strip_tags("no markup"), "no markup");
    }

    #[test]
    fn normalized_url_lowercases_host() {
        assert_eq!(
            normalized_url("HTTPS://Example.COM/Path?Q=1"),
            "https://example.com/Path?Q=1"
        );
    }
}
