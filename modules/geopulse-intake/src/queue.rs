//! The hand-off store between the supervisor's connector workers and the
//! ingestion pipeline. `raw_items` is a consume-on-read FIFO; the config
//! keys are read-without-consume, last-writer-wins. One mutex serialises
//! everything — this is the only synchronisation point between the two
//! sides, and no item is ever returned twice.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub status: &'static str,
    pub raw_items_queue_size: usize,
}

#[derive(Debug)]
struct QueueState {
    raw_items: Vec<serde_json::Value>,
    tweet_sources: HashMap<String, bool>,
    search_queries: Vec<String>,
}

pub struct IntakeQueue {
    inner: Mutex<QueueState>,
}

impl Default for IntakeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeQueue {
    pub fn new() -> Self {
        let tweet_sources = [
            ("home_timeline".to_string(), true),
            ("search".to_string(), true),
            ("home_latest_timeline".to_string(), true),
        ]
        .into_iter()
        .collect();

        Self {
            inner: Mutex::new(QueueState {
                raw_items: Vec::new(),
                tweet_sources,
                search_queries: vec!["breaking".to_string()],
            }),
        }
    }

    /// Append a batch atomically. Returns (appended, new queue size).
    pub fn push_raw_items(&self, batch: Vec<serde_json::Value>) -> (usize, usize) {
        let mut state = self.inner.lock().expect("intake queue poisoned");
        let added = batch.len();
        state.raw_items.extend(batch);
        (added, state.raw_items.len())
    }

    /// Return the entire queue and clear it.
    pub fn drain_raw_items(&self) -> Vec<serde_json::Value> {
        let mut state = self.inner.lock().expect("intake queue poisoned");
        std::mem::take(&mut state.raw_items)
    }

    pub fn tweet_sources(&self) -> HashMap<String, bool> {
        self.inner.lock().expect("intake queue poisoned").tweet_sources.clone()
    }

    pub fn set_tweet_sources(&self, value: HashMap<String, bool>) {
        self.inner.lock().expect("intake queue poisoned").tweet_sources = value;
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.inner.lock().expect("intake queue poisoned").search_queries.clone()
    }

    pub fn set_search_queries(&self, value: Vec<String>) {
        self.inner.lock().expect("intake queue poisoned").search_queries = value;
    }

    pub fn health(&self) -> QueueHealth {
        let state = self.inner.lock().expect("intake queue poisoned");
        QueueHealth { status: "healthy", raw_items_queue_size: state.raw_items.len() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_then_drain_consumes() {
        let q = IntakeQueue::new();
        let (added, size) = q.push_raw_items(vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(added, 2);
        assert_eq!(size, 2);

        let drained = q.drain_raw_items();
        assert_eq!(drained.len(), 2);
        assert!(q.drain_raw_items().is_empty(), "second drain must be empty");
        assert_eq!(q.health().raw_items_queue_size, 0);
    }

    #[test]
    fn drains_preserve_push_order() {
        let q = IntakeQueue::new();
        q.push_raw_items(vec![json!(1), json!(2)]);
        q.push_raw_items(vec![json!(3)]);
        let drained = q.drain_raw_items();
        assert_eq!(drained, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn config_keys_are_not_consumed() {
        let q = IntakeQueue::new();
        assert_eq!(q.search_queries(), vec!["breaking".to_string()]);
        assert_eq!(q.search_queries(), vec!["breaking".to_string()]);

        q.set_search_queries(vec!["earthquake".to_string(), "protest".to_string()]);
        assert_eq!(q.search_queries().len(), 2, "last writer wins");
    }

    #[test]
    fn default_tweet_sources_seeded() {
        let q = IntakeQueue::new();
        let sources = q.tweet_sources();
        assert_eq!(sources.get("home_timeline"), Some(&true));
        assert_eq!(sources.len(), 3);
    }
}
