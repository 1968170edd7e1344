//! The in-memory index of recently active clusters. Owned exclusively by
//! the clustering worker; refreshed from the store on a timer or on
//! demand, updated in place when a cluster is created, and pruned when an
//! entry turns out to be stale.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use geopulse_common::EntityRecognizer;

use crate::ngram::{hashed_char_ngrams, NgramVector};
use crate::signature::{extract_signature, flatten_features, Signature};
use crate::text::{canonicalize, Script};

/// Everything the matcher needs to know about one cluster.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub cluster_id: Uuid,
    pub rep_text: String,
    pub rep_canon: String,
    pub rep_sig: Signature,
    pub rep_flat: std::collections::HashSet<String>,
    pub rep_script: Script,
    pub rep_ng: NgramVector,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl IndexEntry {
    pub fn build(
        ner: &dyn EntityRecognizer,
        cluster_id: Uuid,
        rep_text: &str,
        last_seen_at: Option<DateTime<Utc>>,
    ) -> Self {
        let (canon, _) = canonicalize(rep_text);
        let (sig, script) = extract_signature(ner, rep_text);
        let flat = flatten_features(&sig);
        let ng = hashed_char_ngrams(rep_text);
        Self {
            cluster_id,
            rep_text: rep_text.to_string(),
            rep_canon: canon,
            rep_sig: sig,
            rep_flat: flat,
            rep_script: script,
            rep_ng: ng,
            last_seen_at,
        }
    }
}

#[derive(Default)]
pub struct ClusterIndex {
    pub entries: Vec<IndexEntry>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl ClusterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from (cluster_id, representative text, last_seen_at)
    /// tuples, newest activity first as handed over by the store.
    pub fn refresh_with(
        &mut self,
        ner: &dyn EntityRecognizer,
        reps: Vec<(Uuid, String, Option<DateTime<Utc>>)>,
    ) {
        self.entries = reps
            .into_iter()
            .filter(|(_, text, _)| !text.trim().is_empty())
            .map(|(id, text, seen)| IndexEntry::build(ner, id, &text, seen))
            .collect();
        self.last_refresh = Some(Utc::now());
    }

    /// Insert or replace one cluster's entry at the front, so items later
    /// in the same batch can match it immediately.
    pub fn add_or_update(
        &mut self,
        ner: &dyn EntityRecognizer,
        cluster_id: Uuid,
        rep_text: &str,
        last_seen_at: Option<DateTime<Utc>>,
    ) {
        if rep_text.trim().is_empty() {
            return;
        }
        self.entries.retain(|e| e.cluster_id != cluster_id);
        self.entries.insert(0, IndexEntry::build(ner, cluster_id, rep_text, last_seen_at));
    }

    /// Drop a stale entry (cluster vanished from the store).
    pub fn remove(&mut self, cluster_id: Uuid) {
        self.entries.retain(|e| e.cluster_id != cluster_id);
    }

    pub fn cluster_ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|e| e.cluster_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geopulse_common::LexiconRecognizer;

    #[test]
    fn refresh_builds_entries_and_skips_empty_reps() {
        let ner = LexiconRecognizer::new();
        let mut index = ClusterIndex::new();
        index.refresh_with(
            &ner,
            vec![
                (Uuid::new_v4(), "Earthquake shakes Tokyo".to_string(), None),
                (Uuid::new_v4(), "   ".to_string(), None),
            ],
        );
        assert_eq!(index.entries.len(), 1);
        assert!(index.last_refresh.is_some());
        assert!(index.entries[0].rep_canon.contains("tokyo"));
    }

    #[test]
    fn add_or_update_replaces_and_fronts() {
        let ner = LexiconRecognizer::new();
        let mut index = ClusterIndex::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        index.add_or_update(&ner, a, "First story about floods", None);
        index.add_or_update(&ner, b, "Second story about fires", None);
        assert_eq!(index.entries[0].cluster_id, b, "newest entry sits in front");

        index.add_or_update(&ner, a, "First story, updated title", None);
        assert_eq!(index.entries.len(), 2, "update must not duplicate");
        assert_eq!(index.entries[0].cluster_id, a);
    }

    #[test]
    fn remove_prunes_stale_entries() {
        let ner = LexiconRecognizer::new();
        let mut index = ClusterIndex::new();
        let a = Uuid::new_v4();
        index.add_or_update(&ner, a, "Some story", None);
        index.remove(a);
        assert!(index.entries.is_empty());
    }
}
