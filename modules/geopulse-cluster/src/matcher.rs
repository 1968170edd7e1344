//! Cluster assignment. Step order is fixed: candidate prefilter, lexical
//! near-duplicate, then combined n-gram + signature scoring behind the
//! key-identity gate. Dates are a boundary, never glue; a shared country
//! alone is never enough.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use geopulse_common::EntityRecognizer;

use crate::fuzz;
use crate::index::{ClusterIndex, IndexEntry};
use crate::ngram::{cosine_sparse, hashed_char_ngrams, NgramVector};
use crate::signature::{
    extract_signature, flatten_features, has_event_indicators, label_weight, weighted_jaccard,
    Signature, KEY_LABELS,
};
use crate::text::{canonicalize, Script};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    NearDupTokenSet,
    NearDupPartial,
    NgramSignature,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::NearDupTokenSet => "near_dup_token_set",
            MatchKind::NearDupPartial => "near_dup_partial",
            MatchKind::NgramSignature => "ngram+ner_signature",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Match {
    pub cluster_id: Uuid,
    pub score: f64,
    pub kind: MatchKind,
}

/// Precomputed features for one incoming item.
pub struct ItemFeatures {
    pub canon: String,
    pub sig: Signature,
    pub flat: std::collections::HashSet<String>,
    pub script: Script,
    pub ng: NgramVector,
}

impl ItemFeatures {
    pub fn compute(ner: &dyn EntityRecognizer, text: &str) -> Self {
        let (canon, _) = canonicalize(text);
        let (sig, script) = extract_signature(ner, text);
        let flat = flatten_features(&sig);
        let ng = hashed_char_ngrams(text);
        Self { canon, sig, flat, script, ng }
    }

    pub fn is_empty(&self) -> bool {
        self.canon.is_empty() && self.sig.is_empty() && self.ng.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    // Lexical near-dup thresholds on canonical strings
    pub enable_lexical_near_dup: bool,
    pub lex_token_set: f64,
    pub lex_partial: f64,

    // Combined scoring
    pub ng_weight: f64,
    pub min_ng_score: f64,
    pub sig_weight: f64,
    pub min_sig_score: f64,
    pub min_final_score: f64,

    // Targeted fuzzy entity rescue
    pub enable_fuzzy_entities: bool,
    pub fuzzy_threshold: f64,
    pub fuzzy_max_checks_per_label: usize,
    pub fuzzy_bonus_weight: f64,

    // Script guard (conservative, off by default)
    pub script_guard: bool,
    pub cross_script_strong_score: f64,

    // Dates separate stories, they never join them
    pub iso_date_mismatch_penalty: f64,

    // Time-aware filtering and ranking
    pub max_cluster_age_days: i64,
    pub time_half_life_hours: f64,
    pub time_weight: f64,

    // Candidate prefilter
    pub prefilter_max_candidates: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            enable_lexical_near_dup: true,
            lex_token_set: 85.0,
            lex_partial: 88.0,
            ng_weight: 0.55,
            min_ng_score: 0.28,
            sig_weight: 0.35,
            min_sig_score: 0.18,
            min_final_score: 0.36,
            enable_fuzzy_entities: true,
            fuzzy_threshold: 88.0,
            fuzzy_max_checks_per_label: 30,
            fuzzy_bonus_weight: 0.10,
            script_guard: false,
            cross_script_strong_score: 0.72,
            iso_date_mismatch_penalty: 0.08,
            max_cluster_age_days: 21,
            time_half_life_hours: 72.0,
            time_weight: 0.10,
            prefilter_max_candidates: 2500,
        }
    }
}

pub struct Matcher {
    pub config: MatcherConfig,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Match an item against the index. `None` means "open a new
    /// cluster".
    pub fn assign(
        &self,
        item: &ItemFeatures,
        index: &ClusterIndex,
        now: DateTime<Utc>,
    ) -> Option<Match> {
        if index.entries.is_empty() || item.is_empty() {
            return None;
        }

        let candidates = self.prefilter(item, index);

        if self.config.enable_lexical_near_dup && !item.canon.is_empty() {
            if let Some(m) = self.best_lexical(item, &candidates) {
                return Some(m);
            }
        }

        self.best_combined(item, &candidates, now)
    }

    /// Hard gate: a candidate must share at least one {label=value}
    /// feature with the item. Only an item with no features at all falls
    /// back to the full index. Capped to bound fan-out on very common
    /// features.
    fn prefilter<'a>(&self, item: &ItemFeatures, index: &'a ClusterIndex) -> Vec<&'a IndexEntry> {
        if item.flat.is_empty() {
            return index.entries.iter().collect();
        }
        index
            .entries
            .iter()
            .filter(|e| !e.rep_flat.is_disjoint(&item.flat))
            .take(self.config.prefilter_max_candidates)
            .collect()
    }

    fn best_lexical(&self, item: &ItemFeatures, candidates: &[&IndexEntry]) -> Option<Match> {
        let mut best_token: Option<(Uuid, f64)> = None;
        for e in candidates {
            if e.rep_canon.is_empty() {
                continue;
            }
            let score = fuzz::token_set_ratio(&item.canon, &e.rep_canon);
            if score >= self.config.lex_token_set
                && best_token.map_or(true, |(_, b)| score > b)
            {
                best_token = Some((e.cluster_id, score));
            }
        }
        if let Some((id, score)) = best_token {
            return Some(Match {
                cluster_id: id,
                score: score / 100.0,
                kind: MatchKind::NearDupTokenSet,
            });
        }

        let mut best_partial: Option<(Uuid, f64)> = None;
        for e in candidates {
            if e.rep_canon.is_empty() {
                continue;
            }
            let score = fuzz::partial_ratio(&item.canon, &e.rep_canon);
            if score >= self.config.lex_partial
                && best_partial.map_or(true, |(_, b)| score > b)
            {
                best_partial = Some((e.cluster_id, score));
            }
        }
        best_partial.map(|(id, score)| Match {
            cluster_id: id,
            score: score / 100.0,
            kind: MatchKind::NearDupPartial,
        })
    }

    fn best_combined(
        &self,
        item: &ItemFeatures,
        candidates: &[&IndexEntry],
        now: DateTime<Utc>,
    ) -> Option<Match> {
        let cfg = &self.config;
        let mut best: Option<(Uuid, f64)> = None;

        for e in candidates {
            if self.too_old(now, e.last_seen_at) {
                continue;
            }

            let cross_script = cfg.script_guard
                && item.script != Script::Other
                && e.rep_script != Script::Other
                && item.script != e.rep_script;

            let ng_sc = cosine_sparse(&item.ng, &e.rep_ng);
            if ng_sc < cfg.min_ng_score {
                continue;
            }

            let mut sig_sc = weighted_jaccard(&item.sig, &e.rep_sig);

            // Targeted rescue: NER spelled the same entity two ways and
            // dragged the overlap just under the floor.
            if cfg.enable_fuzzy_entities
                && ng_sc >= cfg.min_ng_score + 0.05
                && sig_sc < cfg.min_sig_score
                && sig_sc > cfg.min_sig_score * 0.75
            {
                sig_sc = sig_sc.max(self.fuzzy_boost(&item.sig, &e.rep_sig, sig_sc));
            }

            if !self.passes_key_gate(&item.sig, &e.rep_sig, ng_sc) {
                continue;
            }

            let mut final_score = cfg.ng_weight * ng_sc + cfg.sig_weight * sig_sc;
            final_score -= self.iso_date_penalty(&item.sig, &e.rep_sig);

            if cross_script && final_score < cfg.cross_script_strong_score {
                continue;
            }

            if cfg.time_weight > 0.0 {
                if let Some(seen) = e.last_seen_at {
                    let age_h = (now - seen).num_seconds().max(0) as f64 / 3600.0;
                    let decay = (2.0f64).powf(-age_h / cfg.time_half_life_hours);
                    final_score += cfg.time_weight * (decay - 1.0);
                }
            }

            if final_score < cfg.min_final_score {
                continue;
            }
            if best.map_or(true, |(_, b)| final_score > b) {
                best = Some((e.cluster_id, final_score));
            }
        }

        best.map(|(id, score)| Match { cluster_id: id, score, kind: MatchKind::NgramSignature })
    }

    fn too_old(&self, now: DateTime<Utc>, last_seen_at: Option<DateTime<Utc>>) -> bool {
        match last_seen_at {
            Some(seen) => now - seen > Duration::days(self.config.max_cluster_age_days),
            None => false,
        }
    }

    /// The identity gate. Accept when semantic similarity alone is very
    /// strong, when a key label (PERSON/ORG/EVENT/LAW — never GPE) shares
    /// a value, when both sides carry event indicators and the semantics
    /// are decent, or when a fuzzy key overlap exists at decent
    /// semantics.
    fn passes_key_gate(&self, a: &Signature, b: &Signature, ng_score: f64) -> bool {
        if ng_score >= 0.60 {
            return true;
        }

        for label in KEY_LABELS {
            if let (Some(va), Some(vb)) = (a.get(label), b.get(label)) {
                if va.intersection(vb).next().is_some() {
                    return true;
                }
            }
        }

        if has_event_indicators(a) && has_event_indicators(b) && ng_score >= 0.45 {
            return true;
        }

        if self.config.enable_fuzzy_entities
            && ng_score >= 0.42
            && self.has_fuzzy_key_overlap(a, b)
        {
            return true;
        }

        false
    }

    fn has_fuzzy_key_overlap(&self, a: &Signature, b: &Signature) -> bool {
        let cap = self.config.fuzzy_max_checks_per_label;
        for label in KEY_LABELS {
            let (Some(va), Some(vb)) = (a.get(label), b.get(label)) else {
                continue;
            };
            for x in va.iter().take(cap) {
                for y in vb.iter().take(cap) {
                    if fuzz::token_set_ratio(x, y) >= self.config.fuzzy_threshold {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Both sides dated, no date in common: subtract the boundary
    /// penalty.
    fn iso_date_penalty(&self, a: &Signature, b: &Signature) -> f64 {
        let (Some(da), Some(db)) = (a.get("ISO_DATE"), b.get("ISO_DATE")) else {
            return 0.0;
        };
        if da.is_empty() || db.is_empty() || da.intersection(db).next().is_some() {
            return 0.0;
        }
        self.config.iso_date_mismatch_penalty
    }

    /// Bounded bonus from fuzzy matches between key-label values,
    /// proportional to per-label weight.
    fn fuzzy_boost(&self, a: &Signature, b: &Signature, base: f64) -> f64 {
        let cap = self.config.fuzzy_max_checks_per_label;
        let mut hits = 0.0;
        let mut total = 0.0;

        for label in KEY_LABELS {
            let (Some(va), Some(vb)) = (a.get(label), b.get(label)) else {
                continue;
            };
            let w = label_weight(label);
            for x in va.iter().take(cap) {
                let mut best = 0.0f64;
                for y in vb.iter().take(cap) {
                    let s = fuzz::token_set_ratio(x, y);
                    if s > best {
                        best = s;
                        if best >= 100.0 {
                            break;
                        }
                    }
                }
                if best >= self.config.fuzzy_threshold {
                    hits += w * (best / 100.0);
                }
                total += w;
            }
        }

        if total <= 1e-9 {
            return base;
        }
        (base + self.config.fuzzy_bonus_weight * (hits / total)).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geopulse_common::LexiconRecognizer;

    fn index_with(reps: &[(&str, Uuid)]) -> ClusterIndex {
        let ner = LexiconRecognizer::new();
        let mut index = ClusterIndex::new();
        index.refresh_with(
            &ner,
            reps.iter()
                .map(|(text, id)| (*id, text.to_string(), Some(Utc::now())))
                .collect(),
        );
        index
    }

    fn features(text: &str) -> ItemFeatures {
        ItemFeatures::compute(&LexiconRecognizer::new(), text)
    }

    #[test]
    fn empty_index_means_new_cluster() {
        let matcher = Matcher::default();
        let index = ClusterIndex::new();
        assert!(matcher.assign(&features("Anything at all"), &index, Utc::now()).is_none());
    }

    #[test]
    fn reordered_repost_is_a_near_duplicate() {
        let id = Uuid::new_v4();
        let index = index_with(&[(
            "Wildfire forces evacuation of 3000 residents near Athens suburbs",
            id,
        )]);
        let matcher = Matcher::default();
        let m = matcher
            .assign(
                &features("Near Athens suburbs, wildfire forces evacuation of 3000 residents"),
                &index,
                Utc::now(),
            )
            .expect("reordered repost must match");
        assert_eq!(m.cluster_id, id);
        assert_eq!(m.kind, MatchKind::NearDupTokenSet);
        assert!(m.score >= 0.85, "score={}", m.score);
    }

    #[test]
    fn cross_lingual_translation_joins_the_cluster() {
        let id = Uuid::new_v4();
        let index = index_with(&[(
            "Magnitude 6.2 earthquake shakes Tokyo on 2026-01-17; JMA issues alerts; no tsunami confirmed.",
            id,
        )]);
        let matcher = Matcher::default();
        let m = matcher
            .assign(
                &features(
                    "Potres magnitude 6,2 je stresel Tokio 2026-01-17; JMA izda opozorila; cunamija ni.",
                ),
                &index,
                Utc::now(),
            )
            .expect("translated report must join the cluster");
        assert_eq!(m.cluster_id, id);
        assert!(
            matches!(m.kind, MatchKind::NgramSignature | MatchKind::NearDupPartial),
            "kind={:?}",
            m.kind
        );
        if m.kind == MatchKind::NgramSignature {
            assert!(m.score >= 0.36, "score={}", m.score);
        }
    }

    #[test]
    fn disjoint_dates_split_otherwise_similar_stories() {
        let id = Uuid::new_v4();
        let rep = "ECB cuts interest rates on 2026-01-16 as euro area inflation cools";
        let index = index_with(&[(rep, id)]);
        let matcher = Matcher::default();

        // Same story wording, different ISO date: the boundary penalty
        // must push it under the acceptance threshold.
        let different_day = features(
            "Frankfurt policymakers trim borrowing costs 2026-01-23; ECB cites euro area inflation",
        );
        assert!(
            matcher.assign(&different_day, &index, Utc::now()).is_none(),
            "disjoint dates must open a new cluster"
        );

        // Identical wording with the matching date sails through.
        let same_day = features(
            "Frankfurt policymakers trim borrowing costs 2026-01-16; ECB cites euro area inflation",
        );
        let m = matcher
            .assign(&same_day, &index, Utc::now())
            .expect("same-date follow-up must match");
        assert_eq!(m.kind, MatchKind::NgramSignature);
    }

    #[test]
    fn shared_country_alone_never_merges() {
        let id = Uuid::new_v4();
        let index = index_with(&[(
            "Road closures around Reykjavik as Iceland farmers stage tractor convoy",
            id,
        )]);
        let matcher = Matcher::default();

        // Plenty of GPE overlap (Iceland, Reykjavik) and decent n-gram
        // similarity, but zero PERSON/ORG/EVENT/LAW overlap: the key gate
        // must refuse.
        let unrelated = features(
            "Road closures near Reykjavik while Iceland hosts annual city marathon",
        );
        assert!(
            matcher.assign(&unrelated, &index, Utc::now()).is_none(),
            "GPE-only overlap must not merge stories"
        );
    }

    #[test]
    fn shared_org_satisfies_the_key_gate() {
        let id = Uuid::new_v4();
        let rep = "ECB cuts interest rates on 2026-01-16 as euro area inflation cools";
        let index = index_with(&[(rep, id)]);
        let matcher = Matcher::default();

        let follow_up = features(
            "Frankfurt policymakers trim borrowing costs 2026-01-16; ECB cites euro area inflation",
        );
        let m = matcher.assign(&follow_up, &index, Utc::now());
        assert!(m.is_some(), "ORG overlap plus decent similarity must match");
    }

    #[test]
    fn stale_clusters_are_not_candidates() {
        let ner = LexiconRecognizer::new();
        let mut index = ClusterIndex::new();
        let id = Uuid::new_v4();
        let rep = "Magnitude 6.2 earthquake shakes Tokyo on 2026-01-17; JMA issues alerts";
        index.refresh_with(
            &ner,
            vec![(id, rep.to_string(), Some(Utc::now() - Duration::days(40)))],
        );

        let mut config = MatcherConfig::default();
        config.enable_lexical_near_dup = false; // force the combined path
        let matcher = Matcher::new(config);

        assert!(
            matcher.assign(&features(rep), &index, Utc::now()).is_none(),
            "entries past the age horizon must be ignored"
        );
    }

    #[test]
    fn time_decay_softly_penalizes_older_clusters() {
        let ner = LexiconRecognizer::new();
        let rep = "Magnitude 6.2 earthquake shakes Tokyo on 2026-01-17; JMA issues alerts";
        let mut config = MatcherConfig::default();
        config.enable_lexical_near_dup = false;
        let matcher = Matcher::new(config);
        let now = Utc::now();

        let mut fresh = ClusterIndex::new();
        fresh.refresh_with(&ner, vec![(Uuid::new_v4(), rep.to_string(), Some(now))]);
        let fresh_score = matcher.assign(&features(rep), &fresh, now).unwrap().score;

        let mut old = ClusterIndex::new();
        old.refresh_with(
            &ner,
            vec![(Uuid::new_v4(), rep.to_string(), Some(now - Duration::days(7)))],
        );
        let old_score = matcher.assign(&features(rep), &old, now).unwrap().score;

        assert!(
            old_score < fresh_score,
            "old={old_score} fresh={fresh_score}"
        );
    }

    #[test]
    fn featureless_item_falls_back_to_full_index() {
        // Short lowercase words yield a canon but no signature at all; an
        // item like that is compared against the whole index and then
        // rejected on merit, not by accident.
        let index = index_with(&[("Completely unrelated municipal budget meeting", Uuid::new_v4())]);
        let matcher = Matcher::default();

        let item = features("old mill road shut");
        assert!(item.flat.is_empty(), "{:?}", item.flat);
        assert_eq!(matcher.prefilter(&item, &index).len(), index.entries.len());
        assert!(matcher.assign(&item, &index, Utc::now()).is_none());
    }

    #[test]
    fn prefilter_excludes_candidates_sharing_no_features() {
        // The item carries features, the index entry shares none of them:
        // the prefilter is a hard gate, nothing reaches scoring.
        let index = index_with(&[("Berlin cancels airport expansion plans", Uuid::new_v4())]);
        let matcher = Matcher::default();

        let item = features("Tokyo announces stadium upgrade funding");
        assert!(!item.flat.is_empty(), "item must have features for this test");
        assert!(
            matcher.prefilter(&item, &index).is_empty(),
            "zero shared features must exclude every candidate"
        );
        assert!(matcher.assign(&item, &index, Utc::now()).is_none());
    }

    #[test]
    fn best_scoring_candidate_wins() {
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        let index = index_with(&[
            (
                "Magnitude 6.2 earthquake shakes Tokyo on 2026-01-17; JMA issues alerts; no tsunami confirmed.",
                close,
            ),
            (
                "ECB cuts interest rates on 2026-01-16 as euro area inflation cools",
                far,
            ),
        ]);
        let matcher = Matcher::default();
        let m = matcher
            .assign(
                &features(
                    "Potres magnitude 6,2 je stresel Tokio 2026-01-17; JMA izda opozorila; cunamija ni.",
                ),
                &index,
                Utc::now(),
            )
            .expect("must match the earthquake cluster");
        assert_eq!(m.cluster_id, close);
    }
}
