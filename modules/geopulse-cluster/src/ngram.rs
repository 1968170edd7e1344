//! Hashed character n-gram vectors — the language-agnostic semantic
//! backbone. Character 3–5-grams survive translation and script-adjacent
//! spellings far better than word tokens do; hashing keeps the vectors
//! bounded. The hash is XXH64 with a fixed seed, so vectors are stable
//! within and across processes.

use std::collections::HashMap;
use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::text::clean_for_ngrams;

pub const NGRAM_DIM: u64 = 1 << 16;
pub const NGRAM_MIN: usize = 3;
pub const NGRAM_MAX: usize = 5;

const HASH_SEED: u64 = 0x9e3779b97f4a7c15;

/// Sparse bucket → weight map.
pub type NgramVector = HashMap<u32, f64>;

fn bucket(gram: &[char]) -> u32 {
    let mut hasher = XxHash64::with_seed(HASH_SEED);
    let s: String = gram.iter().collect();
    hasher.write(s.as_bytes());
    (hasher.finish() % NGRAM_DIM) as u32
}

/// Build the vector for a text: clean, pad with one space per side, count
/// every contiguous n-gram for n in 3..=5, log-scale the counts.
pub fn hashed_char_ngrams(text: &str) -> NgramVector {
    let cleaned = clean_for_ngrams(text);
    if cleaned.is_empty() {
        return NgramVector::new();
    }

    let padded: Vec<char> = std::iter::once(' ')
        .chain(cleaned.chars())
        .chain(std::iter::once(' '))
        .collect();

    let mut counts: HashMap<u32, u32> = HashMap::new();
    for n in NGRAM_MIN..=NGRAM_MAX {
        if padded.len() < n {
            continue;
        }
        for window in padded.windows(n) {
            *counts.entry(bucket(window)).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .map(|(k, c)| (k, 1.0 + (1.0 + c as f64).ln()))
        .collect()
}

pub fn cosine_sparse(a: &NgramVector, b: &NgramVector) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    let dot: f64 = small
        .iter()
        .filter_map(|(k, va)| large.get(k).map(|vb| va * vb))
        .sum();
    let norm_a: f64 = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a <= 1e-12 || norm_b <= 1e-12 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_have_cosine_one() {
        let a = hashed_char_ngrams("Magnitude 6.2 earthquake shakes Tokyo");
        let b = hashed_char_ngrams("Magnitude 6.2 earthquake shakes Tokyo");
        assert!((cosine_sparse(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn vectors_are_deterministic() {
        let a = hashed_char_ngrams("stable across refreshes");
        let b = hashed_char_ngrams("stable across refreshes");
        assert_eq!(a, b);
    }

    #[test]
    fn unrelated_texts_are_dissimilar() {
        let a = hashed_char_ngrams("Magnitude 6.2 earthquake shakes Tokyo");
        let b = hashed_char_ngrams("Quarterly smartphone shipments rose in Brazil");
        assert!(cosine_sparse(&a, &b) < 0.15, "{}", cosine_sparse(&a, &b));
    }

    #[test]
    fn translation_shares_substance() {
        // Shared names, numbers and loanwords keep the cosine well above
        // the unrelated floor even across languages.
        let a = hashed_char_ngrams(
            "Magnitude 6.2 earthquake shakes Tokyo on 2026-01-17; JMA issues alerts",
        );
        let b = hashed_char_ngrams("Potres magnitude 6,2 je stresel Tokio 2026-01-17; JMA izda opozorila");
        let sim = cosine_sparse(&a, &b);
        assert!(sim > 0.28, "cross-lingual cosine too low: {sim}");
    }

    #[test]
    fn empty_text_is_zero() {
        assert!(hashed_char_ngrams("").is_empty());
        assert_eq!(cosine_sparse(&NgramVector::new(), &hashed_char_ngrams("x y z")), 0.0);
    }
}
