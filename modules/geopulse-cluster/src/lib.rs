//! Cross-lingual event clustering. Each unassigned item is matched
//! against an in-memory index of recently active clusters using a hybrid
//! of hashed character n-gram cosine (the language-agnostic backbone)
//! and weighted NER/structured-signature overlap, with key-identity
//! gates, a date-boundary penalty, fuzzy entity rescue and time-decayed
//! ranking. No word vectors anywhere.

pub mod engine;
pub mod fuzz;
pub mod index;
pub mod matcher;
pub mod ngram;
pub mod signature;
pub mod text;

pub use engine::ClusteringEngine;
pub use index::{ClusterIndex, IndexEntry};
pub use matcher::{MatchKind, Matcher, MatcherConfig};
