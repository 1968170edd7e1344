pub mod config;
pub mod error;
pub mod ner;
pub mod time;
pub mod types;

pub use config::Config;
pub use error::GeoPulseError;
pub use ner::{Entity, EntityLabel, EntityRecognizer, LexiconRecognizer};
pub use time::{epoch_secs_to_utc, parse_iso_datetime};
pub use types::*;
