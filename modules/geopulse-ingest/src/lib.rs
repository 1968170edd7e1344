pub mod enrich;
pub mod gazetteer;
pub mod pipeline;
pub mod stats;

pub use gazetteer::{GazetteerClient, GazetteerCandidate, LocationResolver, ResolvedLocation};
pub use pipeline::IngestPipeline;
pub use stats::IngestStats;
