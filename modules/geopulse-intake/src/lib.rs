pub mod client;
pub mod queue;
pub mod server;

pub use client::IntakeClient;
pub use queue::{IntakeQueue, QueueHealth};
