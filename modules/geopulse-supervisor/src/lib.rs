pub mod schedule;
pub mod state;
pub mod supervisor;
pub mod types;

pub use schedule::{default_schedules, ConnectorSchedule};
pub use supervisor::Supervisor;
pub use types::SupervisorStats;
