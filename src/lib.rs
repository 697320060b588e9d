pub mod config;
pub mod error;
pub mod scheduler;
pub mod worker;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError, ValidationError};
pub use scheduler::Scheduler;
