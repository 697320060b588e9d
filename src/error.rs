use std::time::Duration;

use thiserror::Error;

/// A job draft that violates one of the admission constraints.
///
/// Rejected drafts never reach the queue and never consume a job id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name is required")]
    EmptyName,

    #[error("Priority must be between {min} and {max}, got {got}")]
    PriorityOutOfRange { got: i64, min: u8, max: u8 },

    #[error("Duration must be positive")]
    NonPositiveDuration,
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid job: {0}")]
    Validation(#[from] ValidationError),

    #[error("Job queue is at capacity ({0} jobs)")]
    QueueFull(usize),

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_messages_name_the_constraint() {
        assert_eq!(ValidationError::EmptyName.to_string(), "Name is required");
        assert_eq!(
            ValidationError::PriorityOutOfRange {
                got: 0,
                min: 1,
                max: 100
            }
            .to_string(),
            "Priority must be between 1 and 100, got 0"
        );
        assert_eq!(
            ValidationError::NonPositiveDuration.to_string(),
            "Duration must be positive"
        );
    }

    #[test]
    fn validation_error_converts_into_scheduler_error() {
        let err: SchedulerError = ValidationError::EmptyName.into();
        assert!(matches!(
            err,
            SchedulerError::Validation(ValidationError::EmptyName)
        ));
        assert_eq!(err.to_string(), "Invalid job: Name is required");
    }
}
