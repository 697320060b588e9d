use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scheduler::job::JobSummary;

/// Capacity of the event broadcast channel. Slow subscribers lag rather
/// than slow down dispatch.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How a job body ended, as far as the scheduler can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The body returned without the cancellation token being set.
    Completed,
    /// The body returned after shutdown cancelled its token.
    Cancelled,
    /// The body panicked. The worker survives and goes idle.
    Panicked,
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutcome::Completed => write!(f, "completed"),
            JobOutcome::Cancelled => write!(f, "cancelled"),
            JobOutcome::Panicked => write!(f, "panicked"),
        }
    }
}

/// Lifecycle events published by the dispatcher and the workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A job left the queue and was handed to a worker.
    Dispatched {
        job: JobSummary,
        worker_id: usize,
        at: DateTime<Utc>,
    },
    /// A worker finished running a job body and is idle again.
    Finished {
        job: JobSummary,
        worker_id: usize,
        outcome: JobOutcome,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
}

impl SchedulerEvent {
    pub fn job(&self) -> &JobSummary {
        match self {
            SchedulerEvent::Dispatched { job, .. } | SchedulerEvent::Finished { job, .. } => job,
        }
    }

    pub fn worker_id(&self) -> usize {
        match self {
            SchedulerEvent::Dispatched { worker_id, .. }
            | SchedulerEvent::Finished { worker_id, .. } => *worker_id,
        }
    }
}
