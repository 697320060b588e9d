use std::time::Duration;

use crate::error::{Result, SchedulerError};

const DEFAULT_WORKER_COUNT: usize = 5;
const DEFAULT_DISPATCH_INTERVAL_MS: u64 = 10;
const DEFAULT_MAX_QUEUED_JOBS: usize = 10_000;
const DEFAULT_SHUTDOWN_DEADLINE_MS: u64 = 5_000;

/// Configuration for a [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of workers in the pool. Must be at least 1.
    pub worker_count: usize,
    /// How often the dispatcher scans for idle workers.
    /// Bounds dispatch latency to one interval.
    pub dispatch_interval_ms: u64,
    /// Maximum number of jobs waiting in the queue.
    pub max_queued_jobs: usize,
    /// Deadline used by callers that do not pick their own when shutting down.
    pub shutdown_deadline_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            dispatch_interval_ms: DEFAULT_DISPATCH_INTERVAL_MS,
            max_queued_jobs: DEFAULT_MAX_QUEUED_JOBS,
            shutdown_deadline_ms: DEFAULT_SHUTDOWN_DEADLINE_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    pub fn with_dispatch_interval_ms(mut self, interval_ms: u64) -> Self {
        self.dispatch_interval_ms = interval_ms;
        self
    }

    pub fn with_max_queued_jobs(mut self, max_queued_jobs: usize) -> Self {
        self.max_queued_jobs = max_queued_jobs;
        self
    }

    pub fn with_shutdown_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.shutdown_deadline_ms = deadline_ms;
        self
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_ms)
    }

    /// Reject configurations the scheduler cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(SchedulerError::InvalidConfiguration(
                "worker count must be at least 1".to_string(),
            ));
        }
        // tokio::time::interval panics on a zero period
        if self.dispatch_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfiguration(
                "dispatch interval must be positive".to_string(),
            ));
        }
        if self.max_queued_jobs == 0 {
            return Err(SchedulerError::InvalidConfiguration(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
