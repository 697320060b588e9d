use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::ValidationError;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 100;

/// Future returned by a job body.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The body of a job.
///
/// Called exactly once with a cancellation token and the job's nominal
/// duration. The scheduler never looks at what the body does; it only waits
/// for the returned future to finish. Bodies are expected to return promptly
/// once the token is cancelled.
pub type JobAction = Box<dyn FnOnce(CancellationToken, Duration) -> JobFuture + Send + 'static>;

/// Wrap an async closure as a [`JobAction`].
pub fn action<F, Fut>(f: F) -> JobAction
where
    F: FnOnce(CancellationToken, Duration) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |cancel, duration| Box::pin(f(cancel, duration)))
}

/// Stock job body: waits out the duration, or stops early on cancellation.
pub fn sleep_action() -> JobAction {
    action(|cancel, duration| async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                tracing::debug!(duration_ms = duration.as_millis() as u64, "Sleep finished");
            }
            _ = cancel.cancelled() => {
                tracing::debug!("Sleep interrupted by cancellation");
            }
        }
    })
}

fn check_fields(name: &str, priority: i64, duration: Duration) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if priority < MIN_PRIORITY as i64 || priority > MAX_PRIORITY as i64 {
        return Err(ValidationError::PriorityOutOfRange {
            got: priority,
            min: MIN_PRIORITY,
            max: MAX_PRIORITY,
        });
    }
    if duration.is_zero() {
        return Err(ValidationError::NonPositiveDuration);
    }
    Ok(())
}

/// Job submission payload as it arrives from a transport layer.
///
/// Integer fields are signed so out-of-range values survive parsing and are
/// reported as validation failures rather than decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,
    pub priority: i64,
    pub duration_secs: i64,
}

impl JobRequest {
    pub fn new(name: impl Into<String>, priority: i64, duration_secs: i64) -> Self {
        Self {
            name: name.into(),
            priority,
            duration_secs,
        }
    }

    /// Validate the request and turn it into a draft running `action`.
    pub fn into_draft(self, action: JobAction) -> Result<JobDraft, ValidationError> {
        // negative durations collapse to zero and fail the positivity check
        let duration = Duration::from_secs(self.duration_secs.max(0) as u64);
        check_fields(&self.name, self.priority, duration)?;

        Ok(JobDraft {
            name: self.name,
            // range checked above
            priority: self.priority as u8,
            duration,
            action,
        })
    }
}

/// A job that has not been admitted yet, so it has no id.
pub struct JobDraft {
    pub name: String,
    pub priority: u8,
    pub duration: Duration,
    pub action: JobAction,
}

impl JobDraft {
    pub fn new(name: impl Into<String>, priority: u8, duration: Duration, action: JobAction) -> Self {
        Self {
            name: name.into(),
            priority,
            duration,
            action,
        }
    }

    /// Draft whose body is [`sleep_action`].
    pub fn sleeping(name: impl Into<String>, priority: u8, duration: Duration) -> Self {
        Self::new(name, priority, duration, sleep_action())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_fields(&self.name, self.priority as i64, self.duration)
    }
}

impl fmt::Debug for JobDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDraft")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

/// An admitted job. Its id is fixed for the rest of its life.
pub struct Job {
    id: u64,
    name: String,
    priority: u8,
    duration: Duration,
    submitted_at: DateTime<Utc>,
    // Taken once, in `execute`. Keeps `Job: Sync` for bodies that are not.
    action: Mutex<JobAction>,
}

impl Job {
    pub(crate) fn admit(id: u64, draft: JobDraft) -> Self {
        Self {
            id,
            name: draft.name,
            priority: draft.priority,
            duration: draft.duration,
            submitted_at: Utc::now(),
            action: Mutex::new(draft.action),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            name: self.name.clone(),
            priority: self.priority,
            duration_secs: self.duration.as_nanos().div_ceil(1_000_000_000) as u64,
            duration_ms: self.duration.as_millis() as u64,
            submitted_at: self.submitted_at,
        }
    }

    /// Consume the job and run its body.
    ///
    /// The body is only called on the first poll, so a body that panics
    /// while building its future panics inside whatever task polls this.
    pub async fn execute(self, cancel: CancellationToken) {
        let action = self.action.into_inner();
        action(cancel, self.duration).await
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("duration", &self.duration)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

/// Identifying fields of a job, copied out for status and queue reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: u64,
    pub name: String,
    pub priority: u8,
    /// Whole seconds, rounded up. `duration_ms` is exact.
    pub duration_secs: u64,
    pub duration_ms: u64,
    pub submitted_at: DateTime<Utc>,
}
