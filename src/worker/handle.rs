use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::scheduler::event::SchedulerEvent;
use crate::scheduler::job::{Job, JobSummary};
use crate::worker::executor::WorkerExecutor;

/// Point-in-time view of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub worker_id: usize,
    pub busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<JobSummary>,
}

/// The scheduler's side of a worker: the single-slot handoff channel and the
/// job the worker currently owns.
///
/// `current` is set by [`try_assign`](Self::try_assign) at handoff and cleared
/// by the executor once the job body returns. Both happen under the same
/// lock, so readers never see a half-updated worker.
#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    slot: mpsc::Sender<Job>,
    current: Arc<RwLock<Option<JobSummary>>>,
}

impl WorkerHandle {
    /// Create a worker. The returned executor must be spawned to run jobs.
    pub fn new(
        id: usize,
        shutdown: CancellationToken,
        events: broadcast::Sender<SchedulerEvent>,
    ) -> (Self, WorkerExecutor) {
        let (slot, rx) = mpsc::channel(1);
        let current = Arc::new(RwLock::new(None));
        let executor = WorkerExecutor::new(id, rx, current.clone(), shutdown, events);

        (Self { id, slot, current }, executor)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub async fn is_idle(&self) -> bool {
        self.current.read().await.is_none()
    }

    pub async fn current(&self) -> Option<JobSummary> {
        self.current.read().await.clone()
    }

    pub async fn status(&self) -> WorkerStatus {
        let current_job = self.current().await;
        WorkerStatus {
            worker_id: self.id,
            busy: current_job.is_some(),
            current_job,
        }
    }

    /// Hand `job` to this worker without waiting.
    ///
    /// Succeeds only if the worker is idle and its executor is still running.
    /// On failure the job is given back untouched.
    pub async fn try_assign(&self, job: Job) -> Result<JobSummary, Job> {
        let mut current = self.current.write().await;
        if current.is_some() {
            return Err(job);
        }

        let summary = job.summary();
        match self.slot.try_send(job) {
            Ok(()) => {
                *current = Some(summary.clone());
                Ok(summary)
            }
            Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => Err(job),
        }
    }
}
