use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::scheduler::dispatcher::Dispatcher;
use crate::scheduler::event::{SchedulerEvent, EVENT_CHANNEL_CAPACITY};
use crate::scheduler::job::{JobAction, JobDraft, JobRequest, JobSummary};
use crate::scheduler::queue::JobQueue;
use crate::worker::{WorkerHandle, WorkerStatus};

/// Priority scheduler with a fixed pool of workers.
///
/// Owns the job queue, the workers and the dispatcher. Construct it once,
/// hand it (usually behind an `Arc`) to whatever submits work, and call
/// [`shutdown`](Self::shutdown) before dropping it.
///
/// Dropping the scheduler cancels every job body and aborts whatever
/// activities are still running.
pub struct Scheduler {
    config: SchedulerConfig,
    queue: Arc<RwLock<JobQueue>>,
    workers: Arc<[WorkerHandle]>,
    shutdown: CancellationToken,
    events: broadcast::Sender<SchedulerEvent>,
    tasks: Mutex<JoinSet<()>>,
}

impl Scheduler {
    /// Start a scheduler with `worker_count` workers and default settings.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfiguration`] if `worker_count` is 0.
    pub fn new(worker_count: usize) -> Result<Self> {
        Self::with_config(SchedulerConfig::new(worker_count))
    }

    /// Start a scheduler from a full configuration.
    ///
    /// Spawns one task per worker plus the dispatcher task.
    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let queue = Arc::new(RwLock::new(JobQueue::with_capacity(config.max_queued_jobs)));
        let mut tasks = JoinSet::new();

        let mut workers = Vec::with_capacity(config.worker_count);
        for id in 0..config.worker_count {
            let (handle, executor) = WorkerHandle::new(id, shutdown.clone(), events.clone());
            tasks.spawn(executor.run());
            workers.push(handle);
        }
        let workers: Arc<[WorkerHandle]> = workers.into();

        let dispatcher = Dispatcher::new(
            queue.clone(),
            workers.clone(),
            config.dispatch_interval(),
            shutdown.clone(),
            events.clone(),
        );
        tasks.spawn(dispatcher.run());

        tracing::info!(
            worker_count = config.worker_count,
            dispatch_interval_ms = config.dispatch_interval_ms,
            max_queued_jobs = config.max_queued_jobs,
            "Scheduler started"
        );

        Ok(Self {
            config,
            queue,
            workers,
            shutdown,
            events,
            tasks: Mutex::new(tasks),
        })
    }

    /// Assign the next id to `draft` and queue it. Returns the id.
    ///
    /// Does not validate the draft; see [`submit`](Self::submit).
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun
    /// - [`SchedulerError::QueueFull`] if the queue is at capacity
    ///
    /// A rejected draft does not consume an id.
    pub async fn schedule(&self, draft: JobDraft) -> Result<u64> {
        let name = draft.name.clone();
        let priority = draft.priority;

        let id = match self.queue.write().await.admit(draft) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(job_name = %name, error = %e, "Job rejected");
                return Err(e);
            }
        };

        tracing::info!(job_id = id, job_name = %name, priority, "Job scheduled");
        Ok(id)
    }

    /// Validate `draft`, then [`schedule`](Self::schedule) it.
    pub async fn submit(&self, draft: JobDraft) -> Result<u64> {
        draft.validate()?;
        self.schedule(draft).await
    }

    /// Validate a transport-level request and schedule it with `action` as its body.
    pub async fn submit_request(&self, request: JobRequest, action: JobAction) -> Result<u64> {
        let draft = request.into_draft(action)?;
        self.schedule(draft).await
    }

    /// Status of every worker, in worker id order.
    pub async fn status(&self) -> Vec<WorkerStatus> {
        let mut statuses = Vec::with_capacity(self.workers.len());
        for worker in self.workers.iter() {
            statuses.push(worker.status().await);
        }
        statuses
    }

    /// Copy of every queued job, in the order they would be dispatched.
    pub async fn queued_jobs(&self) -> Vec<JobSummary> {
        self.queue.read().await.snapshot()
    }

    pub async fn queued_len(&self) -> usize {
        self.queue.read().await.len()
    }

    /// True when nothing is queued and every worker is idle.
    pub async fn is_drained(&self) -> bool {
        // Held while checking workers so an in-flight handoff is not missed.
        let queue = self.queue.read().await;
        if !queue.is_empty() {
            return false;
        }
        for worker in self.workers.iter() {
            if !worker.is_idle().await {
                return false;
            }
        }
        true
    }

    /// Receive dispatch and completion events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the scheduler.
    ///
    /// Closes the queue to new jobs, cancels every running job body, and waits
    /// up to `deadline` for the workers and the dispatcher to exit. Jobs still
    /// queued are dropped without running.
    ///
    /// Calling it again, or concurrently, waits on whatever activities are
    /// still running. Each call is bounded by its own `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutdownTimeout`] if some job body ignored
    /// cancellation past the deadline. Stuck activities keep running; use
    /// [`abort`](Self::abort) to stop them at their next await point.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        let deadline_at = Instant::now() + deadline;
        tracing::info!(deadline_ms = deadline.as_millis() as u64, "Shutting down scheduler");

        let dropped = {
            let mut queue = self.queue.write().await;
            queue.close();
            queue.clear()
        };
        if dropped > 0 {
            tracing::warn!(dropped, "Discarding queued jobs");
        }
        self.shutdown.cancel();

        // Waiting behind a concurrent shutdown or abort counts against the deadline.
        let joined = tokio::time::timeout_at(deadline_at, async {
            let mut tasks = self.tasks.lock().await;
            join_all(&mut tasks).await;
        })
        .await;

        match joined {
            Ok(()) => {
                tracing::info!("Scheduler shutdown finished");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Scheduler shutdown timed out"
                );
                Err(SchedulerError::ShutdownTimeout(deadline))
            }
        }
    }

    /// Abort every activity that is still running.
    ///
    /// Meant for use after [`shutdown`](Self::shutdown) timed out. A job body
    /// that never yields cannot be interrupted this way.
    pub async fn abort(&self) {
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        tracing::warn!(remaining = tasks.len(), "Aborting scheduler activities");
        tasks.abort_all();
        join_all(&mut tasks).await;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!(error = %e, "Scheduler activity panicked");
            }
        }
    }
}
