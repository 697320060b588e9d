use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::scheduler::event::{JobOutcome, SchedulerEvent};
use crate::scheduler::job::{Job, JobSummary};

/// Runs the jobs handed to one worker, one at a time.
///
/// Each job body gets a child of the scheduler's shutdown token. The
/// executor never aborts a body; on shutdown it cancels the token and waits
/// for the body to return.
pub struct WorkerExecutor {
    id: usize,
    rx: mpsc::Receiver<Job>,
    current: Arc<RwLock<Option<JobSummary>>>,
    shutdown: CancellationToken,
    events: broadcast::Sender<SchedulerEvent>,
}

impl WorkerExecutor {
    pub(crate) fn new(
        id: usize,
        rx: mpsc::Receiver<Job>,
        current: Arc<RwLock<Option<JobSummary>>>,
        shutdown: CancellationToken,
        events: broadcast::Sender<SchedulerEvent>,
    ) -> Self {
        Self {
            id,
            rx,
            current,
            shutdown,
            events,
        }
    }

    /// Worker loop. Returns once shutdown is signalled and no job body is running.
    pub async fn run(mut self) {
        tracing::info!(worker_id = self.id, "Worker started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                job = self.rx.recv() => match job {
                    Some(job) => self.process(job).await,
                    None => {
                        tracing::debug!(worker_id = self.id, "Handoff channel closed");
                        break;
                    }
                },
            }
        }

        // A job claimed for this worker but not started yet is dropped.
        self.rx.close();
        while let Ok(job) = self.rx.try_recv() {
            tracing::warn!(
                worker_id = self.id,
                job_id = job.id(),
                job_name = job.name(),
                "Dropping job handed off during shutdown"
            );
        }
        *self.current.write().await = None;

        tracing::info!(worker_id = self.id, "Worker shutting down");
    }

    async fn process(&self, job: Job) {
        let summary = job.summary();
        tracing::info!(
            worker_id = self.id,
            job_id = summary.id,
            job_name = %summary.name,
            priority = summary.priority,
            "Processing job"
        );

        let cancel = self.shutdown.child_token();
        let started = Instant::now();

        // Run the body in its own task so a panic stays contained, including
        // one raised while the body builds its future. The body is aborted
        // along with this worker if the scheduler is aborted.
        let body_cancel = cancel.clone();
        let body = AbortOnDropHandle::new(tokio::spawn(async move {
            job.execute(body_cancel).await;
        }));
        let outcome = match body.await {
            Ok(()) if cancel.is_cancelled() => JobOutcome::Cancelled,
            Ok(()) => JobOutcome::Completed,
            Err(e) => {
                tracing::error!(
                    worker_id = self.id,
                    job_id = summary.id,
                    error = %e,
                    "Job body failed"
                );
                JobOutcome::Panicked
            }
        };
        let elapsed = started.elapsed();

        *self.current.write().await = None;

        match outcome {
            JobOutcome::Completed => tracing::info!(
                worker_id = self.id,
                job_id = summary.id,
                job_name = %summary.name,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job completed"
            ),
            JobOutcome::Cancelled => tracing::info!(
                worker_id = self.id,
                job_id = summary.id,
                job_name = %summary.name,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job cancelled"
            ),
            JobOutcome::Panicked => {}
        }

        // No subscribers is fine.
        let _ = self.events.send(SchedulerEvent::Finished {
            job: summary,
            worker_id: self.id,
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
            at: Utc::now(),
        });
    }
}
