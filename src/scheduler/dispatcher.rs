use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::scheduler::event::SchedulerEvent;
use crate::scheduler::queue::JobQueue;
use crate::worker::WorkerHandle;

/// Matches queued jobs to idle workers on a fixed interval.
///
/// Policy: every tick scans the workers in id order and gives each idle one
/// the highest-priority queued job, so a tick dispatches up to
/// `min(idle workers, queued jobs)` jobs. The dispatcher is not woken by
/// submissions or completions; dispatch latency is at most one interval.
pub struct Dispatcher {
    queue: Arc<RwLock<JobQueue>>,
    workers: Arc<[WorkerHandle]>,
    interval: Duration,
    shutdown: CancellationToken,
    events: broadcast::Sender<SchedulerEvent>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<RwLock<JobQueue>>,
        workers: Arc<[WorkerHandle]>,
        interval: Duration,
        shutdown: CancellationToken,
        events: broadcast::Sender<SchedulerEvent>,
    ) -> Self {
        Self {
            queue,
            workers,
            interval,
            shutdown,
            events,
        }
    }

    pub async fn run(self) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            workers = self.workers.len(),
            "Dispatcher started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Dispatcher shutting down");
    }

    /// Run one dispatch pass. Returns the number of jobs handed off.
    ///
    /// The queue lock is held from each pop until the handoff settles, so a
    /// reader holding the queue lock never misses a job that is between the
    /// queue and a worker. A job that cannot be handed off goes back into the
    /// queue, or is dropped once the queue is closed.
    pub async fn tick(&self) -> usize {
        let mut dispatched = 0;

        for worker in self.workers.iter() {
            if self.shutdown.is_cancelled() {
                break;
            }
            if !worker.is_idle().await {
                continue;
            }

            let mut queue = self.queue.write().await;
            let Some(job) = queue.pop() else {
                break;
            };

            match worker.try_assign(job).await {
                Ok(summary) => {
                    drop(queue);
                    dispatched += 1;
                    tracing::info!(
                        job_id = summary.id,
                        job_name = %summary.name,
                        priority = summary.priority,
                        worker_id = worker.id(),
                        "Job dispatched"
                    );
                    let _ = self.events.send(SchedulerEvent::Dispatched {
                        job: summary,
                        worker_id: worker.id(),
                        at: Utc::now(),
                    });
                }
                Err(job) if queue.is_closed() => {
                    tracing::warn!(
                        job_id = job.id(),
                        job_name = job.name(),
                        "Dropping job refused during shutdown"
                    );
                }
                Err(job) => {
                    tracing::debug!(
                        job_id = job.id(),
                        worker_id = worker.id(),
                        "Handoff refused, returning job to queue"
                    );
                    queue.push(job);
                }
            }
        }

        dispatched
    }
}
