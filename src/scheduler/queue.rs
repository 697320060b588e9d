use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Result, SchedulerError};
use crate::scheduler::job::{Job, JobDraft, JobSummary};

const DEFAULT_MAX_JOBS: usize = 10_000;

/// Heap entry. Higher priority wins; equal priorities go to the lower id,
/// i.e. the job that was admitted first.
struct Entry(Job);

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority()
            .cmp(&other.0.priority())
            .then_with(|| other.0.id().cmp(&self.0.id()))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

/// Pending jobs ordered by descending priority, FIFO among equal priorities.
///
/// The queue also owns the job id counter so that id assignment and
/// insertion happen under the same lock.
pub struct JobQueue {
    heap: BinaryHeap<Entry>,
    last_id: u64,
    max_jobs: usize,
    closed: bool,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS)
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            last_id: 0,
            max_jobs,
            closed: false,
        }
    }

    /// Assign the next id to `draft` and queue it. Returns the id.
    ///
    /// Fails without consuming an id if the queue is closed or full.
    pub fn admit(&mut self, draft: JobDraft) -> Result<u64> {
        if self.closed {
            return Err(SchedulerError::ShuttingDown);
        }
        if self.is_full() {
            return Err(SchedulerError::QueueFull(self.max_jobs));
        }
        self.last_id += 1;
        let id = self.last_id;
        self.heap.push(Entry(Job::admit(id, draft)));
        Ok(id)
    }

    /// Put back a job that was popped but could not be handed off.
    /// Ignores capacity and the closed flag.
    pub fn push(&mut self, job: Job) {
        self.heap.push(Entry(job));
    }

    /// Remove and return a highest-priority job.
    pub fn pop(&mut self) -> Option<Job> {
        self.heap.pop().map(|entry| entry.0)
    }

    /// Iterate over queued jobs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.heap.iter().map(|entry| &entry.0)
    }

    /// Summaries of all queued jobs in the order they would be dispatched.
    pub fn snapshot(&self) -> Vec<JobSummary> {
        let mut entries: Vec<&Entry> = self.heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|entry| entry.0.summary()).collect()
    }

    /// Drop every queued job. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.heap.len();
        self.heap.clear();
        dropped
    }

    /// Stop admitting new jobs.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Id handed to the most recently admitted job, 0 if none.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.max_jobs
    }
}
