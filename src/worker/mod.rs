//! Workers: the pool members that run job bodies.
//!
//! Each worker is split in two halves:
//!
//! - [`WorkerHandle`]: kept by the scheduler. Owns the single-slot handoff
//!   channel and the worker's `current` job, and answers status reads.
//! - [`WorkerExecutor`]: spawned as its own task. Receives jobs from the
//!   channel and runs them to completion or cancellation.
//!
//! # Lifecycle of a job on a worker
//!
//! 1. The dispatcher calls [`WorkerHandle::try_assign`]; the worker becomes busy
//! 2. The executor receives the job and runs its body with a cancellation token
//! 3. The body returns (finished or cancelled); `current` is cleared
//! 4. A [`Finished`](crate::scheduler::SchedulerEvent::Finished) event is published
//!
//! A busy worker never accepts a second job: `try_assign` refuses while
//! `current` is set.

pub mod executor;
pub mod handle;

pub use executor::WorkerExecutor;
pub use handle::{WorkerHandle, WorkerStatus};
