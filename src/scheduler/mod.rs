pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod job;
pub mod queue;

pub use dispatcher::Dispatcher;
pub use engine::Scheduler;
pub use event::{JobOutcome, SchedulerEvent};
pub use job::{
    action, sleep_action, Job, JobAction, JobDraft, JobFuture, JobRequest, JobSummary,
    MAX_PRIORITY, MIN_PRIORITY,
};
pub use queue::JobQueue;
