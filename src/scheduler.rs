//! Generic flush-driven task scheduler: pending queue, retry outcomes, and the
//! bounded-concurrency dispatch loop.

pub mod outcome;
pub mod queue;
pub mod task_scheduler;

pub use outcome::{
    ScheduledTask, SchedulerState, StopReason, TaskExecutor, TaskFuture, TaskOutcome,
};
pub use queue::{PendingQueue, TaskSubmitter};
pub use task_scheduler::{SchedulerConfig, TaskScheduler};
