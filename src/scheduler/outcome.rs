use super::queue::TaskSubmitter;
use futures::future::BoxFuture;
use std::fmt::Debug;
use std::time::Duration;

/// Result of executing one scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Drop the task. Any follow-up work was submitted by the executor.
    Done,
    /// Requeue the task, eligible on the next flush.
    RetryNow,
    /// Requeue the task, eligible once the delay has elapsed.
    RetryAfter(Duration),
    /// Stop the scheduler.
    Stop,
}

/// Task value buffered by the scheduler. Retries never mutate a task in place; they produce a
/// rescheduled copy.
pub trait ScheduledTask: Debug + Clone + Send + Sync + 'static {
    /// Epoch milliseconds before which the task must not be dispatched. Zero means immediately.
    fn not_before_ms(&self) -> u64;

    fn reschedule(&self, not_before_ms: u64) -> Self;
}

pub type TaskFuture<'a> = BoxFuture<'a, TaskOutcome>;

/// Runs dispatched tasks to completion.
pub trait TaskExecutor<T: ScheduledTask>: Send + Sync + 'static {
    fn execute<'a>(&'a self, task: T, submitter: &'a TaskSubmitter<T>) -> TaskFuture<'a>;
}

/// Why the scheduler loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A task returned [`TaskOutcome::Stop`].
    Completed,
    /// The shutdown token was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped(StopReason),
}
