use super::outcome::{
    ScheduledTask, SchedulerState, StopReason, TaskExecutor, TaskOutcome,
};
use super::queue::{PendingQueue, TaskSubmitter};
use crate::runtime::clock::EngineClock;
use crate::runtime::config::BackfillConfig;
use crate::runtime::telemetry::Telemetry;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub flush_interval: Duration,
    pub max_concurrency: usize,
}

impl SchedulerConfig {
    pub fn from_config(config: &BackfillConfig) -> Self {
        Self {
            flush_interval: config.flush_interval(),
            max_concurrency: config.max_concurrency(),
        }
    }
}

/// Periodically flushed work queue with bounded concurrency and explicit retry outcomes.
///
/// Every flush dispatches the eligible pending tasks (oldest first) into free worker slots.
/// Each dispatched task runs to completion before its [`TaskOutcome`] is applied; non-`Done`
/// outcomes always requeue the task unless the scheduler is told to stop.
pub struct TaskScheduler<T: ScheduledTask, E: TaskExecutor<T>> {
    config: SchedulerConfig,
    queue: Arc<PendingQueue<T>>,
    executor: Arc<E>,
    clock: EngineClock,
    telemetry: Arc<Telemetry>,
    state_tx: Arc<watch::Sender<SchedulerState>>,
}

impl<T: ScheduledTask, E: TaskExecutor<T>> TaskScheduler<T, E> {
    pub fn new(
        config: SchedulerConfig,
        executor: Arc<E>,
        clock: EngineClock,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            config,
            queue: Arc::new(PendingQueue::new()),
            executor,
            clock,
            telemetry,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Publishes lifecycle transitions on an existing channel so subscribers outlive one run.
    pub fn with_state_channel(mut self, state_tx: Arc<watch::Sender<SchedulerState>>) -> Self {
        self.state_tx = state_tx;
        self
    }

    pub fn submitter(&self) -> TaskSubmitter<T> {
        TaskSubmitter::new(self.queue.clone())
    }

    pub fn queue(&self) -> Arc<PendingQueue<T>> {
        self.queue.clone()
    }

    /// Subscribes to lifecycle transitions. The final value is always `Stopped`.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Runs the flush loop until a task returns [`TaskOutcome::Stop`] or `shutdown` fires, then
    /// drains in-flight work without dispatching anything new.
    pub async fn run(self, shutdown: CancellationToken) -> StopReason {
        let max_concurrency = self.config.max_concurrency.max(1);
        let submitter = self.submitter();
        let mut in_flight: JoinSet<(T, TaskOutcome)> = JoinSet::new();
        let flush_interval = self.config.flush_interval.max(MIN_FLUSH_INTERVAL);
        let mut ticker = time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.state_tx.send_replace(SchedulerState::Running);
        tracing::info!(
            max_concurrency,
            flush_interval_ms = flush_interval.as_millis() as u64,
            "task scheduler started"
        );

        let reason = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    break StopReason::Cancelled;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if self.settle(joined).await {
                        break StopReason::Completed;
                    }
                }
                _ = ticker.tick() => {
                    self.dispatch(&mut in_flight, &submitter, max_concurrency).await;
                }
            }
        };

        let draining = in_flight.len();
        if draining > 0 {
            tracing::info!(in_flight = draining, "draining in-flight tasks");
        }
        while let Some(joined) = in_flight.join_next().await {
            self.settle(joined).await;
        }

        self.state_tx.send_replace(SchedulerState::Stopped(reason));
        let pending = self.queue.len().await;
        tracing::info!(
            reason = ?reason,
            pending,
            "task scheduler stopped"
        );
        reason
    }

    async fn dispatch(
        &self,
        in_flight: &mut JoinSet<(T, TaskOutcome)>,
        submitter: &TaskSubmitter<T>,
        max_concurrency: usize,
    ) {
        let capacity = max_concurrency.saturating_sub(in_flight.len());
        let ready = self.queue.take_eligible(self.clock.now_ms(), capacity).await;

        for task in ready {
            let executor = Arc::clone(&self.executor);
            let submitter = submitter.clone();
            self.telemetry.record_task_dispatched();
            tracing::trace!(task = ?task, "dispatching task");

            in_flight.spawn(async move {
                let outcome = AssertUnwindSafe(executor.execute(task.clone(), &submitter))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        tracing::error!(
                            task = ?task,
                            panic = %panic_message(payload.as_ref()),
                            "scheduled task panicked; requeueing"
                        );
                        TaskOutcome::RetryNow
                    });
                (task, outcome)
            });
        }
    }

    /// Applies a finished task's outcome. Returns `true` when the scheduler must stop.
    async fn settle(&self, joined: Result<(T, TaskOutcome), JoinError>) -> bool {
        let (task, outcome) = match joined {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "scheduled task was aborted");
                return false;
            }
        };

        match outcome {
            TaskOutcome::Done => {
                self.telemetry.record_task_done();
                false
            }
            TaskOutcome::RetryNow => {
                self.telemetry.record_retry_now();
                self.queue.push(task.reschedule(self.clock.now_ms())).await;
                false
            }
            TaskOutcome::RetryAfter(delay) => {
                self.telemetry.record_retry_delayed();
                let delay_ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
                let not_before = self.clock.now_ms().saturating_add(delay_ms);
                self.queue.push(task.reschedule(not_before)).await;
                false
            }
            TaskOutcome::Stop => true,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
