use crate::runtime::progress::BoundaryTracker;
use crate::scheduler::{PendingQueue, ScheduledTask};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Monotonic counters describing backfill progress, retries, and RPC health.
#[derive(Default, Debug)]
pub struct Telemetry {
    steps_completed: AtomicU64,
    chunks_already_indexed: AtomicU64,
    blocks_fetched: AtomicU64,
    fetch_errors: AtomicU64,
    bootstrap_polls: AtomicU64,
    tasks_dispatched: AtomicU64,
    tasks_done: AtomicU64,
    retries_now: AtomicU64,
    retries_delayed: AtomicU64,
    rpc_requests: AtomicU64,
    rpc_errors: AtomicU64,
    rpc_timeouts: AtomicU64,
}

impl Telemetry {
    pub fn record_step_completed(&self) {
        self.steps_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_already_indexed(&self) {
        self.chunks_already_indexed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocks_fetched(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.blocks_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bootstrap_poll(&self) {
        self.bootstrap_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_dispatched(&self) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_done(&self) {
        self.tasks_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_now(&self) {
        self.retries_now.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_delayed(&self) {
        self.retries_delayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_request(&self) {
        self.rpc_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_error(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_timeout(&self) {
        self.rpc_timeouts.fetch_add(1, Ordering::Relaxed);
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            steps_completed: self.steps_completed.load(Ordering::Relaxed),
            chunks_already_indexed: self.chunks_already_indexed.load(Ordering::Relaxed),
            blocks_fetched: self.blocks_fetched.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            bootstrap_polls: self.bootstrap_polls.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            tasks_done: self.tasks_done.load(Ordering::Relaxed),
            retries_now: self.retries_now.load(Ordering::Relaxed),
            retries_delayed: self.retries_delayed.load(Ordering::Relaxed),
            rpc_requests: self.rpc_requests.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            rpc_timeouts: self.rpc_timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn blocks_fetched(&self) -> u64 {
        self.blocks_fetched.load(Ordering::Relaxed)
    }

    pub fn rpc_errors(&self) -> u64 {
        self.rpc_errors.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub steps_completed: u64,
    pub chunks_already_indexed: u64,
    pub blocks_fetched: u64,
    pub fetch_errors: u64,
    pub bootstrap_polls: u64,
    pub tasks_dispatched: u64,
    pub tasks_done: u64,
    pub retries_now: u64,
    pub retries_delayed: u64,
    pub rpc_requests: u64,
    pub rpc_errors: u64,
    pub rpc_timeouts: u64,
}

/// Spawns a background task that periodically logs fetch throughput, the backfill boundary,
/// pending work, and retry/RPC error counts.
pub fn spawn_metrics_reporter<T: ScheduledTask>(
    telemetry: Arc<Telemetry>,
    queue: Arc<PendingQueue<T>>,
    boundary: Arc<BoundaryTracker>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "blockfill::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let fetched_delta = current
                        .blocks_fetched
                        .saturating_sub(last_snapshot.blocks_fetched);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        fetched_delta as f64 / elapsed
                    };

                    let pending = queue.len().await;
                    tracing::info!(
                        target: "blockfill::metrics",
                        throughput = format!("{throughput:.2}"),
                        boundary = ?boundary.current(),
                        pending,
                        steps = current.steps_completed,
                        blocks_fetched = current.blocks_fetched,
                        already_indexed = current.chunks_already_indexed,
                        retries_now = current.retries_now,
                        retries_delayed = current.retries_delayed,
                        rpc_requests = current.rpc_requests,
                        rpc_errors = current.rpc_errors,
                        rpc_timeouts = current.rpc_timeouts,
                        "backfill metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
