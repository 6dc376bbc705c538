//! Backfill orchestration.
//!
//! `Backfiller` wires the pieces of one backward walk together:
//! - a `TaskScheduler` driving `WorkItem`s through a `BackfillExecutor`,
//! - the `BoundaryTracker` publishing how far down the walk has confirmed,
//! - `lifecycle` handles for the run-scoped cancellation token and metrics reporter.
//!
//! Each `start` begins from scratch with a fresh bootstrap probe; ground truth about what is
//! already indexed always comes from the inspector.

use super::lifecycle::{LifecycleHandles, LifecycleSpawnParams};
use crate::backfill::{
    BackfillExecutor, BlockSink, IndexedRangeInspector, RangeFetcher, WorkItem,
};
use crate::rpc::RpcRangeFetcher;
use crate::runtime::clock::EngineClock;
use crate::runtime::config::BackfillConfig;
use crate::runtime::progress::BoundaryTracker;
use crate::runtime::telemetry::Telemetry;
use crate::scheduler::{SchedulerConfig, SchedulerState, StopReason, TaskScheduler};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Backfiller<I, F> {
    config: BackfillConfig,
    inspector: Arc<I>,
    fetcher: Arc<F>,
    shutdown_root: CancellationToken,
    clock: EngineClock,
    boundary: Arc<BoundaryTracker>,
    telemetry: Arc<Telemetry>,
    state_tx: Arc<watch::Sender<SchedulerState>>,
    scheduler_handle: Option<JoinHandle<StopReason>>,
    lifecycle: Option<LifecycleHandles>,
    running: bool,
}

impl<I, F> Backfiller<I, F>
where
    I: IndexedRangeInspector,
    F: RangeFetcher,
{
    /// Creates a backfiller with its own root cancellation token. Use
    /// [`Self::with_cancellation_token`] to integrate with an existing shutdown mechanism.
    pub fn new(config: BackfillConfig, inspector: Arc<I>, fetcher: Arc<F>) -> Self {
        Self::with_cancellation_token(config, inspector, fetcher, CancellationToken::new())
    }

    pub fn with_cancellation_token(
        config: BackfillConfig,
        inspector: Arc<I>,
        fetcher: Arc<F>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self::assemble(
            config,
            inspector,
            fetcher,
            shutdown_token,
            Arc::new(Telemetry::default()),
        )
    }

    fn assemble(
        config: BackfillConfig,
        inspector: Arc<I>,
        fetcher: Arc<F>,
        shutdown_root: CancellationToken,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            config,
            inspector,
            fetcher,
            shutdown_root,
            clock: EngineClock::new(),
            boundary: Arc::new(BoundaryTracker::new()),
            telemetry,
            state_tx: Arc::new(state_tx),
            scheduler_handle: None,
            lifecycle: None,
            running: false,
        }
    }

    /// Replaces the wall clock used for the bootstrap reference time and retry gates.
    pub fn with_clock(mut self, clock: EngineClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    /// Lowest block confirmed so far, or `None` before the reference block is found.
    pub fn boundary(&self) -> Option<u64> {
        self.boundary.current()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Subscribes to scheduler lifecycle transitions across runs.
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Why the most recent run ended, if one has ended.
    pub fn last_stop_reason(&self) -> Option<StopReason> {
        match *self.state_tx.borrow() {
            SchedulerState::Stopped(reason) => Some(reason),
            SchedulerState::Idle | SchedulerState::Running => None,
        }
    }

    /// Replaces the root shutdown token. Must only be called while idle.
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        debug_assert!(
            !self.running,
            "shutdown token should not change while the backfiller is running"
        );
        self.shutdown_root = shutdown;
    }

    /// Starts a new backward walk, bootstrapping from the current wall-clock time.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            bail!("backfiller already running");
        }

        debug_assert!(
            self.config.validate().is_ok(),
            "BackfillConfig should have been validated at construction time"
        );

        self.boundary.reset();
        let executor = Arc::new(BackfillExecutor::new(
            &self.config,
            self.inspector.clone(),
            self.fetcher.clone(),
            self.boundary.clone(),
            self.telemetry.clone(),
        ));
        let scheduler = TaskScheduler::new(
            SchedulerConfig::from_config(&self.config),
            executor,
            self.clock,
            self.telemetry.clone(),
        )
        .with_state_channel(self.state_tx.clone());

        let reference_timestamp = self.clock.now_ms();
        scheduler
            .submitter()
            .submit(WorkItem::bootstrap(reference_timestamp))
            .await;

        let lifecycle = LifecycleHandles::spawn(LifecycleSpawnParams {
            shutdown_root: &self.shutdown_root,
            telemetry: self.telemetry.clone(),
            queue: scheduler.queue(),
            boundary: self.boundary.clone(),
            metrics_interval: self.config.metrics_interval(),
        });

        tracing::info!(
            reference_timestamp,
            first_block = self.config.first_block(),
            chunk_size = self.config.chunk_size(),
            backfill_depth = ?self.config.backfill_depth(),
            max_concurrency = self.config.max_concurrency(),
            "starting backfill"
        );

        self.scheduler_handle = Some(tokio::spawn(scheduler.run(lifecycle.run_token.clone())));
        self.lifecycle = Some(lifecycle);
        self.running = true;
        Ok(())
    }

    /// Waits for the current run to finish, either because the boundary reached `first_block`
    /// or because the run was cancelled.
    pub async fn wait(&mut self) -> Result<StopReason> {
        let handle = self
            .scheduler_handle
            .as_mut()
            .context("backfiller is not running")?;
        let joined = handle.await;
        self.scheduler_handle = None;
        self.running = false;

        if let Some(lifecycle) = self.lifecycle.take() {
            lifecycle.shutdown().await;
        }

        let reason = joined.context("backfill scheduler task failed")?;
        tracing::info!(
            reason = ?reason,
            boundary = ?self.boundary.current(),
            "backfill run finished"
        );
        Ok(reason)
    }

    /// Cancels the current run and drains in-flight work.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        tracing::info!("stopping backfiller");
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.run_token.cancel();
        }
        self.wait().await.map(|_| ())
    }
}

impl<I, S> Backfiller<I, RpcRangeFetcher<S>>
where
    I: IndexedRangeInspector,
    S: BlockSink,
{
    /// Builds a backfiller that fetches missing ranges over JSON-RPC and persists them through
    /// `sink`. RPC counters land in the backfiller's telemetry.
    pub fn with_rpc(config: BackfillConfig, inspector: Arc<I>, sink: Arc<S>) -> Result<Self> {
        let telemetry = Arc::new(Telemetry::default());
        let fetcher = RpcRangeFetcher::from_config(&config, sink, telemetry.clone())?;
        Ok(Self::assemble(
            config,
            inspector,
            Arc::new(fetcher),
            CancellationToken::new(),
            telemetry,
        ))
    }
}
