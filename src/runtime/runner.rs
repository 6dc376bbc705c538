use crate::backfill::{BlockSink, IndexedRangeInspector, RangeFetcher};
use crate::processor::Backfiller;
use crate::rpc::RpcRangeFetcher;
use crate::runtime::config::BackfillConfig;
use crate::scheduler::StopReason;
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Drives a [`Backfiller`] to completion and handles OS signals for graceful shutdowns.
pub struct Runner<I, F> {
    backfiller: Backfiller<I, F>,
    shutdown: CancellationToken,
    started: bool,
}

impl<I, F> Runner<I, F>
where
    I: IndexedRangeInspector,
    F: RangeFetcher,
{
    /// Creates a new runner and wires a root [`CancellationToken`] through the backfiller.
    pub fn new(config: BackfillConfig, inspector: Arc<I>, fetcher: Arc<F>) -> Self {
        let shutdown = CancellationToken::new();
        let backfiller =
            Backfiller::with_cancellation_token(config, inspector, fetcher, shutdown.clone());
        Self {
            backfiller,
            shutdown,
            started: false,
        }
    }

    /// Wraps an existing backfiller, adopting a fresh root token.
    pub fn from_backfiller(mut backfiller: Backfiller<I, F>) -> Self {
        let shutdown = CancellationToken::new();
        backfiller.replace_shutdown_root(shutdown.clone());
        Self {
            backfiller,
            shutdown,
            started: false,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn backfiller(&self) -> &Backfiller<I, F> {
        &self.backfiller
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.backfiller.start().await?;
        self.started = true;
        Ok(())
    }

    /// Cancels the root token and waits for in-flight work to drain.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.shutdown.cancel();
        self.backfiller.stop().await?;
        self.started = false;
        self.reinitialize_shutdown_token();
        Ok(())
    }

    /// Runs until the backfill completes, a Ctrl-C (SIGINT) is received, or the shutdown token
    /// is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<StopReason> {
        self.start().await?;
        tracing::info!("runner started; waiting for backfill completion or Ctrl-C (SIGINT)");

        let finished = tokio::select! {
            result = self.backfiller.wait() => Some(result?),
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
                None
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
                None
            }
        };

        let reason = match finished {
            Some(reason) => reason,
            None => {
                self.shutdown.cancel();
                self.backfiller.stop().await?;
                self.backfiller
                    .last_stop_reason()
                    .unwrap_or(StopReason::Cancelled)
            }
        };

        self.started = false;
        self.reinitialize_shutdown_token();
        Ok(reason)
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.backfiller.replace_shutdown_root(self.shutdown.clone());
    }
}

impl<I, S> Runner<I, RpcRangeFetcher<S>>
where
    I: IndexedRangeInspector,
    S: BlockSink,
{
    pub fn with_rpc(config: BackfillConfig, inspector: Arc<I>, sink: Arc<S>) -> Result<Self> {
        Ok(Self::from_backfiller(Backfiller::with_rpc(
            config, inspector, sink,
        )?))
    }
}
