//! Run-scoped background tasks owned by a running `Backfiller`.

use crate::backfill::WorkItem;
use crate::runtime::progress::BoundaryTracker;
use crate::runtime::telemetry::{self, Telemetry};
use crate::scheduler::PendingQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct LifecycleHandles {
    pub run_token: CancellationToken,
    metrics_handle: Option<JoinHandle<()>>,
}

pub(crate) struct LifecycleSpawnParams<'a> {
    pub shutdown_root: &'a CancellationToken,
    pub telemetry: Arc<Telemetry>,
    pub queue: Arc<PendingQueue<WorkItem>>,
    pub boundary: Arc<BoundaryTracker>,
    pub metrics_interval: Duration,
}

impl LifecycleHandles {
    /// Derives the per-run token from `shutdown_root` and starts the metrics reporter on it.
    pub(crate) fn spawn(params: LifecycleSpawnParams<'_>) -> Self {
        let LifecycleSpawnParams {
            shutdown_root,
            telemetry,
            queue,
            boundary,
            metrics_interval,
        } = params;

        let run_token = shutdown_root.child_token();
        let metrics_handle = telemetry::spawn_metrics_reporter(
            telemetry,
            queue,
            boundary,
            run_token.clone(),
            metrics_interval,
        );

        Self {
            run_token,
            metrics_handle: Some(metrics_handle),
        }
    }

    pub(crate) async fn shutdown(mut self) {
        self.run_token.cancel();
        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }
    }
}
