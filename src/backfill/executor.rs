use super::discovery::DiscoveryWorker;
use super::fetcher::RangeFetcher;
use super::inspector::IndexedRangeInspector;
use super::item::WorkItem;
use crate::runtime::config::BackfillConfig;
use crate::runtime::progress::BoundaryTracker;
use crate::runtime::telemetry::Telemetry;
use crate::scheduler::{TaskExecutor, TaskFuture, TaskOutcome, TaskSubmitter};
use std::sync::Arc;
use std::time::Duration;

/// Resolves backfill work items: the bootstrap probe and backward steps.
pub struct BackfillExecutor<I, F> {
    discovery: DiscoveryWorker<I, F>,
    inspector: Arc<I>,
    boundary: Arc<BoundaryTracker>,
    recheck_interval: Duration,
    telemetry: Arc<Telemetry>,
}

impl<I, F> BackfillExecutor<I, F>
where
    I: IndexedRangeInspector,
    F: RangeFetcher,
{
    pub fn new(
        config: &BackfillConfig,
        inspector: Arc<I>,
        fetcher: Arc<F>,
        boundary: Arc<BoundaryTracker>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            discovery: DiscoveryWorker::new(config, inspector.clone(), fetcher, telemetry.clone()),
            inspector,
            boundary,
            recheck_interval: config.recheck_interval(),
            telemetry,
        }
    }

    async fn bootstrap(
        &self,
        reference_timestamp: u64,
        submitter: &TaskSubmitter<WorkItem>,
    ) -> TaskOutcome {
        self.telemetry.record_bootstrap_poll();

        let reference_block = match self
            .inspector
            .earliest_indexed_block_at_or_after(reference_timestamp)
            .await
        {
            Ok(Some(block)) => block,
            Ok(None) => {
                tracing::debug!(reference_timestamp, "reference block not indexed yet");
                return TaskOutcome::RetryNow;
            }
            Err(err) => {
                tracing::warn!(
                    reference_timestamp,
                    error = %format!("{err:#}"),
                    "failed to look up reference block"
                );
                return TaskOutcome::RetryNow;
            }
        };

        let first_block = self.discovery.first_block();
        self.boundary.mark(reference_block.max(first_block));
        if reference_block <= first_block {
            tracing::info!(
                reference_block,
                first_block,
                "reference block is at or below first block; nothing to backfill"
            );
            return TaskOutcome::Stop;
        }

        tracing::info!(
            reference_block,
            first_block,
            "reference block indexed; starting backward walk"
        );
        submitter.submit(WorkItem::step(reference_block)).await;
        TaskOutcome::Done
    }

    async fn step(
        &self,
        end_block_exclusive: u64,
        submitter: &TaskSubmitter<WorkItem>,
    ) -> TaskOutcome {
        match self.discovery.discover(end_block_exclusive).await {
            Ok(boundary) => {
                self.boundary.mark(boundary);
                self.telemetry.record_step_completed();

                let first_block = self.discovery.first_block();
                if boundary <= first_block {
                    tracing::info!(boundary, first_block, "backfill reached first block");
                    return TaskOutcome::Stop;
                }

                tracing::debug!(boundary, "backfill step complete");
                submitter.submit(WorkItem::step(boundary)).await;
                TaskOutcome::Done
            }
            Err(err) => {
                let range = err.range();
                let outcome = err.retry_outcome(self.recheck_interval);
                tracing::warn!(
                    start_block = range.start,
                    end_block = range.end,
                    retry = ?outcome,
                    error = %err,
                    "backfill step failed"
                );
                outcome
            }
        }
    }
}

impl<I, F> TaskExecutor<WorkItem> for BackfillExecutor<I, F>
where
    I: IndexedRangeInspector,
    F: RangeFetcher,
{
    fn execute<'a>(
        &'a self,
        task: WorkItem,
        submitter: &'a TaskSubmitter<WorkItem>,
    ) -> TaskFuture<'a> {
        Box::pin(async move {
            match task {
                WorkItem::WaitForReferenceBlock {
                    reference_timestamp,
                } => self.bootstrap(reference_timestamp, submitter).await,
                WorkItem::BackfillStep {
                    end_block_exclusive,
                    ..
                } => self.step(end_block_exclusive, submitter).await,
            }
        })
    }
}
