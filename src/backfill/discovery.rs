//! Gap discovery: turns a step's `end_block_exclusive` into a new, lower boundary.
//!
//! Each call inspects one candidate range that ends exactly at the previous boundary, fetches
//! only the sub-ranges the store reports as missing, and re-reads the store before claiming
//! progress. Fetch success alone never moves the boundary.

use super::fetcher::{FetchError, RangeFetcher};
use super::inspector::IndexedRangeInspector;
use super::range::BlockRange;
use crate::runtime::config::BackfillConfig;
use crate::runtime::telemetry::Telemetry;
use crate::scheduler::outcome::TaskOutcome;
use anyhow::Error as AnyError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a step could not claim progress. Every variant is recoverable.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Fetching succeeded but the store still reports gaps; retried after the recheck interval.
    NotIndexedBlocks { range: BlockRange },
    /// Fetching a missing sub-range failed; retried immediately.
    DiscoverBlocks { range: BlockRange, source: FetchError },
    /// The store could not be read; retried immediately.
    Inspect { range: BlockRange, source: AnyError },
}

impl DiscoveryError {
    pub fn range(&self) -> BlockRange {
        match self {
            DiscoveryError::NotIndexedBlocks { range }
            | DiscoveryError::DiscoverBlocks { range, .. }
            | DiscoveryError::Inspect { range, .. } => *range,
        }
    }

    /// Scheduler outcome for the step that produced this error.
    pub fn retry_outcome(&self, recheck_interval: Duration) -> TaskOutcome {
        match self {
            DiscoveryError::NotIndexedBlocks { .. } => TaskOutcome::RetryAfter(recheck_interval),
            DiscoveryError::DiscoverBlocks { .. } | DiscoveryError::Inspect { .. } => {
                TaskOutcome::RetryNow
            }
        }
    }
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NotIndexedBlocks { range } => {
                write!(f, "blocks {range} are still not indexed after fetching")
            }
            DiscoveryError::DiscoverBlocks { range, source } => {
                write!(f, "failed to discover blocks in {range}: {source}")
            }
            DiscoveryError::Inspect { range, source } => {
                write!(f, "failed to inspect indexed state of {range}: {source:#}")
            }
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::NotIndexedBlocks { .. } => None,
            DiscoveryError::DiscoverBlocks { source, .. } => Some(source),
            DiscoveryError::Inspect { source, .. } => Some(source.as_ref()),
        }
    }
}

pub struct DiscoveryWorker<I, F> {
    inspector: Arc<I>,
    fetcher: Arc<F>,
    first_block: u64,
    step_span: u64,
    telemetry: Arc<Telemetry>,
}

impl<I, F> DiscoveryWorker<I, F>
where
    I: IndexedRangeInspector,
    F: RangeFetcher,
{
    pub fn new(
        config: &BackfillConfig,
        inspector: Arc<I>,
        fetcher: Arc<F>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            inspector,
            fetcher,
            first_block: config.first_block(),
            step_span: config.step_span(),
            telemetry,
        }
    }

    pub fn first_block(&self) -> u64 {
        self.first_block
    }

    /// Range inspected by a step ending at `end_block_exclusive`, or `None` once the cursor is
    /// at or below the first block.
    pub fn candidate_range(&self, end_block_exclusive: u64) -> Option<BlockRange> {
        if end_block_exclusive <= self.first_block {
            return None;
        }

        let start = end_block_exclusive
            .saturating_sub(self.step_span)
            .max(self.first_block);
        Some(BlockRange::new(start, end_block_exclusive))
    }

    /// Resolves one step and returns the new boundary.
    pub async fn discover(&self, end_block_exclusive: u64) -> Result<u64, DiscoveryError> {
        let Some(range) = self.candidate_range(end_block_exclusive) else {
            return Ok(end_block_exclusive);
        };

        let missing = self
            .inspector
            .missing_ranges(range)
            .await
            .map_err(|source| DiscoveryError::Inspect { range, source })?;

        if missing.is_empty() {
            tracing::debug!(
                start_block = range.start,
                end_block = range.end,
                "range already indexed; skipping fetch"
            );
            self.telemetry.record_chunk_already_indexed();
            return Ok(range.start);
        }

        for gap in &missing {
            tracing::debug!(
                start_block = gap.start,
                end_block = gap.end,
                "fetching missing blocks"
            );
            if let Err(source) = self.fetcher.fetch_and_persist(*gap).await {
                self.telemetry.record_fetch_error();
                return Err(DiscoveryError::DiscoverBlocks { range, source });
            }
            self.telemetry.record_blocks_fetched(gap.len());
        }

        let complete = self
            .inspector
            .is_range_fully_indexed(range)
            .await
            .map_err(|source| DiscoveryError::Inspect { range, source })?;
        if !complete {
            return Err(DiscoveryError::NotIndexedBlocks { range });
        }

        Ok(range.start)
    }
}
