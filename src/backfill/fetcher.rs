//! Write-side collaborators: fetching raw chain data for a range and persisting it.

use super::range::BlockRange;
use anyhow::{Error as AnyError, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;

/// Failure reported by a [`RangeFetcher`]. Both variants are transient from the engine's point
/// of view and lead to an immediate retry of the same step.
#[derive(Debug)]
pub enum FetchError {
    /// The chain data could not be retrieved (transport error, timeout, malformed response).
    Rpc { range: BlockRange, source: AnyError },
    /// Data was retrieved but persisting derived records failed.
    PartialFailure { range: BlockRange, source: AnyError },
}

impl FetchError {
    pub fn rpc(range: BlockRange, source: AnyError) -> Self {
        FetchError::Rpc { range, source }
    }

    pub fn partial(range: BlockRange, source: AnyError) -> Self {
        FetchError::PartialFailure { range, source }
    }

    pub fn range(&self) -> BlockRange {
        match self {
            FetchError::Rpc { range, .. } | FetchError::PartialFailure { range, .. } => *range,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Rpc { range, source } => {
                write!(f, "failed to fetch blocks {range}: {source:#}")
            }
            FetchError::PartialFailure { range, source } => {
                write!(f, "failed to persist blocks {range}: {source:#}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Rpc { source, .. } | FetchError::PartialFailure { source, .. } => {
                Some(source.as_ref())
            }
        }
    }
}

/// Fetches raw data for a block range and persists derived records.
///
/// Implementations should make a successful call visible to the
/// [`IndexedRangeInspector`](super::inspector::IndexedRangeInspector) as a whole: either the
/// full range reads back as indexed or none of it does.
pub trait RangeFetcher: Send + Sync + 'static {
    fn fetch_and_persist<'a>(&'a self, range: BlockRange) -> BoxFuture<'a, Result<(), FetchError>>;
}

/// Block payload as returned by the node, with the two fields the engine reads parsed out.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub number: u64,
    pub timestamp_ms: u64,
    pub payload: Value,
}

/// Persistence collaborator fed by [`RpcRangeFetcher`](crate::rpc::RpcRangeFetcher).
pub trait BlockSink: Send + Sync + 'static {
    /// Persists every block of `range` in one unit. `blocks` is sorted by number and covers the
    /// range exactly.
    fn persist_blocks<'a>(
        &'a self,
        range: BlockRange,
        blocks: Vec<RawBlock>,
    ) -> BoxFuture<'a, Result<()>>;
}
