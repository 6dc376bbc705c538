//! Read-side collaborator that answers point queries about persisted state.

use super::range::{coalesce, BlockRange};
use anyhow::Result;
use futures::future::BoxFuture;

/// Read access to what the indexer has already persisted.
///
/// The engine never caches answers from this trait: every step re-reads it so concurrent
/// writes from the live indexer are always observed.
pub trait IndexedRangeInspector: Send + Sync + 'static {
    /// Returns `true` when every block in `range` is fully indexed.
    fn is_range_fully_indexed<'a>(&'a self, range: BlockRange) -> BoxFuture<'a, Result<bool>>;

    /// Earliest indexed block whose timestamp is at or after `timestamp_ms`, or `None` when no
    /// such block is persisted yet.
    fn earliest_indexed_block_at_or_after<'a>(
        &'a self,
        timestamp_ms: u64,
    ) -> BoxFuture<'a, Result<Option<u64>>>;

    /// Sub-ranges of `range` that are not fully indexed, sorted and coalesced.
    ///
    /// The default implementation bisects `range` with [`Self::is_range_fully_indexed`].
    /// Stores that can answer the question with a single query should override it.
    fn missing_ranges<'a>(&'a self, range: BlockRange) -> BoxFuture<'a, Result<Vec<BlockRange>>> {
        Box::pin(async move {
            let mut pending = vec![range];
            let mut missing = Vec::new();

            while let Some(candidate) = pending.pop() {
                if candidate.is_empty() || self.is_range_fully_indexed(candidate).await? {
                    continue;
                }

                match candidate.split_halves() {
                    Some((low, high)) => {
                        pending.push(high);
                        pending.push(low);
                    }
                    None => missing.push(candidate),
                }
            }

            Ok(coalesce(missing))
        })
    }
}
