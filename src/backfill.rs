//! Backward-walking backfill engine: block ranges, work items, the indexed-state and fetcher
//! seams, gap discovery, and the executor that drives steps through the scheduler.

pub mod discovery;
pub mod executor;
pub mod fetcher;
pub mod inspector;
pub mod item;
pub mod range;

#[cfg(test)]
pub(crate) mod test_support;

pub use discovery::{DiscoveryError, DiscoveryWorker};
pub use executor::BackfillExecutor;
pub use fetcher::{BlockSink, FetchError, RangeFetcher, RawBlock};
pub use inspector::IndexedRangeInspector;
pub use item::WorkItem;
pub use range::{coalesce, BlockRange};
