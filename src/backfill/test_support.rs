use super::fetcher::{FetchError, RangeFetcher};
use super::inspector::IndexedRangeInspector;
use super::range::{coalesce, BlockRange};
use crate::runtime::config::{BackfillConfig, BackfillConfigBuilder};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::Mutex;

pub(crate) const BLOCK_TIME_MS: u64 = 1_000;

pub(crate) fn base_config() -> BackfillConfigBuilder {
    BackfillConfig::builder()
        .rpc_url("http://localhost:8545")
        .chunk_size(10)
        .first_block(0)
}

#[derive(Default)]
struct FakeState {
    indexed: BTreeSet<u64>,
    hidden: Vec<BlockRange>,
    fetches: Vec<BlockRange>,
    failing_fetches: usize,
    failing_reads: usize,
    hide_writes: bool,
}

/// In-memory store acting as both inspector and fetcher. Block `n` carries timestamp
/// `n * BLOCK_TIME_MS`.
#[derive(Default)]
pub(crate) struct FakeChainStore {
    state: Mutex<FakeState>,
}

impl FakeChainStore {
    pub(crate) fn with_indexed(blocks: impl IntoIterator<Item = u64>) -> Self {
        let store = Self::default();
        store.lock().indexed.extend(blocks);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake store mutex poisoned")
    }

    pub(crate) fn fetches(&self) -> Vec<BlockRange> {
        self.lock().fetches.clone()
    }

    pub(crate) fn fail_next_fetches(&self, count: usize) {
        self.lock().failing_fetches = count;
    }

    pub(crate) fn fail_next_reads(&self, count: usize) {
        self.lock().failing_reads = count;
    }

    pub(crate) fn hide_writes(&self, hide: bool) {
        let mut state = self.lock();
        state.hide_writes = hide;
        if !hide {
            let hidden = std::mem::take(&mut state.hidden);
            for range in hidden {
                state.indexed.extend(range.start..range.end);
            }
        }
    }

    fn check_read(&self) -> Result<()> {
        let mut state = self.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(anyhow!("store unavailable"));
        }
        Ok(())
    }
}

impl IndexedRangeInspector for FakeChainStore {
    fn is_range_fully_indexed<'a>(&'a self, range: BlockRange) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.check_read()?;
            let state = self.lock();
            Ok((range.start..range.end).all(|block| state.indexed.contains(&block)))
        })
    }

    fn earliest_indexed_block_at_or_after<'a>(
        &'a self,
        timestamp_ms: u64,
    ) -> BoxFuture<'a, Result<Option<u64>>> {
        Box::pin(async move {
            self.check_read()?;
            let first = timestamp_ms.div_ceil(BLOCK_TIME_MS);
            Ok(self.lock().indexed.range(first..).next().copied())
        })
    }

    fn missing_ranges<'a>(&'a self, range: BlockRange) -> BoxFuture<'a, Result<Vec<BlockRange>>> {
        Box::pin(async move {
            self.check_read()?;
            let state = self.lock();
            let missing = (range.start..range.end)
                .filter(|block| !state.indexed.contains(block))
                .map(|block| BlockRange::new(block, block + 1))
                .collect();
            Ok(coalesce(missing))
        })
    }
}

impl RangeFetcher for FakeChainStore {
    fn fetch_and_persist<'a>(&'a self, range: BlockRange) -> BoxFuture<'a, Result<(), FetchError>> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.failing_fetches > 0 {
                state.failing_fetches -= 1;
                return Err(FetchError::rpc(range, anyhow!("connection refused")));
            }
            state.fetches.push(range);
            if state.hide_writes {
                state.hidden.push(range);
            } else {
                state.indexed.extend(range.start..range.end);
            }
            Ok(())
        })
    }
}
