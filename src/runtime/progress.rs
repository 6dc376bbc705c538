use std::sync::atomic::{AtomicU64, Ordering};

const UNINITIALIZED: u64 = u64::MAX;

/// Publishes the backfill boundary: the lowest block from which every block up to the
/// reference block is confirmed indexed.
///
/// The boundary only moves down. Attempts to raise it are ignored.
#[derive(Debug)]
pub struct BoundaryTracker {
    boundary: AtomicU64,
}

impl BoundaryTracker {
    pub fn new() -> Self {
        Self {
            boundary: AtomicU64::new(UNINITIALIZED),
        }
    }

    /// Records `block` as the new boundary. Returns `false` when it would move the boundary up.
    pub fn mark(&self, block: u64) -> bool {
        let previous = self.boundary.fetch_min(block, Ordering::SeqCst);
        if previous != UNINITIALIZED && block > previous {
            tracing::warn!(
                boundary = previous,
                rejected = block,
                "ignoring attempt to move backfill boundary forward"
            );
            return false;
        }
        true
    }

    pub fn current(&self) -> Option<u64> {
        match self.boundary.load(Ordering::SeqCst) {
            UNINITIALIZED => None,
            value => Some(value),
        }
    }

    /// Whether the boundary has been pushed down to `first_block`.
    pub fn reached(&self, first_block: u64) -> bool {
        self.current().is_some_and(|boundary| boundary <= first_block)
    }

    pub fn reset(&self) {
        self.boundary.store(UNINITIALIZED, Ordering::SeqCst);
    }
}

impl Default for BoundaryTracker {
    fn default() -> Self {
        Self::new()
    }
}
