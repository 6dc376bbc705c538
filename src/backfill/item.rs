use crate::scheduler::outcome::ScheduledTask;

/// Unit of work buffered by the backfill scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    /// Bootstrap probe: waits until the live indexer has persisted a block whose timestamp is
    /// at or after `reference_timestamp` (epoch milliseconds).
    WaitForReferenceBlock { reference_timestamp: u64 },
    /// One step of backward work ending right below `end_block_exclusive`.
    BackfillStep {
        not_before_ms: u64,
        end_block_exclusive: u64,
    },
}

impl WorkItem {
    pub fn bootstrap(reference_timestamp: u64) -> Self {
        WorkItem::WaitForReferenceBlock {
            reference_timestamp,
        }
    }

    /// A step that is eligible for dispatch immediately.
    pub fn step(end_block_exclusive: u64) -> Self {
        WorkItem::BackfillStep {
            not_before_ms: 0,
            end_block_exclusive,
        }
    }

    pub fn end_block_exclusive(&self) -> Option<u64> {
        match self {
            WorkItem::WaitForReferenceBlock { .. } => None,
            WorkItem::BackfillStep {
                end_block_exclusive,
                ..
            } => Some(*end_block_exclusive),
        }
    }
}

impl ScheduledTask for WorkItem {
    fn not_before_ms(&self) -> u64 {
        match self {
            WorkItem::WaitForReferenceBlock { .. } => 0,
            WorkItem::BackfillStep { not_before_ms, .. } => *not_before_ms,
        }
    }

    fn reschedule(&self, not_before_ms: u64) -> Self {
        match *self {
            // The probe is a pure readiness poll, eligible on every flush.
            WorkItem::WaitForReferenceBlock { .. } => *self,
            WorkItem::BackfillStep {
                end_block_exclusive,
                ..
            } => WorkItem::BackfillStep {
                not_before_ms,
                end_block_exclusive,
            },
        }
    }
}
