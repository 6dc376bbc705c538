use std::fmt;

/// Half-open block range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "block range start must not exceed end");
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, block: u64) -> bool {
        self.start <= block && block < self.end
    }

    /// Block numbers covered by the range, in ascending order.
    pub fn heights(&self) -> Vec<u64> {
        (self.start..self.end).collect()
    }

    /// Splits the range into consecutive pieces of at most `size` blocks.
    pub fn chunks(&self, size: u64) -> impl Iterator<Item = BlockRange> {
        let size = size.max(1);
        let end = self.end;
        let mut cursor = self.start;
        std::iter::from_fn(move || {
            if cursor >= end {
                return None;
            }
            let next = cursor.saturating_add(size).min(end);
            let piece = BlockRange::new(cursor, next);
            cursor = next;
            Some(piece)
        })
    }

    pub(crate) fn split_halves(&self) -> Option<(BlockRange, BlockRange)> {
        if self.len() <= 1 {
            return None;
        }
        let mid = self.start + self.len() / 2;
        Some((BlockRange::new(self.start, mid), BlockRange::new(mid, self.end)))
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Sorts ranges and merges the ones that touch or overlap.
pub fn coalesce(mut ranges: Vec<BlockRange>) -> Vec<BlockRange> {
    ranges.retain(|range| !range.is_empty());
    ranges.sort();

    let mut merged: Vec<BlockRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}
