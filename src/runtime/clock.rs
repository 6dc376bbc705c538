use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Wall clock expressed in epoch milliseconds.
///
/// The epoch offset is sampled once and then advanced with tokio's monotonic clock, so
/// eligibility gates follow `tokio::time::pause` in tests and never jump with NTP adjustments.
#[derive(Debug, Clone, Copy)]
pub struct EngineClock {
    epoch_ms_at_start: u64,
    started: Instant,
}

impl EngineClock {
    pub fn new() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis().min(u128::from(u64::MAX)) as u64)
            .unwrap_or_default();
        Self::starting_at(epoch_ms)
    }

    pub fn starting_at(epoch_ms: u64) -> Self {
        Self {
            epoch_ms_at_start: epoch_ms,
            started: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        let elapsed = self.started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
        self.epoch_ms_at_start.saturating_add(elapsed)
    }
}

impl Default for EngineClock {
    fn default() -> Self {
        Self::new()
    }
}
