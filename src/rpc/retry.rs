//! Per-call context for the client's retry loop so every attempt logs the same method and
//! block span.

use crate::rpc::circuit_breaker::CircuitState;
use anyhow::Error;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        if let Some((start_block, end_block)) = $ctx.blocks {
            tracing::$level!(
                method = $ctx.method,
                start_block,
                end_block,
                $($rest)*
            );
        } else {
            tracing::$level!(method = $ctx.method, $($rest)*);
        }
    }};
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryContext {
    method: &'static str,
    /// Inclusive first and last block touched by the call.
    blocks: Option<(u64, u64)>,
}

impl RetryContext {
    pub(crate) fn new(method: &'static str) -> Self {
        Self {
            method,
            blocks: None,
        }
    }

    pub(crate) fn with_blocks(method: &'static str, blocks: &[u64]) -> Self {
        let span = match (blocks.first(), blocks.last()) {
            (Some(first), Some(last)) => Some((*first, *last)),
            _ => None,
        };
        Self {
            blocks: span,
            ..Self::new(method)
        }
    }

    pub(crate) fn log_permit(&self, state: CircuitState) {
        log_with_retry_ctx!(trace, self, breaker_state = ?state, "rpc attempt admitted");
    }

    pub(crate) fn log_circuit_open(&self) {
        log_with_retry_ctx!(warn, self, "rpc circuit breaker open; rejecting call");
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &Error, timeout: bool) {
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms = duration_to_millis(backoff),
            timeout,
            error = %format!("{err:#}"),
            "rpc call failed; retrying"
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(
            error,
            self,
            attempt,
            error = %format!("{err:#}"),
            "rpc call exhausted retries"
        );
    }

    pub(crate) fn log_not_retryable(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            error = %format!("{err:#}"),
            "rpc call failed with a non-retryable error"
        );
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
