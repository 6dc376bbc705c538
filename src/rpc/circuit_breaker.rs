use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const DEFAULT_FAILURE_THRESHOLD: usize = 5;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
const DEFAULT_HALF_OPEN_PROBES: usize = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of the breaker for logs and tests.
#[derive(Debug, Copy, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub open_for: Option<Duration>,
}

/// Error returned when the breaker refuses an RPC attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerError {
    CircuitOpen,
}

impl std::fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "RPC circuit breaker is open"),
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { probes_in_flight: usize },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    consecutive_failures: usize,
}

/// Consecutive-failure circuit breaker shared by every request of one RPC client.
///
/// After `failure_threshold` failures in a row the circuit opens and rejects requests for
/// `cooldown`. It then lets up to `half_open_probes` requests through; the first result decides
/// whether the circuit closes again or reopens.
#[derive(Debug, Clone)]
pub struct RpcCircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    failure_threshold: usize,
    cooldown: Duration,
    half_open_probes: usize,
}

impl Default for RpcCircuitBreaker {
    fn default() -> Self {
        Self::new(
            DEFAULT_FAILURE_THRESHOLD,
            DEFAULT_COOLDOWN,
            DEFAULT_HALF_OPEN_PROBES,
        )
    }
}

impl RpcCircuitBreaker {
    pub fn new(failure_threshold: usize, cooldown: Duration, half_open_probes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Closed,
                consecutive_failures: 0,
            })),
            failure_threshold: failure_threshold.max(1),
            cooldown: if cooldown.is_zero() {
                Duration::from_secs(1)
            } else {
                cooldown
            },
            half_open_probes: half_open_probes.max(1),
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            state: inner.phase.state(),
            consecutive_failures: inner.consecutive_failures,
            open_for: match inner.phase {
                Phase::Open { since } => Some(since.elapsed()),
                _ => None,
            },
        }
    }

    /// Admits or rejects one attempt. An admitted half-open attempt holds a probe slot until its
    /// result is recorded.
    pub fn before_request(&self) -> Result<CircuitState, CircuitBreakerError> {
        let mut inner = self.lock();

        if let Phase::Open { since } = inner.phase {
            if since.elapsed() < self.cooldown {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            Self::transition(
                &mut inner,
                Phase::HalfOpen {
                    probes_in_flight: 0,
                },
            );
        }

        if let Phase::HalfOpen { probes_in_flight } = &mut inner.phase {
            if *probes_in_flight >= self.half_open_probes {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            *probes_in_flight += 1;
        }

        Ok(inner.phase.state())
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if matches!(inner.phase, Phase::HalfOpen { .. }) {
            Self::transition(&mut inner, Phase::Closed);
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let reopen = match inner.phase {
            Phase::HalfOpen { .. } => true,
            Phase::Closed => inner.consecutive_failures >= self.failure_threshold,
            Phase::Open { .. } => false,
        };
        if reopen {
            Self::transition(
                &mut inner,
                Phase::Open {
                    since: Instant::now(),
                },
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(inner: &mut Inner, next: Phase) {
        let previous = inner.phase.state();
        inner.phase = next;
        if previous != next.state() {
            tracing::warn!(
                previous = ?previous,
                next = ?next.state(),
                consecutive_failures = inner.consecutive_failures,
                "rpc circuit breaker state changed"
            );
        }
    }
}
