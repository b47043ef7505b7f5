//! # Fibonacci Backoff
//!
//! Retry delays for HostClaims whose reconciliation fails with a hard error
//! (anything that is not an explicit requeue). Delays follow the Fibonacci
//! sequence from a minimum up to a cap: with 1m/10m that is
//! 1m, 1m, 2m, 3m, 5m, 8m, 10m, 10m, ...

use std::time::Duration;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min` and capped at `max`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Backoff for HostClaim reconciliation errors: 1 minute up to 10 minutes.
    #[must_use]
    pub fn for_reconcile_errors() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    /// Return the current delay and advance the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }
}

/// Backoff state of one HostClaim
#[derive(Debug, Clone)]
pub(crate) struct BackoffState {
    pub(crate) backoff: FibonacciBackoff,
    pub(crate) error_count: u32,
}

impl BackoffState {
    pub(crate) fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::for_reconcile_errors(),
            error_count: 0,
        }
    }

    pub(crate) fn increment_error(&mut self) {
        self.error_count += 1;
    }
}
