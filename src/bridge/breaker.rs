//! Circuit breaker for one logical bridge endpoint.
//!
//! The breaker tracks consecutive failures for the classifier bridge and
//! stops issuing calls after a threshold is reached. The `open` →
//! `half-open` transition is evaluated lazily from elapsed wall-clock
//! time on read; there is no background timer. The breaker is only ever
//! touched from the pool's single dispatch path, which serializes access.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Default consecutive failures before the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before an open breaker permits a trial call.
pub const DEFAULT_RESET_AFTER: Duration = Duration::from_secs(30);

/// Observable breaker state.
///
/// `HalfOpen` is derived, not stored: an open breaker whose reset window
/// has elapsed reads as half-open, and the next `can_attempt()` is the
/// trial call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Failure-rate gate for a single endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    reset_after: Duration,
    failures: u32,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` consecutive failures
    /// and allows a trial call once `reset_after` has elapsed.
    pub fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            // A zero threshold would open the breaker before any call.
            threshold: threshold.max(1),
            reset_after,
            failures: 0,
            last_failure: None,
        }
    }

    /// A success clears the failure counter and forces `closed`.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.last_failure = None;
    }

    /// A failure increments the counter; the Nth consecutive failure
    /// opens the breaker and stamps the failure time.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.threshold {
            self.last_failure = Some(Instant::now());
        }
    }

    /// Whether the next call may be attempted.
    ///
    /// True iff closed, or open with the reset window elapsed, in which
    /// case this call optimistically resets to closed: the call about to
    /// be made is the half-open trial.
    pub fn can_attempt(&mut self) -> bool {
        if self.failures < self.threshold {
            return true;
        }
        match self.last_failure {
            Some(at) if at.elapsed() >= self.reset_after => {
                self.failures = 0;
                self.last_failure = None;
                true
            }
            _ => false,
        }
    }

    /// Pure read of the derived state, for observability only.
    pub fn state(&self) -> BreakerState {
        if self.failures < self.threshold {
            return BreakerState::Closed;
        }
        match self.last_failure {
            Some(at) if at.elapsed() >= self.reset_after => BreakerState::HalfOpen,
            _ => BreakerState::Open,
        }
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_AFTER)
    }
}
