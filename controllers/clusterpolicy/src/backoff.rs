//! # Fibonacci Backoff
//!
//! Requeue delays for failed ClusterPolicy passes. The delay grows along the
//! Fibonacci sequence (min, min, 2*min, 3*min, 5*min, ...) and is capped at
//! the configured maximum. A successful pass resets it.

use std::time::Duration;

/// Default first delay after a failed pass
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(5);

/// Default cap on the delay
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, in whole seconds.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}

impl FibonacciBackoff {
    /// Backoff starting at `min` and never exceeding `max`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_secs = min.as_secs().max(1);
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs: max.as_secs().max(min_secs),
        }
    }

    /// Current delay; advances the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_secs;

        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);

        Duration::from_secs(result)
    }

    /// Restart the sequence
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }
}
