//! # Fibonacci Backoff
//!
//! Progressive delays for compare-and-swap retries. Grows more slowly than
//! exponential backoff, so a handful of contending writers settle quickly.
//!
//! Delays are in milliseconds: with `new(5, 100)` the sequence is
//! 5, 5, 10, 15, 25, 40, 65, 100 (max).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev_ms: u64,
    current_ms: u64,
    max_ms: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            prev_ms: 0,
            current_ms: min_ms,
            max_ms,
        }
    }

    /// Returns the current delay and advances the sequence
    pub fn next_backoff_ms(&mut self) -> u64 {
        let result = self.current_ms;
        let next = self.prev_ms + self.current_ms;
        self.prev_ms = self.current_ms;
        self.current_ms = std::cmp::min(next, self.max_ms);
        result
    }

    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_millis(self.next_backoff_ms())
    }
}
