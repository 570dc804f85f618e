//! # Fibonacci Backoff
//!
//! Progressive backoff for failed reconciliations. Grows more slowly than
//! exponential backoff, so a cluster whose keys are briefly invalid (e.g. the
//! key Secret is created a moment after the Cluster is edited) is retried
//! soon, while a persistently broken one settles at the maximum.
//!
//! With the defaults (5s min, 60s max) the sequence is:
//! 5s, 5s, 10s, 15s, 25s, 40s, 60s, 60s, ...
//!
//! ## Usage
//!
//! ```rust
//! use cluster_encryption_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(5, 60);
//! assert_eq!(backoff.next_backoff_seconds(), 5);
//! assert_eq!(backoff.next_backoff_seconds(), 5);
//! assert_eq!(backoff.next_backoff_seconds(), 10);
//! assert_eq!(backoff.next_backoff_seconds(), 15);
//! ```

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at the maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff in seconds
    prev_secs: u64,
    /// Current backoff in seconds
    current_secs: u64,
    /// Maximum backoff in seconds
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with minimum and maximum values in seconds
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.min(max_secs);
        Self {
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Get the next backoff in seconds and advance the sequence
    ///
    /// ```
    /// use cluster_encryption_controller::controller::backoff::FibonacciBackoff;
    ///
    /// let mut backoff = FibonacciBackoff::new(1, 60);
    /// assert_eq!(backoff.next_backoff_seconds(), 1);
    /// assert_eq!(backoff.next_backoff_seconds(), 1);
    /// assert_eq!(backoff.next_backoff_seconds(), 2);
    /// ```
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;

        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);

        result
    }
}
