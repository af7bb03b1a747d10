//! # Retry Policy Module
//!
//! Interval-based retry policies applied to receive points.
//!
//! The same type describes both policies a provider can configure:
//! local retries (re-invoking a handler without leaving the receive point) and
//! redeliveries (requeueing the message once local retries are exhausted).

use std::time::Duration;

/// Ordered list of retry intervals
///
/// Attempt `n` (0-based, not counting the initial try) waits `intervals[n]`.
/// An empty list disables the policy.
///
/// # Examples
///
/// ```rust
/// use pubsub_runtime::retry::RetryIntervals;
/// use std::time::Duration;
///
/// let policy = RetryIntervals::new(vec![Duration::from_millis(100), Duration::from_secs(1)]);
/// assert_eq!(policy.delay_for(0), Some(Duration::from_millis(100)));
/// assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
/// assert_eq!(policy.delay_for(2), None);
/// assert_eq!(policy.max_attempts(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryIntervals {
    intervals: Vec<Duration>,
}

impl RetryIntervals {
    pub fn new(intervals: Vec<Duration>) -> Self {
        Self { intervals }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Delay before retry `attempt`, or `None` once the policy is exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        self.intervals.get(attempt as usize).copied()
    }

    /// Maximum number of retries
    pub fn max_attempts(&self) -> u32 {
        self.intervals.len() as u32
    }
}

impl From<Vec<Duration>> for RetryIntervals {
    fn from(intervals: Vec<Duration>) -> Self {
        Self::new(intervals)
    }
}

/// State tracker for retry operations
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current retry attempt (0-based)
    pub attempt: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    /// Create new retry state starting at attempt 0
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// Increment to next retry attempt
    pub fn next_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Get next delay from policy, `None` when exhausted
    pub fn get_delay(&self, policy: &RetryIntervals) -> Option<Duration> {
        policy.delay_for(self.attempt)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
