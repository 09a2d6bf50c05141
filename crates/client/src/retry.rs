//! Retry decisions from a literal delay schedule.

use std::time::Duration;

use crate::error::TransportError;

/// Outcome of consulting the [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Wait this long, then re-attempt the same exchange.
    Retry(Duration),
    /// Stop and report the error.
    GiveUp,
}

/// Stateless retry policy.
///
/// The schedule is used as given: entry `n` is the wait before retry
/// `n + 1`. It is never extended or computed, so non-monotonic schedules
/// behave exactly as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&[0, 3_000, 6_000, 12_000, 24_000])
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(delays_ms: &[u64]) -> Self {
        Self::new(delays_ms.iter().copied().map(Duration::from_millis).collect())
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Decides what to do after `error` on retry number `attempt`
    /// (0 for the first failure of an exchange).
    pub fn should_retry(&self, attempt: u32, error: &TransportError) -> Decision {
        if !error.is_retryable() {
            return Decision::GiveUp;
        }
        match self.delays.get(attempt as usize) {
            Some(&delay) => Decision::Retry(delay),
            None => Decision::GiveUp,
        }
    }
}
