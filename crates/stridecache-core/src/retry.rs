//! Retry policy for failed fetches.

use std::time::Duration;

use crate::error::{ErrorClass, QueryError};

/// Initial backoff delay in milliseconds.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Ceiling for the exponential backoff.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Additional attempts after the first failure for generic resources.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Additional attempts for resources keyed by an identifier minted by another
/// system (e.g. a social-post hash), where repeated failure is usually permanent.
pub const EXTERNAL_ID_MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// A failed attempt that will be retried. Lives only while a fetch is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    pub attempt_index: u32,
    pub error: QueryError,
    pub next_delay_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }

    pub const fn none() -> Self {
        Self::new(0)
    }

    /// Whether the attempt at `attempt_index` (0 = first) should be followed by another.
    pub fn should_retry(&self, error: &QueryError, attempt_index: u32) -> bool {
        error.class() == ErrorClass::Transient && attempt_index < self.max_retries
    }

    /// `min(initial * 2^attempt_index, max)`
    pub fn delay_ms(&self, attempt_index: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
        self.initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }

    pub fn delay(&self, attempt_index: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt_index))
    }

    /// The retry to schedule after a failure, or `None` if the failure is terminal.
    pub fn next_attempt(&self, error: &QueryError, attempt_index: u32) -> Option<RetryAttempt> {
        self.should_retry(error, attempt_index).then(|| RetryAttempt {
            attempt_index,
            error: error.clone(),
            next_delay_ms: self.delay_ms(attempt_index),
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_ms(0), 1000);
        assert_eq!(policy.delay_ms(1), 2000);
        assert_eq!(policy.delay_ms(4), 16_000);
        assert_eq!(policy.delay_ms(5), 30_000);
        assert_eq!(policy.delay_ms(63), 30_000);
        assert_eq!(policy.delay_ms(200), 30_000);
    }

    #[test]
    fn test_retry_cap() {
        let policy = RetryPolicy::new(2);
        let err = QueryError::ServerError("boom".to_string());
        assert!(policy.should_retry(&err, 0));
        assert!(policy.should_retry(&err, 1));
        assert!(!policy.should_retry(&err, 2));

        let external = RetryPolicy::new(EXTERNAL_ID_MAX_RETRIES);
        assert!(external.should_retry(&err, 0));
        assert!(!external.should_retry(&err, 1));
    }

    #[test]
    fn test_not_found_is_never_retried() {
        let policy = RetryPolicy::new(10);
        let err = QueryError::NotFound("run 9".to_string());
        assert!(!policy.should_retry(&err, 0));
        assert!(policy.next_attempt(&err, 0).is_none());
    }

    #[test]
    fn test_validation_is_never_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&QueryError::Validation("bad".to_string()), 0));
    }

    #[test]
    fn test_next_attempt_carries_delay() {
        let policy = RetryPolicy::default();
        let attempt = policy
            .next_attempt(&QueryError::NetworkError("reset".to_string()), 1)
            .expect("retryable");
        assert_eq!(attempt.attempt_index, 1);
        assert_eq!(attempt.next_delay_ms, 2000);
    }
}
