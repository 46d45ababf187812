//! Bounded retry policy for specialist calls.
//!
//! Transient failures (`Unavailable`) and malformed replies (`Malformed`) have separate retry
//! budgets. Delays grow exponentially from `initial_delay` and are capped at `max_delay`.

use std::time::Duration;

use crate::constants::{
    DEFAULT_MAX_MALFORMED_RETRIES, DEFAULT_MAX_UNAVAILABLE_RETRIES, DEFAULT_RETRY_DELAY_MS,
    MAX_RETRY_DELAY_MS,
};

/// Configuration for specialist retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after a transient failure.
    pub max_unavailable_retries: u32,
    /// Retries after a malformed reply.
    pub max_malformed_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_unavailable_retries: DEFAULT_MAX_UNAVAILABLE_RETRIES,
            max_malformed_retries: DEFAULT_MAX_MALFORMED_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy with the default budgets and no delay between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Classify a reasoning-service error message as transient or permanent.
///
/// Transient: HTTP 5xx, HTTP 429 and quota messages, timeouts and connection failures,
/// provider overload.
pub fn is_retriable_error(error_message: &str) -> bool {
    let lower = error_message.to_lowercase();

    let transient_patterns = [
        "500",
        "502",
        "503",
        "504",
        "internal server error",
        "bad gateway",
        "service unavailable",
        "gateway timeout",
        "429",
        "rate limit",
        "too many requests",
        "quota exceeded",
        "resource exhausted",
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "connection failed",
        "network error",
        "overloaded",
        "capacity",
        "temporarily unavailable",
        "try again",
    ];

    transient_patterns
        .iter()
        .any(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate();
        assert_eq!(policy.delay_for(3), Duration::ZERO);
        assert_eq!(policy.max_unavailable_retries, 2);
        assert_eq!(policy.max_malformed_retries, 1);
    }

    #[test]
    fn transient_messages_are_retriable() {
        assert!(is_retriable_error("HTTP 503 Service Unavailable"));
        assert!(is_retriable_error("429 RESOURCE_EXHAUSTED"));
        assert!(is_retriable_error("request timed out"));
        assert!(is_retriable_error("model is overloaded"));
    }

    #[test]
    fn permanent_messages_are_not_retriable() {
        assert!(!is_retriable_error("401 Unauthorized"));
        assert!(!is_retriable_error("API key not valid"));
        assert!(!is_retriable_error("400 Bad Request"));
    }
}
