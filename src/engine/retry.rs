//! Retry policy for stale step attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds how many stale (`FAILED` or abandoned `RUNNING`) attempts a
/// single step call may pass over, and how long to wait before a real
/// re-execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum stale attempts one call may pass over
    pub max_attempts: u32,

    /// Delay before the first re-execution, doubled for each further one
    pub initial_backoff_ms: u64,

    /// Upper bound on the delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 0,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Returns true if another stale attempt may be passed over.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts <= self.max_attempts
    }

    /// Delay before the re-execution following the `attempt`-th stale
    /// attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_backoff_ms == 0 {
            return Duration::ZERO;
        }

        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.backoff(3), Duration::ZERO);
    }

    #[test]
    fn test_allows_up_to_max() {
        let policy = RetryPolicy::new(2);
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10)
            .with_backoff(Duration::from_millis(100), Duration::from_millis(350));

        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(80), Duration::from_millis(350));
    }

    #[test]
    fn test_policy_deserializes_partial_yaml() {
        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 3").unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.max_backoff_ms, 5_000);
    }
}
