//! Engine configuration.

use std::time::Duration;

/// How often and how patiently a transaction is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failure; grows linearly with each attempt.
    pub base_delay: Duration,
    /// Upper bound on a single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Returns the wait before attempt number `attempt + 1`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Configuration for the metadata engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Longest identifier the backend accepts.
    ///
    /// 63 matches the PostgreSQL `NAMEDATALEN` limit.
    pub max_identifier_length: usize,

    /// Retry policy for transient rollbacks.
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_identifier_length: 63,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the longest identifier the backend accepts.
    #[must_use]
    pub const fn max_identifier_length(mut self, len: usize) -> Self {
        self.max_identifier_length = len;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the number of attempts made before giving up.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_identifier_length, 63);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new().max_identifier_length(30).max_attempts(2);

        assert_eq!(config.max_identifier_length, 30);
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(5), Duration::from_millis(25));
    }
}
