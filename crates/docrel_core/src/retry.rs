//! Re-running transactions that were rolled back.

use crate::config::{Config, RetryPolicy};
use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::thread;
use tracing::debug;

/// What the caller knows about the work being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryHint {
    /// Must eventually succeed; retried without limit.
    Critical,
    /// Rollbacks are rare; the policy applies unchanged.
    InfrequentRollback,
    /// Rollbacks are expected; twice the usual attempts.
    FrequentRollback,
    /// Latency matters more than throughput; never sleeps between attempts.
    TimeSensitive,
}

impl fmt::Display for RetryHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Critical => "critical",
            Self::InfrequentRollback => "infrequent-rollback",
            Self::FrequentRollback => "frequent-rollback",
            Self::TimeSensitive => "time-sensitive",
        };
        f.write_str(name)
    }
}

/// Runs an operation until it succeeds, fails for good, or the attempt
/// budget runs out.
///
/// Only errors for which [`CoreError::is_retryable`] holds are retried.
/// The wait between attempts grows linearly with the attempt number.
#[derive(Debug, Clone, Copy, Default)]
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    /// Creates a retrier with the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Creates a retrier from the engine configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry)
    }

    /// Returns the policy in use.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn budget(&self, hint: RetryHint) -> Option<u32> {
        let attempts = self.policy.max_attempts.max(1);
        match hint {
            RetryHint::Critical => None,
            RetryHint::FrequentRollback => Some(attempts.saturating_mul(2)),
            RetryHint::InfrequentRollback | RetryHint::TimeSensitive => Some(attempts),
        }
    }

    /// Runs `op` until it succeeds.
    ///
    /// `op` receives the attempt number, starting at 1.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error unchanged, or
    /// `RetriesExhausted` wrapping the last error once the budget is spent.
    pub fn retry<T>(&self, hint: RetryHint, mut op: impl FnMut(u32) -> CoreResult<T>) -> CoreResult<T> {
        let budget = self.budget(hint);
        let mut attempt = 0u32;
        loop {
            attempt = attempt.saturating_add(1);
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if budget.is_some_and(|max| attempt >= max) {
                debug!(attempts = attempt, %hint, error = %err, "giving up");
                return Err(CoreError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            debug!(attempt, %hint, error = %err, "retrying after rollback");
            if hint != RetryHint::TimeSensitive {
                let delay = self.policy.delay_for(attempt);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }
    }

    /// Runs `op` like [`retry`](Self::retry), but maps a spent budget to a
    /// fallback value.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error unchanged.
    pub fn retry_or_else<T>(
        &self,
        hint: RetryHint,
        op: impl FnMut(u32) -> CoreResult<T>,
        fallback: impl FnOnce(CoreError) -> T,
    ) -> CoreResult<T> {
        match self.retry(hint, op) {
            Err(CoreError::RetriesExhausted { last, .. }) => Ok(fallback(*last)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::RuleId;
    use std::time::Duration;

    fn retrier(max_attempts: u32) -> Retrier {
        Retrier::new(RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        })
    }

    #[test]
    fn succeeds_after_rollbacks() {
        let result = retrier(5).retry(RetryHint::InfrequentRollback, |attempt| {
            if attempt < 3 {
                Err(CoreError::rollback("contention"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let mut calls = 0;
        let err = retrier(5)
            .retry(RetryHint::InfrequentRollback, |_| -> CoreResult<()> {
                calls += 1;
                Err(CoreError::unmergeable(RuleId::NameConflict, "dup"))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err.rule(), Some(RuleId::NameConflict));
    }

    #[test]
    fn gives_up_after_budget() {
        let err = retrier(3)
            .retry(RetryHint::InfrequentRollback, |_| -> CoreResult<()> {
                Err(CoreError::rollback("always"))
            })
            .unwrap_err();
        match err {
            CoreError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, CoreError::Rollback { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn frequent_rollback_doubles_budget() {
        let mut calls = 0;
        let _ = retrier(3).retry(RetryHint::FrequentRollback, |_| -> CoreResult<()> {
            calls += 1;
            Err(CoreError::rollback("always"))
        });
        assert_eq!(calls, 6);
    }

    #[test]
    fn critical_keeps_going() {
        let result = retrier(1).retry(RetryHint::Critical, |attempt| {
            if attempt < 20 {
                Err(CoreError::rollback("busy"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 20);
    }

    #[test]
    fn time_sensitive_does_not_sleep() {
        let slow = Retrier::new(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        });
        let result = slow.retry(RetryHint::TimeSensitive, |attempt| {
            if attempt < 3 {
                Err(CoreError::rollback("busy"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
    }

    #[test]
    fn fallback_replaces_exhaustion() {
        let value = retrier(2)
            .retry_or_else(
                RetryHint::InfrequentRollback,
                |_| -> CoreResult<u32> { Err(CoreError::rollback("busy")) },
                |_| 7,
            )
            .unwrap();
        assert_eq!(value, 7);
    }
}
