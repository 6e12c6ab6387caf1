//! Error types for docrel core.

use crate::merge::RuleId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docrel core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backend error.
    #[error("backend error: {0}")]
    Backend(#[from] docrel_backend::BackendError),

    /// The proposed metadata changes conflict with the committed snapshot.
    ///
    /// Re-running the same merge will fail again; the changes have to be
    /// recomputed against the new committed state.
    #[error("unmergeable change ({rule}): {message}")]
    Unmergeable {
        /// The merge rule that rejected the change.
        rule: RuleId,
        /// Full path of the conflicting element and what went wrong.
        message: String,
    },

    /// The transaction was rolled back for a transient reason.
    #[error("transaction rolled back: {reason}")]
    Rollback {
        /// Reason for the rollback.
        reason: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A mutation would break a snapshot invariant.
    #[error("illegal argument: {message}")]
    IllegalArgument {
        /// Description of the violated invariant.
        message: String,
    },

    /// A retried operation kept failing.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error returned by the last attempt.
        last: Box<CoreError>,
    },

    /// No free identifier could be derived for a name.
    #[error("no free identifier for {name}")]
    IdentifierExhausted {
        /// Name chain that could not be mapped.
        name: String,
    },
}

impl CoreError {
    /// Creates an unmergeable error.
    pub fn unmergeable(rule: RuleId, message: impl Into<String>) -> Self {
        Self::Unmergeable {
            rule,
            message: message.into(),
        }
    }

    /// Creates a rollback error.
    pub fn rollback(reason: impl Into<String>) -> Self {
        Self::Rollback {
            reason: reason.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Returns true if retrying the whole transaction is likely to succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rollback { .. } => true,
            Self::Backend(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Returns the rule id if this is an unmergeable error.
    #[must_use]
    pub fn rule(&self) -> Option<RuleId> {
        match self {
            Self::Unmergeable { rule, .. } => Some(*rule),
            _ => None,
        }
    }
}
