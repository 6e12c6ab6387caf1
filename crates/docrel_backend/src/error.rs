//! Error types for backend operations.

use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while driving a backend transaction.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend rolled the transaction back for a transient reason.
    ///
    /// Retrying the whole transaction is expected to succeed.
    #[error("backend rollback: {reason}")]
    Rollback {
        /// Why the backend gave up.
        reason: String,
    },

    /// The backend refused the operation.
    #[error("backend rejected operation: {message}")]
    Rejected {
        /// Description of the refusal.
        message: String,
    },

    /// The transaction was already closed.
    #[error("backend transaction is closed")]
    TransactionClosed,

    /// The connection was closed.
    #[error("backend connection is closed")]
    ConnectionClosed,
}

impl BackendError {
    /// Creates a transient rollback error.
    pub fn rollback(reason: impl Into<String>) -> Self {
        Self::Rollback {
            reason: reason.into(),
        }
    }

    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns true if retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rollback { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rollback_is_transient() {
        assert!(BackendError::rollback("serialization failure").is_transient());
        assert!(!BackendError::rejected("bad ddl").is_transient());
        assert!(!BackendError::TransactionClosed.is_transient());
        assert!(!BackendError::Io(io::Error::other("disk")).is_transient());
    }

    #[test]
    fn messages_carry_details() {
        let err = BackendError::rollback("deadlock detected");
        assert_eq!(err.to_string(), "backend rollback: deadlock detected");
    }
}
