//! Backend connection trait definitions.

use crate::error::BackendResult;
use std::fmt;

/// The lock discipline a backend transaction was opened under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only; commit is expected to be a no-op.
    ReadOnly,
    /// Concurrent writer sharing the metadata lock.
    SharedWrite,
    /// Sole writer holding the metadata lock exclusively.
    ExclusiveWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadOnly => "read-only",
            Self::SharedWrite => "shared-write",
            Self::ExclusiveWrite => "exclusive-write",
        };
        f.write_str(name)
    }
}

/// A transaction on the relational backend.
///
/// # Invariants
///
/// - `commit` and `rollback` are each called at most once, and never both
/// - `close` is always called last, even after a failed commit
/// - No method may be called after `close`
pub trait BackendTransaction: Send {
    /// Returns the mode this transaction was opened in.
    fn mode(&self) -> TransactionMode;

    /// Makes the transaction's data changes durable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::Rollback`] if the backend aborted the
    /// transaction for a transient reason, or another error if the commit
    /// could not be performed.
    fn commit(&mut self) -> BackendResult<()>;

    /// Discards the transaction's data changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is closed or the backend fails.
    fn rollback(&mut self) -> BackendResult<()>;

    /// Releases the transaction's resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to release the connection.
    fn close(&mut self) -> BackendResult<()>;
}

/// A connection to the relational backend.
///
/// Implementations must be `Send + Sync`; the transaction manager opens
/// transactions from many threads at once.
pub trait BackendConnection: Send + Sync {
    /// Opens a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or unavailable.
    fn open_read_only_transaction(&self) -> BackendResult<Box<dyn BackendTransaction>>;

    /// Opens a write transaction that may run concurrently with others.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or unavailable.
    fn open_shared_write_transaction(&self) -> BackendResult<Box<dyn BackendTransaction>>;

    /// Opens a write transaction that runs alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or unavailable.
    fn open_exclusive_write_transaction(&self) -> BackendResult<Box<dyn BackendTransaction>>;

    /// Opens a transaction in the given mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or unavailable.
    fn open_transaction(&self, mode: TransactionMode) -> BackendResult<Box<dyn BackendTransaction>> {
        match mode {
            TransactionMode::ReadOnly => self.open_read_only_transaction(),
            TransactionMode::SharedWrite => self.open_shared_write_transaction(),
            TransactionMode::ExclusiveWrite => self.open_exclusive_write_transaction(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_display() {
        assert_eq!(TransactionMode::ReadOnly.to_string(), "read-only");
        assert_eq!(TransactionMode::SharedWrite.to_string(), "shared-write");
        assert_eq!(TransactionMode::ExclusiveWrite.to_string(), "exclusive-write");
    }
}
