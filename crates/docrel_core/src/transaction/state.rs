//! Transaction state.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// State of a transaction.
///
/// Read-only transactions go from `Open` straight to `Closed`. Writers pass
/// through `Committed` or `RolledBack` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Transaction is open and can read or change metadata.
    Open,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
    /// Transaction has released its backend transaction and lock.
    Closed,
}

impl TransactionState {
    /// Checks if the transaction is still open.
    #[must_use]
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// Ensures the transaction is open.
    pub(crate) fn ensure_open(self) -> CoreResult<()> {
        match self {
            Self::Open => Ok(()),
            Self::Committed => Err(CoreError::invalid_operation("transaction already committed")),
            Self::RolledBack => Err(CoreError::invalid_operation(
                "transaction already rolled back",
            )),
            Self::Closed => Err(CoreError::invalid_operation("transaction already closed")),
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::Committed => "COMMITTED",
            Self::RolledBack => "ROLLED_BACK",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
