//! Read-only transactions.

use crate::error::CoreResult;
use crate::metainfo::ImmutableMetaSnapshot;
use crate::transaction::state::TransactionState;
use crate::types::TransactionId;
use docrel_backend::BackendTransaction;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A transaction that only reads.
///
/// It takes no lock: the snapshot it sees was committed before it started
/// and never changes, whatever other transactions do in the meantime.
pub struct ReadOnlyTransaction {
    id: TransactionId,
    snapshot: Arc<ImmutableMetaSnapshot>,
    backend: Box<dyn BackendTransaction>,
    state: TransactionState,
}

impl ReadOnlyTransaction {
    pub(crate) fn new(
        id: TransactionId,
        snapshot: Arc<ImmutableMetaSnapshot>,
        backend: Box<dyn BackendTransaction>,
    ) -> Self {
        Self {
            id,
            snapshot,
            backend,
            state: TransactionState::Open,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the snapshot this transaction reads.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` once the transaction is closed.
    pub fn meta_snapshot(&self) -> CoreResult<&ImmutableMetaSnapshot> {
        self.state.ensure_open()?;
        Ok(&self.snapshot)
    }

    /// Ends the backend transaction.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the commit or close failed; the
    /// transaction is closed either way.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.state == TransactionState::Closed {
            return Ok(());
        }
        self.state = TransactionState::Closed;
        let committed = self.backend.commit();
        let closed = self.backend.close();
        debug!(txn = %self.id, "closed read-only transaction");
        committed?;
        closed?;
        Ok(())
    }
}

impl Drop for ReadOnlyTransaction {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(txn = %self.id, error = %err, "failed to close read-only transaction");
        }
    }
}

impl fmt::Debug for ReadOnlyTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyTransaction")
            .field("id", &self.id)
            .field("version", &self.snapshot.version())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
