//! Transaction manager.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::metainfo::{IdentifierFactory, MutableMetaSnapshot, RidGenerator};
use crate::repository::MetainfoRepository;
use crate::retry::{Retrier, RetryHint};
use crate::transaction::read_only::ReadOnlyTransaction;
use crate::transaction::write::{ExclusiveWriteTransaction, SharedWriteTransaction};
use crate::types::TransactionId;
use docrel_backend::BackendConnection;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens transactions over one metadata repository.
///
/// The manager provides:
/// - Lock-free read-only transactions on an immutable snapshot
/// - Shared writers that run concurrently and reconcile at commit
/// - Exclusive writers that run alone
///
/// ## Locking
///
/// Shared writers hold the read side of a process-wide `RwLock` and
/// exclusive writers hold the write side, each from open until close.
/// Acquisition blocks with no timeout; the backend's connection timeout
/// bounds the wait in practice.
///
/// The lock is fair. A thread that already holds a shared writer and opens
/// another one while an exclusive writer is queued deadlocks.
pub struct InternalTransactionManager {
    /// Committed metadata.
    repository: Arc<MetainfoRepository>,
    /// Shared/exclusive writer lock.
    lock: RwLock<()>,
    /// Next transaction ID.
    next_txid: AtomicU64,
    /// Engine configuration.
    config: Config,
    /// Derives backend identifiers for new elements.
    identifiers: IdentifierFactory,
    /// Row id counters.
    rids: RidGenerator,
}

impl InternalTransactionManager {
    /// Creates a new transaction manager.
    pub fn new(repository: Arc<MetainfoRepository>, config: Config) -> Self {
        Self {
            repository,
            lock: RwLock::new(()),
            next_txid: AtomicU64::new(1),
            identifiers: IdentifierFactory::from_config(&config),
            config,
            rids: RidGenerator::new(),
        }
    }

    /// Returns the repository transactions commit into.
    #[must_use]
    pub fn repository(&self) -> &Arc<MetainfoRepository> {
        &self.repository
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the identifier factory.
    #[must_use]
    pub fn identifier_factory(&self) -> &IdentifierFactory {
        &self.identifiers
    }

    /// Returns the row id generator.
    #[must_use]
    pub fn rid_generator(&self) -> &RidGenerator {
        &self.rids
    }

    fn next_id(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }

    /// Opens a read-only transaction on the latest committed snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend transaction cannot be opened.
    pub fn open_read_transaction(&self, conn: &dyn BackendConnection) -> CoreResult<ReadOnlyTransaction> {
        let backend = conn.open_read_only_transaction()?;
        let snapshot = self.repository.start_snapshot_stage().create_immutable_snapshot();
        let id = self.next_id();
        debug!(txn = %id, version = %snapshot.version(), "opened read-only transaction");
        Ok(ReadOnlyTransaction::new(id, snapshot, backend))
    }

    /// Opens a write transaction that may run alongside other shared
    /// writers.
    ///
    /// Blocks while an exclusive writer is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend transaction cannot be opened.
    pub fn open_shared_write_transaction(
        &self,
        conn: &dyn BackendConnection,
    ) -> CoreResult<SharedWriteTransaction<'_>> {
        let guard = self.lock.read();
        let backend = conn.open_shared_write_transaction()?;
        let txn = SharedWriteTransaction::new(self.next_id(), self, backend, guard);
        debug!(txn = %txn.id(), base = %txn.base_version(), "opened shared write transaction");
        Ok(txn)
    }

    /// Opens a write transaction that runs alone.
    ///
    /// Blocks until every other writer has closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend transaction cannot be opened.
    pub fn open_exclusive_write_transaction(
        &self,
        conn: &dyn BackendConnection,
    ) -> CoreResult<ExclusiveWriteTransaction<'_>> {
        let guard = self.lock.write();
        let backend = conn.open_exclusive_write_transaction()?;
        let txn = ExclusiveWriteTransaction::new(self.next_id(), self, backend, guard);
        debug!(txn = %txn.id(), base = %txn.base_version(), "opened exclusive write transaction");
        Ok(txn)
    }

    /// Runs `work` in a shared writer and commits it, retrying on rollback.
    ///
    /// A commit rejected by the merge is turned into a rollback, so `work`
    /// runs again against the newly committed metadata. `work` must
    /// therefore be safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or `RetriesExhausted`.
    pub fn run_in_shared_write<T>(
        &self,
        conn: &dyn BackendConnection,
        hint: RetryHint,
        mut work: impl FnMut(&mut MutableMetaSnapshot, &IdentifierFactory) -> CoreResult<T>,
    ) -> CoreResult<T> {
        Retrier::from_config(&self.config).retry(hint, |attempt| {
            let mut txn = self.open_shared_write_transaction(conn)?;
            let done = txn
                .meta_snapshot_mut()
                .and_then(|snapshot| work(snapshot, &self.identifiers));
            let result = done.and_then(|value| txn.commit().map(|_| value));

            match result {
                Ok(value) => {
                    txn.close()?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(close_err) = txn.close() {
                        warn!(txn = %txn.id(), error = %close_err, "failed to close write transaction");
                    }
                    match err {
                        CoreError::Unmergeable { rule, message } => {
                            debug!(txn = %txn.id(), attempt, %rule, "commit rejected by merge");
                            Err(CoreError::rollback(format!("{rule}: {message}")))
                        }
                        other => Err(other),
                    }
                }
            }
        })
    }
}

impl fmt::Debug for InternalTransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalTransactionManager")
            .field("repository", &self.repository)
            .field("next_txid", &self.next_txid.load(Ordering::SeqCst))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
