//! Shared and exclusive write transactions.

use crate::error::{CoreError, CoreResult};
use crate::metainfo::{
    IdentifierFactory, ImmutableMetaSnapshot, MetaDatabaseRead, MetaElementState, MetaField,
    MetaSnapshotRead, MutableMetaSnapshot, TableRef,
};
use crate::transaction::manager::InternalTransactionManager;
use crate::transaction::state::TransactionState;
use crate::types::{FieldType, SnapshotVersion, TransactionId};
use docrel_backend::{BackendTransaction, TransactionMode};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

/// A write transaction that runs alongside other shared writers.
pub type SharedWriteTransaction<'a> = WriteTransaction<'a, RwLockReadGuard<'a, ()>>;

/// A write transaction that runs alone.
pub type ExclusiveWriteTransaction<'a> = WriteTransaction<'a, RwLockWriteGuard<'a, ()>>;

/// A transaction that may change metadata.
///
/// Holds one side of the manager's lock (`G`) from open until
/// [`close`](Self::close) or drop. Changes go to a private overlay and only
/// become visible to others once [`commit`](Self::commit) merges them.
pub struct WriteTransaction<'a, G> {
    id: TransactionId,
    manager: &'a InternalTransactionManager,
    snapshot: MutableMetaSnapshot,
    backend: Box<dyn BackendTransaction>,
    state: TransactionState,
    guard: Option<G>,
}

impl<'a, G> WriteTransaction<'a, G> {
    pub(crate) fn new(
        id: TransactionId,
        manager: &'a InternalTransactionManager,
        backend: Box<dyn BackendTransaction>,
        guard: G,
    ) -> Self {
        let snapshot = manager
            .repository()
            .start_snapshot_stage()
            .create_mutable_snapshot();
        Self {
            id,
            manager,
            snapshot,
            backend,
            state: TransactionState::Open,
            guard: Some(guard),
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

    /// Checks if the transaction is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Returns the mode of the backend transaction.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.backend.mode()
    }

    /// Version of the committed snapshot the overlay started from.
    #[must_use]
    pub fn base_version(&self) -> SnapshotVersion {
        self.snapshot.base_version()
    }

    /// Returns the manager's identifier factory.
    #[must_use]
    pub fn identifier_factory(&self) -> &'a IdentifierFactory {
        self.manager.identifier_factory()
    }

    /// Returns the transaction's view of the metadata.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` unless the transaction is open.
    pub fn meta_snapshot(&self) -> CoreResult<&MutableMetaSnapshot> {
        self.state.ensure_open()?;
        Ok(&self.snapshot)
    }

    /// Returns the transaction's overlay for editing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` unless the transaction is open.
    pub fn meta_snapshot_mut(&mut self) -> CoreResult<&mut MutableMetaSnapshot> {
        self.state.ensure_open()?;
        Ok(&mut self.snapshot)
    }

    /// Returns the field, creating it and every container on its path if
    /// they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` unless the transaction is open, or an
    /// error if no identifier can be derived.
    pub fn get_or_create_field(
        &mut self,
        database_name: &str,
        collection_name: &str,
        table_ref: &TableRef,
        name: &str,
        field_type: FieldType,
    ) -> CoreResult<MetaField> {
        let factory = self.identifier_factory();
        self.meta_snapshot_mut()?.get_or_create_field(
            factory,
            database_name,
            collection_name,
            table_ref,
            name,
            field_type,
        )
    }

    /// Reserves `count` row ids for a doc part and records the new
    /// high-water mark in the overlay.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` unless the transaction is open, or
    /// `IllegalArgument` if the doc part does not exist or its row ids are
    /// exhausted.
    pub fn reserve_rids(
        &mut self,
        database_name: &str,
        collection_name: &str,
        table_ref: &TableRef,
        count: u64,
    ) -> CoreResult<Range<u64>> {
        self.state.ensure_open()?;
        let missing = || {
            CoreError::illegal_argument(format!(
                "no doc part {table_ref} in {database_name}.{collection_name}"
            ))
        };

        let manager = self.manager;
        let range = {
            let database = self
                .snapshot
                .database_by_name(database_name)
                .ok_or_else(missing)?;
            let collection = database
                .collection_by_name(collection_name)
                .ok_or_else(missing)?;
            let doc_part = collection
                .doc_part_by_table_ref(table_ref)
                .ok_or_else(missing)?;
            manager
                .rid_generator()
                .reserve(database.identifier(), collection.identifier(), doc_part, count)?
        };

        if !range.is_empty() {
            self.snapshot
                .get_meta_database_by_name_mut(database_name)
                .and_then(|d| d.get_meta_collection_by_name_mut(collection_name))
                .and_then(|c| c.get_meta_doc_part_by_table_ref_mut(table_ref))
                .ok_or_else(missing)?
                .observe_rid(range.end - 1);
        }
        Ok(range)
    }

    /// Merges the overlay into the latest committed snapshot and commits
    /// the backend transaction.
    ///
    /// The merge mutex is held from the merge until the merged snapshot is
    /// installed, so metadata and data become visible together.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` unless the transaction is open.
    /// - `Unmergeable` if the changes conflict with what was committed in
    ///   the meantime; the backend transaction is rolled back.
    /// - `Backend` if the backend commit failed; nothing is installed.
    pub fn commit(&mut self) -> CoreResult<Arc<ImmutableMetaSnapshot>> {
        self.state.ensure_open()?;

        let manager = self.manager;
        let prepared = match manager.repository().start_merge(&self.snapshot).prepare() {
            Ok(prepared) => prepared,
            Err(err) => {
                self.state = TransactionState::RolledBack;
                debug!(txn = %self.id, error = %err, "metadata merge failed, rolling back");
                if let Err(rollback_err) = self.backend.rollback() {
                    warn!(txn = %self.id, error = %rollback_err, "backend rollback failed");
                }
                return Err(err);
            }
        };

        if let Err(err) = self.backend.commit() {
            self.state = TransactionState::RolledBack;
            debug!(txn = %self.id, error = %err, "backend commit failed");
            return Err(err.into());
        }

        let installed = prepared.install();
        self.state = TransactionState::Committed;
        for (database, state) in self.snapshot.modified_databases() {
            if state == MetaElementState::Removed {
                manager.rid_generator().forget_database(database.identifier());
            }
        }
        debug!(txn = %self.id, version = %installed.version(), "committed write transaction");
        Ok(installed)
    }

    /// Discards the overlay and rolls back the backend transaction.
    ///
    /// The overlay is replaced by a fresh one over the latest committed
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` unless the transaction is open, or the
    /// backend error if the rollback failed.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.state.ensure_open()?;
        self.state = TransactionState::RolledBack;
        self.snapshot = self
            .manager
            .repository()
            .start_snapshot_stage()
            .create_mutable_snapshot();
        debug!(txn = %self.id, "rolled back write transaction");
        self.backend.rollback()?;
        Ok(())
    }

    /// Releases the backend transaction and the lock.
    ///
    /// An open transaction is rolled back first. The lock is released even
    /// if the backend fails. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first backend error.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.state == TransactionState::Closed {
            return Ok(());
        }
        let rolled_back = if self.state.is_open() {
            self.backend.rollback()
        } else {
            Ok(())
        };
        self.state = TransactionState::Closed;
        let closed = self.backend.close();
        self.guard = None;
        debug!(txn = %self.id, "closed write transaction");
        rolled_back?;
        closed?;
        Ok(())
    }
}

impl<G> Drop for WriteTransaction<'_, G> {
    fn drop(&mut self) {
        if self.state.is_open() {
            warn!(txn = %self.id, "write transaction dropped while open, rolling back");
        }
        if let Err(err) = self.close() {
            warn!(txn = %self.id, error = %err, "failed to close write transaction");
        }
    }
}

impl<G> fmt::Debug for WriteTransaction<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("id", &self.id)
            .field("mode", &self.backend.mode())
            .field("base_version", &self.snapshot.base_version())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
