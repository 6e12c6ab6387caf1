//! # docrel Core
//!
//! Metadata engine for a document store on top of a relational backend.
//!
//! Documents are shredded into tables: every collection maps to a tree of
//! doc parts, every doc part to a table, every (field name, type) pair to a
//! column. That mapping grows as documents are written, from many
//! transactions at once. This crate keeps it consistent.
//!
//! This crate provides:
//! - The metadata tree, as immutable committed snapshots and copy-on-write
//!   overlays for writers
//! - A rule-driven merge that replays a writer's changes onto whatever was
//!   committed since it started
//! - A repository that publishes one snapshot version after another
//! - Read-only, shared-write and exclusive-write transactions
//! - Deterministic identifier derivation and row id reservation
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use docrel_backend::InMemoryBackend;
//! use docrel_core::{
//!     Config, FieldType, InternalTransactionManager, MetaSnapshotRead, MetainfoRepository,
//!     TableRef,
//! };
//!
//! let manager = InternalTransactionManager::new(Arc::new(MetainfoRepository::new()), Config::default());
//! let backend = InMemoryBackend::new();
//!
//! let mut txn = manager.open_shared_write_transaction(&backend).unwrap();
//! let field = txn
//!     .get_or_create_field("shop", "orders", &TableRef::root(), "price", FieldType::Double)
//!     .unwrap();
//! assert_eq!(field.identifier(), "price_d");
//! txn.commit().unwrap();
//! txn.close().unwrap();
//!
//! let snapshot = manager.repository().current_snapshot();
//! assert!(snapshot.database_by_name("shop").is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod merge;
pub mod metainfo;
mod repository;
mod retry;
mod transaction;
mod types;

pub use config::{Config, RetryPolicy};
pub use error::{CoreError, CoreResult};
pub use merge::{merge_snapshot, ExecutionResult, MergeConflict, NodeKind, RuleId};
pub use metainfo::{
    ChangeTracked, IdentifierFactory, ImmutableMetaSnapshot, MetaCollection, MetaCollectionRead,
    MetaDatabase, MetaDatabaseRead, MetaDocPart, MetaDocPartIndex, MetaDocPartRead, MetaField,
    MetaIndex, MetaScalar, MetaSnapshotRead, MetaElementState, MutableMetaCollection,
    MutableMetaDatabase, MutableMetaDocPart, MutableMetaSnapshot, RidGenerator, SnapshotDump,
    TableRef,
};
pub use repository::{MergerStage, MetainfoRepository, PreparedMerge, SnapshotStage};
pub use retry::{Retrier, RetryHint};
pub use transaction::{
    ExclusiveWriteTransaction, InternalTransactionManager, ReadOnlyTransaction,
    SharedWriteTransaction, TransactionState, WriteTransaction,
};
pub use types::{FieldIndexOrdering, FieldType, SnapshotVersion, TransactionId};
