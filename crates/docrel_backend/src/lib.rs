//! # docrel Backend
//!
//! Backend connection abstraction for docrel.
//!
//! The metadata engine never talks SQL. It only needs a way to open a
//! transaction on the relational backend in one of three modes and to
//! commit, roll back or close it. Everything else (DDL, row translation,
//! dialect quirks) lives behind these traits.
//!
//! ## Design Principles
//!
//! - Connections are `Send + Sync` and hand out boxed transactions
//! - A backend transaction is driven by exactly one docrel transaction
//! - Transient failures surface as [`BackendError::Rollback`]
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing, with failure injection and accounting
//!
//! ## Example
//!
//! ```rust
//! use docrel_backend::{BackendConnection, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! let mut txn = backend.open_shared_write_transaction().unwrap();
//! txn.commit().unwrap();
//! txn.close().unwrap();
//! assert_eq!(backend.stats().committed, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;

pub use backend::{BackendConnection, BackendTransaction, TransactionMode};
pub use error::{BackendError, BackendResult};
pub use memory::{BackendEvent, BackendStats, FailurePoint, InMemoryBackend};
