//! Transactions over the metadata repository.
//!
//! docrel classifies every transaction up front:
//! - **Read-only**: no lock, reads one committed snapshot for its lifetime
//! - **Shared write**: runs alongside other shared writers; conflicting
//!   metadata changes are caught by the merge at commit
//! - **Exclusive write**: runs alone, for changes that cannot be merged
//!   optimistically
//!
//! Whatever the kind, a transaction must end with `close()`. Dropping an
//! open writer rolls it back.

mod manager;
mod read_only;
mod state;
mod write;

pub use manager::InternalTransactionManager;
pub use read_only::ReadOnlyTransaction;
pub use state::TransactionState;
pub use write::{ExclusiveWriteTransaction, SharedWriteTransaction, WriteTransaction};
