//! In-memory backend for testing.

use crate::backend::{BackendConnection, BackendTransaction, TransactionMode};
use crate::error::{BackendError, BackendResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Where an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Opening any transaction.
    Open,
    /// Committing a transaction.
    Commit,
    /// Rolling back a transaction.
    Rollback,
    /// Closing a transaction.
    Close,
}

/// Something that happened on the backend, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// A transaction was opened.
    Opened {
        /// Backend transaction number.
        id: u64,
        /// Mode it was opened in.
        mode: TransactionMode,
    },
    /// A transaction committed.
    Committed {
        /// Backend transaction number.
        id: u64,
    },
    /// A transaction rolled back.
    RolledBack {
        /// Backend transaction number.
        id: u64,
    },
    /// A transaction was closed.
    Closed {
        /// Backend transaction number.
        id: u64,
    },
}

/// Counters describing backend activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Transactions opened.
    pub opened: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions rolled back.
    pub rolled_back: u64,
    /// Transactions closed.
    pub closed: u64,
}

impl BackendStats {
    /// Transactions opened but not yet closed.
    #[must_use]
    pub fn open_now(&self) -> u64 {
        self.opened.saturating_sub(self.closed)
    }
}

#[derive(Debug, Default)]
struct Shared {
    next_id: AtomicU64,
    closed: AtomicBool,
    stats: Mutex<BackendStats>,
    events: Mutex<Vec<BackendEvent>>,
    failures: Mutex<Vec<(FailurePoint, BackendError)>>,
}

impl Shared {
    fn take_failure(&self, point: FailurePoint) -> Option<BackendError> {
        let mut failures = self.failures.lock();
        let pos = failures.iter().position(|(p, _)| *p == point)?;
        Some(failures.remove(pos).1)
    }

    fn record(&self, event: BackendEvent) {
        {
            let mut stats = self.stats.lock();
            match event {
                BackendEvent::Opened { .. } => stats.opened += 1,
                BackendEvent::Committed { .. } => stats.committed += 1,
                BackendEvent::RolledBack { .. } => stats.rolled_back += 1,
                BackendEvent::Closed { .. } => stats.closed += 1,
            }
        }
        self.events.lock().push(event);
    }
}

/// An in-memory backend connection.
///
/// This backend stores nothing; it records what the engine asked of it and
/// can be told to fail at specific points. It is suitable for:
/// - Unit tests
/// - Integration tests of the transaction layer
/// - Stress runs that only exercise metadata merging
///
/// # Thread Safety
///
/// Clones share the same counters, so a clone can be handed to each worker
/// thread while the test inspects the original.
///
/// # Example
///
/// ```rust
/// use docrel_backend::{BackendConnection, BackendError, FailurePoint, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.fail_next(FailurePoint::Commit, BackendError::rollback("contention"));
///
/// let mut txn = backend.open_shared_write_transaction().unwrap();
/// assert!(txn.commit().is_err());
/// txn.close().unwrap();
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
}

impl InMemoryBackend {
    /// Creates a new in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next operation at `point` fail with `error`.
    ///
    /// Failures queue up; each one fires once.
    pub fn fail_next(&self, point: FailurePoint, error: BackendError) {
        self.shared.failures.lock().push((point, error));
    }

    /// Closes the connection. Subsequent opens fail.
    pub fn close_connection(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    /// Returns a copy of the activity counters.
    #[must_use]
    pub fn stats(&self) -> BackendStats {
        *self.shared.stats.lock()
    }

    /// Returns every event recorded so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<BackendEvent> {
        self.shared.events.lock().clone()
    }

    fn open(&self, mode: TransactionMode) -> BackendResult<Box<dyn BackendTransaction>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(BackendError::ConnectionClosed);
        }
        if let Some(err) = self.shared.take_failure(FailurePoint::Open) {
            return Err(err);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.record(BackendEvent::Opened { id, mode });
        Ok(Box::new(MemoryTransaction {
            id,
            mode,
            finished: false,
            closed: false,
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl BackendConnection for InMemoryBackend {
    fn open_read_only_transaction(&self) -> BackendResult<Box<dyn BackendTransaction>> {
        self.open(TransactionMode::ReadOnly)
    }

    fn open_shared_write_transaction(&self) -> BackendResult<Box<dyn BackendTransaction>> {
        self.open(TransactionMode::SharedWrite)
    }

    fn open_exclusive_write_transaction(&self) -> BackendResult<Box<dyn BackendTransaction>> {
        self.open(TransactionMode::ExclusiveWrite)
    }
}

struct MemoryTransaction {
    id: u64,
    mode: TransactionMode,
    finished: bool,
    closed: bool,
    shared: Arc<Shared>,
}

impl MemoryTransaction {
    fn ensure_usable(&self) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::TransactionClosed);
        }
        if self.finished {
            return Err(BackendError::rejected(format!(
                "transaction {} already finished",
                self.id
            )));
        }
        Ok(())
    }
}

impl BackendTransaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn commit(&mut self) -> BackendResult<()> {
        self.ensure_usable()?;
        if let Some(err) = self.shared.take_failure(FailurePoint::Commit) {
            // A failed commit leaves the transaction rolled back
            self.finished = true;
            self.shared.record(BackendEvent::RolledBack { id: self.id });
            return Err(err);
        }
        self.finished = true;
        self.shared.record(BackendEvent::Committed { id: self.id });
        Ok(())
    }

    fn rollback(&mut self) -> BackendResult<()> {
        self.ensure_usable()?;
        self.finished = true;
        if let Some(err) = self.shared.take_failure(FailurePoint::Rollback) {
            return Err(err);
        }
        self.shared.record(BackendEvent::RolledBack { id: self.id });
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::TransactionClosed);
        }
        self.closed = true;
        self.shared.record(BackendEvent::Closed { id: self.id });
        match self.shared.take_failure(FailurePoint::Close) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
