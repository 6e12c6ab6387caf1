//! Versioned home of the committed metadata snapshot.
//!
//! Readers load the current snapshot without locking. Writers start from a
//! mutable overlay of it and hand the overlay back through a merge stage;
//! merges are serialized by a dedicated mutex so each one sees the result
//! of the previous.

use crate::error::CoreResult;
use crate::merge::merge_snapshot;
use crate::metainfo::{ChangeTracked, ImmutableMetaSnapshot, MutableMetaSnapshot};
use crate::types::SnapshotVersion;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Holds the latest committed metadata snapshot.
pub struct MetainfoRepository {
    current: ArcSwap<ImmutableMetaSnapshot>,
    merge_lock: Mutex<()>,
}

impl MetainfoRepository {
    /// Creates a repository holding an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::with_snapshot(ImmutableMetaSnapshot::empty())
    }

    /// Creates a repository seeded with `snapshot`, e.g. one loaded from the
    /// backend at startup.
    #[must_use]
    pub fn with_snapshot(snapshot: ImmutableMetaSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            merge_lock: Mutex::new(()),
        }
    }

    /// Returns the latest committed snapshot.
    #[must_use]
    pub fn current_snapshot(&self) -> Arc<ImmutableMetaSnapshot> {
        self.current.load_full()
    }

    /// Returns the version of the latest committed snapshot.
    #[must_use]
    pub fn current_version(&self) -> SnapshotVersion {
        self.current.load().version()
    }

    /// Captures the current snapshot.
    ///
    /// Everything created from the stage reflects the same committed state,
    /// no matter how many merges finish in the meantime.
    #[must_use]
    pub fn start_snapshot_stage(&self) -> SnapshotStage {
        SnapshotStage {
            snapshot: self.current_snapshot(),
        }
    }

    /// Starts merging `changes` into the latest committed snapshot.
    ///
    /// Blocks until no other merge is running. The merge mutex is held until
    /// the returned stage (or the [`PreparedMerge`] it turns into) is
    /// dropped.
    #[must_use]
    pub fn start_merge<'a, 'c>(&'a self, changes: &'c MutableMetaSnapshot) -> MergerStage<'a, 'c> {
        let guard = self.merge_lock.lock();
        MergerStage {
            repository: self,
            changes,
            guard,
        }
    }

    fn install(&self, snapshot: Arc<ImmutableMetaSnapshot>) {
        debug!(version = %snapshot.version(), "installing metadata snapshot");
        self.current.store(snapshot);
    }
}

impl Default for MetainfoRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetainfoRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetainfoRepository")
            .field("version", &self.current_version())
            .finish_non_exhaustive()
    }
}

/// A committed snapshot captured at one point in time.
#[derive(Debug, Clone)]
pub struct SnapshotStage {
    snapshot: Arc<ImmutableMetaSnapshot>,
}

impl SnapshotStage {
    /// Returns the captured snapshot.
    #[must_use]
    pub fn create_immutable_snapshot(&self) -> Arc<ImmutableMetaSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Returns an empty overlay over the captured snapshot.
    #[must_use]
    pub fn create_mutable_snapshot(&self) -> MutableMetaSnapshot {
        MutableMetaSnapshot::new(Arc::clone(&self.snapshot))
    }

    /// Version of the captured snapshot.
    #[must_use]
    pub fn version(&self) -> SnapshotVersion {
        self.snapshot.version()
    }
}

/// An exclusive right to merge into the repository.
///
/// Dropping the stage without calling [`commit`](Self::commit) abandons the
/// merge.
pub struct MergerStage<'a, 'c> {
    repository: &'a MetainfoRepository,
    changes: &'c MutableMetaSnapshot,
    guard: MutexGuard<'a, ()>,
}

impl<'a> MergerStage<'a, '_> {
    /// Merges the changes and publishes the result.
    ///
    /// # Errors
    ///
    /// Returns `Unmergeable` if the changes conflict with the committed
    /// snapshot; the committed snapshot is left as it was.
    pub fn commit(self) -> CoreResult<Arc<ImmutableMetaSnapshot>> {
        Ok(self.prepare()?.install())
    }

    /// Merges the changes without publishing the result.
    ///
    /// The merge mutex stays held by the returned [`PreparedMerge`], so no
    /// other merge can slip in before it is installed or dropped.
    ///
    /// # Errors
    ///
    /// Returns `Unmergeable` if the changes conflict with the committed
    /// snapshot.
    pub fn prepare(self) -> CoreResult<PreparedMerge<'a>> {
        let committed = self.repository.current_snapshot();
        let merged = if self.changes.has_changes() {
            Arc::new(merge_snapshot(&committed, self.changes)?)
        } else {
            debug!(version = %committed.version(), "no metadata changes to merge");
            committed
        };
        Ok(PreparedMerge {
            repository: self.repository,
            merged,
            _guard: self.guard,
        })
    }
}

impl fmt::Debug for MergerStage<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergerStage")
            .field("base_version", &self.changes.base_version())
            .finish_non_exhaustive()
    }
}

/// A merged snapshot waiting to be published.
///
/// Dropping it without calling [`install`](Self::install) discards the
/// result and releases the merge mutex.
pub struct PreparedMerge<'a> {
    repository: &'a MetainfoRepository,
    merged: Arc<ImmutableMetaSnapshot>,
    _guard: MutexGuard<'a, ()>,
}

impl PreparedMerge<'_> {
    /// The snapshot that [`install`](Self::install) would publish.
    #[must_use]
    pub fn snapshot(&self) -> &Arc<ImmutableMetaSnapshot> {
        &self.merged
    }

    /// Publishes the merged snapshot and releases the merge mutex.
    pub fn install(self) -> Arc<ImmutableMetaSnapshot> {
        if !Arc::ptr_eq(&self.merged, &self.repository.current_snapshot()) {
            self.repository.install(Arc::clone(&self.merged));
        }
        self.merged
    }
}

impl fmt::Debug for PreparedMerge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedMerge")
            .field("version", &self.merged.version())
            .finish_non_exhaustive()
    }
}
