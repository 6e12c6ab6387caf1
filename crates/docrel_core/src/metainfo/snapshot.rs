//! Snapshots: the root of the metadata tree.

use crate::error::{CoreError, CoreResult};
use crate::metainfo::database::{MetaDatabase, MutableMetaDatabase};
use crate::metainfo::read::{MetaDatabaseRead, MetaSnapshotRead};
use crate::metainfo::state::{ChangeTracked, Lookup, MetaElementState, Overlay, Removal};
use crate::types::SnapshotVersion;
use im::OrdMap;
use std::sync::Arc;

/// A committed metadata tree.
///
/// Never mutated after it is published; a later merge supersedes it with a
/// new snapshot that shares every untouched subtree.
#[derive(Debug, Clone)]
pub struct ImmutableMetaSnapshot {
    version: SnapshotVersion,
    databases: OrdMap<String, Arc<MetaDatabase>>,
}

impl ImmutableMetaSnapshot {
    /// Creates an empty snapshot at the initial version.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: SnapshotVersion::INITIAL,
            databases: OrdMap::new(),
        }
    }

    /// Starts building a snapshot from scratch.
    #[must_use]
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder {
            inner: Self::empty(),
        }
    }

    /// Starts building the successor of this snapshot.
    ///
    /// The builder's version is one higher than this one.
    #[must_use]
    pub fn to_builder(&self) -> SnapshotBuilder {
        let mut inner = self.clone();
        inner.version = self.version.next();
        SnapshotBuilder { inner }
    }

    /// Version of this snapshot.
    #[must_use]
    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    /// Concrete database named `name`.
    #[must_use]
    pub fn database(&self, name: &str) -> Option<&MetaDatabase> {
        self.databases.get(name).map(|d| &**d)
    }

    /// Concrete database with the given identifier.
    #[must_use]
    pub fn database_with_identifier(&self, identifier: &str) -> Option<&MetaDatabase> {
        self.databases
            .values()
            .find(|d| d.identifier() == identifier)
            .map(|d| &**d)
    }

    /// Concrete databases, ordered by name.
    pub fn meta_databases(&self) -> impl Iterator<Item = &MetaDatabase> {
        self.databases.values().map(|d| &**d)
    }

    /// Returns true if both snapshots hold the same tree, ignoring versions.
    #[must_use]
    pub fn same_content(&self, other: &ImmutableMetaSnapshot) -> bool {
        self.databases == other.databases
    }
}

impl Default for ImmutableMetaSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl MetaSnapshotRead for ImmutableMetaSnapshot {
    fn database_by_name(&self, name: &str) -> Option<&dyn MetaDatabaseRead> {
        self.database(name).map(|d| d as &dyn MetaDatabaseRead)
    }

    fn database_by_identifier(&self, identifier: &str) -> Option<&dyn MetaDatabaseRead> {
        self.database_with_identifier(identifier)
            .map(|d| d as &dyn MetaDatabaseRead)
    }

    fn databases(&self) -> Box<dyn Iterator<Item = &dyn MetaDatabaseRead> + '_> {
        Box::new(self.meta_databases().map(|d| d as &dyn MetaDatabaseRead))
    }
}

/// Builds a new [`ImmutableMetaSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    inner: ImmutableMetaSnapshot,
}

impl SnapshotBuilder {
    /// Overrides the version of the snapshot being built.
    pub fn version(&mut self, version: SnapshotVersion) -> &mut Self {
        self.inner.version = version;
        self
    }

    /// Adds or replaces the database with the same name.
    pub fn put_database(&mut self, database: MetaDatabase) -> &mut Self {
        self.inner
            .databases
            .insert(database.name().to_owned(), Arc::new(database));
        self
    }

    /// Removes the database named `name`.
    pub fn remove_database(&mut self, name: &str) -> &mut Self {
        self.inner.databases.remove(name);
        self
    }

    /// Returns the snapshot built so far.
    #[must_use]
    pub fn build(&self) -> ImmutableMetaSnapshot {
        self.inner.clone()
    }
}

/// A write transaction's working copy of the metadata tree.
///
/// Nodes are copied into the overlay only when accessed mutably; everything
/// else is read straight from the base snapshot.
#[derive(Debug, Clone)]
pub struct MutableMetaSnapshot {
    base: Arc<ImmutableMetaSnapshot>,
    databases: Overlay<MutableMetaDatabase>,
}

impl MutableMetaSnapshot {
    /// Creates an empty overlay over `base`.
    #[must_use]
    pub fn new(base: Arc<ImmutableMetaSnapshot>) -> Self {
        Self {
            base,
            databases: Overlay::default(),
        }
    }

    /// The snapshot this copy started from.
    #[must_use]
    pub fn base(&self) -> &Arc<ImmutableMetaSnapshot> {
        &self.base
    }

    /// Version of the snapshot this copy started from.
    #[must_use]
    pub fn base_version(&self) -> SnapshotVersion {
        self.base.version
    }

    /// Adds a database and returns its working copy.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if a database with the same name or
    /// identifier already exists.
    pub fn add_meta_database(&mut self, name: &str, identifier: &str) -> CoreResult<&mut MutableMetaDatabase> {
        if self.database_by_name(name).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "there is already a database named {name}"
            )));
        }
        if self.database_by_identifier(identifier).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "there is already a database with identifier {identifier}"
            )));
        }
        let pos = self.databases.push(
            MutableMetaDatabase::new(name, identifier),
            MetaElementState::Added,
        );
        self.databases
            .get_mut(pos)
            .ok_or_else(|| CoreError::invalid_operation("database vanished after insert"))
    }

    /// Returns the working copy of the database named `name`.
    pub fn get_meta_database_by_name_mut(&mut self, name: &str) -> Option<&mut MutableMetaDatabase> {
        if let Some(pos) = self.databases.position_alive(|d| d.name() == name) {
            return self.databases.get_mut(pos);
        }
        if self.databases.is_touched(|d| d.name() == name) {
            return None;
        }
        let base = Arc::clone(self.base.databases.get(name)?);
        let pos = self
            .databases
            .push(MutableMetaDatabase::wrap(base), MetaElementState::NotChanged);
        self.databases.get_mut(pos)
    }

    /// Removes a database. Returns false if it did not exist.
    pub fn remove_meta_database_by_name(&mut self, name: &str) -> bool {
        match self.databases.remove(|d| d.name() == name) {
            Removal::Dropped | Removal::Marked => true,
            Removal::NotFound => {
                if self.databases.is_touched(|d| d.name() == name) {
                    return false;
                }
                match self.base.databases.get(name) {
                    Some(database) => {
                        let wrapped = MutableMetaDatabase::wrap(Arc::clone(database));
                        self.databases.push(wrapped, MetaElementState::Removed);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Databases the merge has to look at, in the order they were touched.
    pub fn modified_databases(&self) -> impl Iterator<Item = (&MutableMetaDatabase, MetaElementState)> {
        self.databases.changes()
    }
}

impl ChangeTracked for MutableMetaSnapshot {
    fn has_changes(&self) -> bool {
        self.databases.has_changes()
    }
}

impl MetaSnapshotRead for MutableMetaSnapshot {
    fn database_by_name(&self, name: &str) -> Option<&dyn MetaDatabaseRead> {
        match self.databases.lookup(|d| d.name() == name) {
            Lookup::Alive(database) => Some(database as &dyn MetaDatabaseRead),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.database_by_name(name),
        }
    }

    fn database_by_identifier(&self, identifier: &str) -> Option<&dyn MetaDatabaseRead> {
        match self.databases.lookup(|d| d.identifier() == identifier) {
            Lookup::Alive(database) => Some(database as &dyn MetaDatabaseRead),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.database_by_identifier(identifier),
        }
    }

    fn databases(&self) -> Box<dyn Iterator<Item = &dyn MetaDatabaseRead> + '_> {
        let base = self
            .base
            .meta_databases()
            .filter(move |d| !self.databases.is_touched(|o| o.name() == d.name()))
            .map(|d| d as &dyn MetaDatabaseRead);
        let touched = self.databases.alive().map(|d| d as &dyn MetaDatabaseRead);
        Box::new(base.chain(touched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::collection::MetaCollection;

    fn committed() -> Arc<ImmutableMetaSnapshot> {
        Arc::new(
            ImmutableMetaSnapshot::builder()
                .put_database(
                    MetaDatabase::builder("dbName1", "dbId1")
                        .put_collection(MetaCollection::new("colName1", "colId1"))
                        .build(),
                )
                .build(),
        )
    }

    #[test]
    fn to_builder_bumps_version() {
        let base = committed();
        let next = base.to_builder().build();
        assert_eq!(next.version(), base.version().next());
        assert!(next.same_content(&base));
    }

    #[test]
    fn mutable_snapshot_starts_clean() {
        let snapshot = MutableMetaSnapshot::new(committed());
        assert!(!snapshot.has_changes());
        assert_eq!(snapshot.databases().count(), 1);
        assert_eq!(snapshot.base_version(), SnapshotVersion::INITIAL);
    }

    #[test]
    fn fluent_additions() {
        let mut snapshot = MutableMetaSnapshot::new(committed());
        snapshot
            .add_meta_database("dbName2", "dbId2")
            .unwrap()
            .add_meta_collection("colName2", "colId2")
            .unwrap();

        let database = snapshot.database_by_name("dbName2").unwrap();
        assert_eq!(database.identifier(), "dbId2");
        assert!(database.collection_by_name("colName2").is_some());
        assert_eq!(snapshot.modified_databases().count(), 1);
    }

    #[test]
    fn nested_edit_marks_database_modified() {
        let mut snapshot = MutableMetaSnapshot::new(committed());
        snapshot
            .get_meta_database_by_name_mut("dbName1")
            .unwrap()
            .add_meta_collection("colName2", "colId2")
            .unwrap();
        let states: Vec<_> = snapshot.modified_databases().map(|(_, s)| s).collect();
        assert_eq!(states, vec![MetaElementState::Modified]);
        // the base is untouched
        assert!(snapshot.base().database("dbName1").unwrap().collection("colName2").is_none());
    }

    #[test]
    fn duplicate_database_is_rejected() {
        let mut snapshot = MutableMetaSnapshot::new(committed());
        assert!(matches!(
            snapshot.add_meta_database("dbName1", "other"),
            Err(CoreError::IllegalArgument { .. })
        ));
        assert!(matches!(
            snapshot.add_meta_database("other", "dbId1"),
            Err(CoreError::IllegalArgument { .. })
        ));
    }

    #[test]
    fn remove_database() {
        let mut snapshot = MutableMetaSnapshot::new(committed());
        assert!(snapshot.remove_meta_database_by_name("dbName1"));
        assert!(snapshot.database_by_name("dbName1").is_none());
        assert!(!snapshot.remove_meta_database_by_name("dbName1"));
        assert!(!snapshot.remove_meta_database_by_name("missing"));
        let states: Vec<_> = snapshot.modified_databases().map(|(_, s)| s).collect();
        assert_eq!(states, vec![MetaElementState::Removed]);
    }
}
