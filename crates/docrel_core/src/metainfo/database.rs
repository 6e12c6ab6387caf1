//! Databases: named groups of collections.

use crate::error::{CoreError, CoreResult};
use crate::metainfo::collection::{MetaCollection, MutableMetaCollection};
use crate::metainfo::read::{MetaCollectionRead, MetaDatabaseRead};
use crate::metainfo::state::{ChangeTracked, Lookup, MetaElementState, Overlay, Removal};
use im::OrdMap;
use std::sync::Arc;

/// Committed, immutable database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDatabase {
    name: String,
    identifier: String,
    collections: OrdMap<String, Arc<MetaCollection>>,
}

impl MetaDatabase {
    /// Creates an empty database.
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            collections: OrdMap::new(),
        }
    }

    /// Starts building a database from scratch.
    pub fn builder(name: impl Into<String>, identifier: impl Into<String>) -> MetaDatabaseBuilder {
        MetaDatabaseBuilder {
            inner: Self::new(name, identifier),
        }
    }

    /// Starts building a new version of this database.
    #[must_use]
    pub fn to_builder(&self) -> MetaDatabaseBuilder {
        MetaDatabaseBuilder {
            inner: self.clone(),
        }
    }

    /// Concrete collection named `name`.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&MetaCollection> {
        self.collections.get(name).map(|c| &**c)
    }

    /// Concrete collection with the given identifier.
    #[must_use]
    pub fn collection_with_identifier(&self, identifier: &str) -> Option<&MetaCollection> {
        self.collections
            .values()
            .find(|c| c.identifier() == identifier)
            .map(|c| &**c)
    }

    /// Concrete collections, ordered by name.
    pub fn meta_collections(&self) -> impl Iterator<Item = &MetaCollection> {
        self.collections.values().map(|c| &**c)
    }
}

impl MetaDatabaseRead for MetaDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn collection_by_name(&self, name: &str) -> Option<&dyn MetaCollectionRead> {
        self.collection(name).map(|c| c as &dyn MetaCollectionRead)
    }

    fn collection_by_identifier(&self, identifier: &str) -> Option<&dyn MetaCollectionRead> {
        self.collection_with_identifier(identifier)
            .map(|c| c as &dyn MetaCollectionRead)
    }

    fn collections(&self) -> Box<dyn Iterator<Item = &dyn MetaCollectionRead> + '_> {
        Box::new(self.meta_collections().map(|c| c as &dyn MetaCollectionRead))
    }
}

/// Builds a new [`MetaDatabase`], sharing structure with its source.
#[derive(Debug, Clone)]
pub struct MetaDatabaseBuilder {
    inner: MetaDatabase,
}

impl MetaDatabaseBuilder {
    /// Adds or replaces the collection with the same name.
    pub fn put_collection(&mut self, collection: MetaCollection) -> &mut Self {
        self.inner
            .collections
            .insert(collection.name().to_owned(), Arc::new(collection));
        self
    }

    /// Removes the collection named `name`.
    pub fn remove_collection(&mut self, name: &str) -> &mut Self {
        self.inner.collections.remove(name);
        self
    }

    /// Returns the database built so far.
    #[must_use]
    pub fn build(&self) -> MetaDatabase {
        self.inner.clone()
    }
}

/// A transaction's working copy of a database.
#[derive(Debug, Clone)]
pub struct MutableMetaDatabase {
    base: Arc<MetaDatabase>,
    collections: Overlay<MutableMetaCollection>,
}

impl MutableMetaDatabase {
    pub(crate) fn wrap(base: Arc<MetaDatabase>) -> Self {
        Self {
            base,
            collections: Overlay::default(),
        }
    }

    pub(crate) fn new(name: &str, identifier: &str) -> Self {
        Self::wrap(Arc::new(MetaDatabase::new(name, identifier)))
    }

    /// The committed database this copy started from.
    #[must_use]
    pub fn base(&self) -> &MetaDatabase {
        &self.base
    }

    /// Adds a collection and returns its working copy.
    ///
    /// The root doc part is not created; add it with
    /// [`MutableMetaCollection::add_meta_doc_part`].
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if a collection with the same name or
    /// identifier already exists.
    pub fn add_meta_collection(
        &mut self,
        name: &str,
        identifier: &str,
    ) -> CoreResult<&mut MutableMetaCollection> {
        if self.collection_by_name(name).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "database {} already has a collection named {name}",
                self.base.name
            )));
        }
        if self.collection_by_identifier(identifier).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "database {} already has a collection with identifier {identifier}",
                self.base.name
            )));
        }
        let pos = self.collections.push(
            MutableMetaCollection::new(name, identifier),
            MetaElementState::Added,
        );
        self.collections
            .get_mut(pos)
            .ok_or_else(|| CoreError::invalid_operation("collection vanished after insert"))
    }

    /// Returns the working copy of the collection named `name`.
    pub fn get_meta_collection_by_name_mut(&mut self, name: &str) -> Option<&mut MutableMetaCollection> {
        if let Some(pos) = self.collections.position_alive(|c| c.name() == name) {
            return self.collections.get_mut(pos);
        }
        if self.collections.is_touched(|c| c.name() == name) {
            return None;
        }
        let base = Arc::clone(self.base.collections.get(name)?);
        let pos = self
            .collections
            .push(MutableMetaCollection::wrap(base), MetaElementState::NotChanged);
        self.collections.get_mut(pos)
    }

    /// Removes a collection. Returns false if it did not exist.
    pub fn remove_meta_collection_by_name(&mut self, name: &str) -> bool {
        match self.collections.remove(|c| c.name() == name) {
            Removal::Dropped | Removal::Marked => true,
            Removal::NotFound => {
                if self.collections.is_touched(|c| c.name() == name) {
                    return false;
                }
                match self.base.collections.get(name) {
                    Some(collection) => {
                        let wrapped = MutableMetaCollection::wrap(Arc::clone(collection));
                        self.collections.push(wrapped, MetaElementState::Removed);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    pub(crate) fn collection_changes(
        &self,
    ) -> impl Iterator<Item = (&MutableMetaCollection, MetaElementState)> {
        self.collections.changes()
    }
}

impl ChangeTracked for MutableMetaDatabase {
    fn has_changes(&self) -> bool {
        self.collections.has_changes()
    }
}

impl MetaDatabaseRead for MutableMetaDatabase {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn identifier(&self) -> &str {
        &self.base.identifier
    }

    fn collection_by_name(&self, name: &str) -> Option<&dyn MetaCollectionRead> {
        match self.collections.lookup(|c| c.name() == name) {
            Lookup::Alive(collection) => Some(collection as &dyn MetaCollectionRead),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.collection_by_name(name),
        }
    }

    fn collection_by_identifier(&self, identifier: &str) -> Option<&dyn MetaCollectionRead> {
        match self.collections.lookup(|c| c.identifier() == identifier) {
            Lookup::Alive(collection) => Some(collection as &dyn MetaCollectionRead),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.collection_by_identifier(identifier),
        }
    }

    fn collections(&self) -> Box<dyn Iterator<Item = &dyn MetaCollectionRead> + '_> {
        let base = self
            .base
            .meta_collections()
            .filter(move |c| !self.collections.is_touched(|o| o.name() == c.name()))
            .map(|c| c as &dyn MetaCollectionRead);
        let touched = self
            .collections
            .alive()
            .map(|c| c as &dyn MetaCollectionRead);
        Box::new(base.chain(touched))
    }
}
