//! Collections: a tree of doc parts plus the logical indexes over them.

use crate::error::{CoreError, CoreResult};
use crate::metainfo::doc_part::{MetaDocPart, MutableMetaDocPart};
use crate::metainfo::index::MetaIndex;
use crate::metainfo::read::{MetaCollectionRead, MetaDocPartRead};
use crate::metainfo::state::{ChangeTracked, Lookup, MetaElementState, Overlay, Removal};
use crate::metainfo::table_ref::TableRef;
use im::OrdMap;
use std::sync::Arc;

/// Committed, immutable collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaCollection {
    name: String,
    identifier: String,
    doc_parts: OrdMap<TableRef, Arc<MetaDocPart>>,
    indexes: OrdMap<String, MetaIndex>,
}

impl MetaCollection {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            doc_parts: OrdMap::new(),
            indexes: OrdMap::new(),
        }
    }

    /// Starts building a collection from scratch.
    pub fn builder(name: impl Into<String>, identifier: impl Into<String>) -> MetaCollectionBuilder {
        MetaCollectionBuilder {
            inner: Self::new(name, identifier),
        }
    }

    /// Starts building a new version of this collection.
    #[must_use]
    pub fn to_builder(&self) -> MetaCollectionBuilder {
        MetaCollectionBuilder {
            inner: self.clone(),
        }
    }

    /// Concrete doc part at `table_ref`.
    #[must_use]
    pub fn doc_part(&self, table_ref: &TableRef) -> Option<&MetaDocPart> {
        self.doc_parts.get(table_ref).map(|d| &**d)
    }

    /// Concrete doc part with the given identifier.
    #[must_use]
    pub fn doc_part_with_identifier(&self, identifier: &str) -> Option<&MetaDocPart> {
        self.doc_parts
            .values()
            .find(|d| d.identifier() == identifier)
            .map(|d| &**d)
    }

    /// Concrete doc parts, ordered by table ref.
    pub fn meta_doc_parts(&self) -> impl Iterator<Item = &MetaDocPart> {
        self.doc_parts.values().map(|d| &**d)
    }

    /// Returns true if both collections hold the same allocation for the doc
    /// part at `table_ref`, i.e. it was carried over unchanged.
    #[must_use]
    pub fn shares_doc_part_with(&self, other: &MetaCollection, table_ref: &TableRef) -> bool {
        match (self.doc_parts.get(table_ref), other.doc_parts.get(table_ref)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl MetaCollectionRead for MetaCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn doc_part_by_table_ref(&self, table_ref: &TableRef) -> Option<&dyn MetaDocPartRead> {
        self.doc_part(table_ref).map(|d| d as &dyn MetaDocPartRead)
    }

    fn doc_part_by_identifier(&self, identifier: &str) -> Option<&dyn MetaDocPartRead> {
        self.doc_part_with_identifier(identifier)
            .map(|d| d as &dyn MetaDocPartRead)
    }

    fn doc_parts(&self) -> Box<dyn Iterator<Item = &dyn MetaDocPartRead> + '_> {
        Box::new(self.meta_doc_parts().map(|d| d as &dyn MetaDocPartRead))
    }

    fn index_by_name(&self, name: &str) -> Option<&MetaIndex> {
        self.indexes.get(name)
    }

    fn indexes(&self) -> Box<dyn Iterator<Item = &MetaIndex> + '_> {
        Box::new(self.indexes.values())
    }
}

/// Builds a new [`MetaCollection`], sharing structure with its source.
#[derive(Debug, Clone)]
pub struct MetaCollectionBuilder {
    inner: MetaCollection,
}

impl MetaCollectionBuilder {
    /// Adds or replaces the doc part at the same table ref.
    pub fn put_doc_part(&mut self, doc_part: MetaDocPart) -> &mut Self {
        self.inner
            .doc_parts
            .insert(doc_part.table_ref().clone(), Arc::new(doc_part));
        self
    }

    /// Removes the doc part at `table_ref`.
    pub fn remove_doc_part(&mut self, table_ref: &TableRef) -> &mut Self {
        self.inner.doc_parts.remove(table_ref);
        self
    }

    /// Adds or replaces the index with the same name.
    pub fn put_index(&mut self, index: MetaIndex) -> &mut Self {
        self.inner.indexes.insert(index.name().to_owned(), index);
        self
    }

    /// Removes the index named `name`.
    pub fn remove_index(&mut self, name: &str) -> &mut Self {
        self.inner.indexes.remove(name);
        self
    }

    /// Returns the collection built so far.
    #[must_use]
    pub fn build(&self) -> MetaCollection {
        self.inner.clone()
    }
}

/// A transaction's working copy of a collection.
#[derive(Debug, Clone)]
pub struct MutableMetaCollection {
    base: Arc<MetaCollection>,
    doc_parts: Overlay<MutableMetaDocPart>,
    indexes: Overlay<MetaIndex>,
}

impl MutableMetaCollection {
    pub(crate) fn wrap(base: Arc<MetaCollection>) -> Self {
        Self {
            base,
            doc_parts: Overlay::default(),
            indexes: Overlay::default(),
        }
    }

    pub(crate) fn new(name: &str, identifier: &str) -> Self {
        Self::wrap(Arc::new(MetaCollection::new(name, identifier)))
    }

    /// The committed collection this copy started from.
    #[must_use]
    pub fn base(&self) -> &MetaCollection {
        &self.base
    }

    /// Adds a doc part and returns its working copy.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if a doc part with the same table ref or
    /// identifier already exists.
    pub fn add_meta_doc_part(
        &mut self,
        table_ref: TableRef,
        identifier: &str,
    ) -> CoreResult<&mut MutableMetaDocPart> {
        if self.doc_part_by_table_ref(&table_ref).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "collection {} already has a doc part at {table_ref}",
                self.base.name
            )));
        }
        if self.doc_part_by_identifier(identifier).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "collection {} already has a doc part with identifier {identifier}",
                self.base.name
            )));
        }
        let pos = self.doc_parts.push(
            MutableMetaDocPart::new(table_ref, identifier),
            MetaElementState::Added,
        );
        self.doc_parts
            .get_mut(pos)
            .ok_or_else(|| CoreError::invalid_operation("doc part vanished after insert"))
    }

    /// Returns the working copy of the doc part at `table_ref`.
    pub fn get_meta_doc_part_by_table_ref_mut(
        &mut self,
        table_ref: &TableRef,
    ) -> Option<&mut MutableMetaDocPart> {
        if let Some(pos) = self.doc_parts.position_alive(|d| d.table_ref() == table_ref) {
            return self.doc_parts.get_mut(pos);
        }
        if self.doc_parts.is_touched(|d| d.table_ref() == table_ref) {
            return None;
        }
        let base = Arc::clone(self.base.doc_parts.get(table_ref)?);
        let pos = self
            .doc_parts
            .push(MutableMetaDocPart::wrap(base), MetaElementState::NotChanged);
        self.doc_parts.get_mut(pos)
    }

    /// Adds a logical index.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if an index with the same name exists or
    /// the index has no fields.
    pub fn add_meta_index(&mut self, index: MetaIndex) -> CoreResult<&MetaIndex> {
        if self.index_by_name(index.name()).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "collection {} already has an index named {}",
                self.base.name,
                index.name()
            )));
        }
        if index.fields().is_empty() {
            return Err(CoreError::illegal_argument(format!(
                "index {} has no fields",
                index.name()
            )));
        }
        let pos = self.indexes.push(index, MetaElementState::Added);
        self.indexes
            .get(pos)
            .ok_or_else(|| CoreError::invalid_operation("index vanished after insert"))
    }

    /// Removes a logical index. Returns false if it did not exist.
    pub fn remove_meta_index_by_name(&mut self, name: &str) -> bool {
        match self.indexes.remove(|i| i.name() == name) {
            Removal::Dropped | Removal::Marked => true,
            Removal::NotFound => {
                if self.indexes.is_touched(|i| i.name() == name) {
                    return false;
                }
                match self.base.indexes.get(name) {
                    Some(index) => {
                        self.indexes.push(index.clone(), MetaElementState::Removed);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Returns true if this transaction removed the index named `name`.
    #[must_use]
    pub fn is_index_removed(&self, name: &str) -> bool {
        self.indexes
            .iter()
            .any(|e| e.state() == MetaElementState::Removed && e.element().name() == name)
    }

    pub(crate) fn doc_part_changes(
        &self,
    ) -> impl Iterator<Item = (&MutableMetaDocPart, MetaElementState)> {
        self.doc_parts.changes()
    }

    pub(crate) fn index_changes(&self) -> impl Iterator<Item = (&MetaIndex, MetaElementState)> {
        self.indexes.changes()
    }
}

impl ChangeTracked for MutableMetaCollection {
    fn has_changes(&self) -> bool {
        self.doc_parts.has_changes() || self.indexes.has_changes()
    }
}

impl MetaCollectionRead for MutableMetaCollection {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn identifier(&self) -> &str {
        &self.base.identifier
    }

    fn doc_part_by_table_ref(&self, table_ref: &TableRef) -> Option<&dyn MetaDocPartRead> {
        match self.doc_parts.lookup(|d| d.table_ref() == table_ref) {
            Lookup::Alive(doc_part) => Some(doc_part as &dyn MetaDocPartRead),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.doc_part_by_table_ref(table_ref),
        }
    }

    fn doc_part_by_identifier(&self, identifier: &str) -> Option<&dyn MetaDocPartRead> {
        match self.doc_parts.lookup(|d| d.identifier() == identifier) {
            Lookup::Alive(doc_part) => Some(doc_part as &dyn MetaDocPartRead),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.doc_part_by_identifier(identifier),
        }
    }

    fn doc_parts(&self) -> Box<dyn Iterator<Item = &dyn MetaDocPartRead> + '_> {
        let base = self
            .base
            .meta_doc_parts()
            .filter(move |d| !self.doc_parts.is_touched(|o| o.table_ref() == d.table_ref()))
            .map(|d| d as &dyn MetaDocPartRead);
        let touched = self.doc_parts.alive().map(|d| d as &dyn MetaDocPartRead);
        Box::new(base.chain(touched))
    }

    fn index_by_name(&self, name: &str) -> Option<&MetaIndex> {
        match self.indexes.lookup(|i| i.name() == name) {
            Lookup::Alive(index) => Some(index),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.index_by_name(name),
        }
    }

    fn indexes(&self) -> Box<dyn Iterator<Item = &MetaIndex> + '_> {
        let base = self
            .base
            .indexes
            .values()
            .filter(move |i| !self.indexes.is_touched(|o| o.name() == i.name()));
        Box::new(base.chain(self.indexes.alive()))
    }
}
