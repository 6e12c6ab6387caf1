//! Doc parts: one backend table per nesting level of a collection.

use crate::error::{CoreError, CoreResult};
use crate::metainfo::field::{MetaField, MetaScalar};
use crate::metainfo::index::MetaDocPartIndex;
use crate::metainfo::read::MetaDocPartRead;
use crate::metainfo::state::{ChangeTracked, Lookup, MetaElementState, Overlay, Removal};
use crate::metainfo::table_ref::TableRef;
use crate::types::FieldType;
use im::OrdMap;
use std::sync::Arc;

/// Committed, immutable doc part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDocPart {
    table_ref: TableRef,
    identifier: String,
    fields: OrdMap<(String, FieldType), MetaField>,
    scalars: OrdMap<FieldType, MetaScalar>,
    indexes: OrdMap<String, MetaDocPartIndex>,
    last_rid: u64,
}

impl MetaDocPart {
    /// Creates an empty doc part.
    pub fn new(table_ref: TableRef, identifier: impl Into<String>) -> Self {
        Self {
            table_ref,
            identifier: identifier.into(),
            fields: OrdMap::new(),
            scalars: OrdMap::new(),
            indexes: OrdMap::new(),
            last_rid: 0,
        }
    }

    /// Starts building a doc part from scratch.
    pub fn builder(table_ref: TableRef, identifier: impl Into<String>) -> MetaDocPartBuilder {
        MetaDocPartBuilder {
            inner: Self::new(table_ref, identifier),
        }
    }

    /// Starts building a new version of this doc part.
    #[must_use]
    pub fn to_builder(&self) -> MetaDocPartBuilder {
        MetaDocPartBuilder {
            inner: self.clone(),
        }
    }

    /// Number of fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl MetaDocPartRead for MetaDocPart {
    fn table_ref(&self) -> &TableRef {
        &self.table_ref
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn last_rid(&self) -> u64 {
        self.last_rid
    }

    fn field_by_name_and_type(&self, name: &str, field_type: FieldType) -> Option<&MetaField> {
        self.fields.get(&(name.to_owned(), field_type))
    }

    fn field_by_identifier(&self, identifier: &str) -> Option<&MetaField> {
        self.fields.values().find(|f| f.identifier() == identifier)
    }

    fn fields(&self) -> Box<dyn Iterator<Item = &MetaField> + '_> {
        Box::new(self.fields.values())
    }

    fn scalar(&self, field_type: FieldType) -> Option<&MetaScalar> {
        self.scalars.get(&field_type)
    }

    fn scalar_by_identifier(&self, identifier: &str) -> Option<&MetaScalar> {
        self.scalars.values().find(|s| s.identifier() == identifier)
    }

    fn scalars(&self) -> Box<dyn Iterator<Item = &MetaScalar> + '_> {
        Box::new(self.scalars.values())
    }

    fn doc_part_index_by_identifier(&self, identifier: &str) -> Option<&MetaDocPartIndex> {
        self.indexes.get(identifier)
    }

    fn doc_part_indexes(&self) -> Box<dyn Iterator<Item = &MetaDocPartIndex> + '_> {
        Box::new(self.indexes.values())
    }
}

/// Builds a new [`MetaDocPart`], sharing structure with its source.
#[derive(Debug, Clone)]
pub struct MetaDocPartBuilder {
    inner: MetaDocPart,
}

impl MetaDocPartBuilder {
    /// Adds or replaces the field with the same name key.
    pub fn put_field(&mut self, field: MetaField) -> &mut Self {
        let key = (field.name().to_owned(), field.field_type());
        self.inner.fields.insert(key, field);
        self
    }

    /// Removes the field with the given name key.
    pub fn remove_field(&mut self, name: &str, field_type: FieldType) -> &mut Self {
        self.inner.fields.remove(&(name.to_owned(), field_type));
        self
    }

    /// Adds or replaces the scalar column of the same type.
    pub fn put_scalar(&mut self, scalar: MetaScalar) -> &mut Self {
        self.inner.scalars.insert(scalar.field_type(), scalar);
        self
    }

    /// Removes the scalar column of the given type.
    pub fn remove_scalar(&mut self, field_type: FieldType) -> &mut Self {
        self.inner.scalars.remove(&field_type);
        self
    }

    /// Adds or replaces a physical index.
    pub fn put_doc_part_index(&mut self, index: MetaDocPartIndex) -> &mut Self {
        self.inner
            .indexes
            .insert(index.identifier().to_owned(), index);
        self
    }

    /// Removes a physical index.
    pub fn remove_doc_part_index(&mut self, identifier: &str) -> &mut Self {
        self.inner.indexes.remove(identifier);
        self
    }

    /// Raises the row id high-water mark. Lower values are ignored.
    pub fn raise_last_rid(&mut self, rid: u64) -> &mut Self {
        self.inner.last_rid = self.inner.last_rid.max(rid);
        self
    }

    /// Returns the doc part built so far.
    #[must_use]
    pub fn build(&self) -> MetaDocPart {
        self.inner.clone()
    }
}

/// A transaction's working copy of a doc part.
#[derive(Debug, Clone)]
pub struct MutableMetaDocPart {
    base: Arc<MetaDocPart>,
    fields: Overlay<MetaField>,
    scalars: Overlay<MetaScalar>,
    indexes: Overlay<MetaDocPartIndex>,
    last_rid: u64,
}

impl MutableMetaDocPart {
    pub(crate) fn wrap(base: Arc<MetaDocPart>) -> Self {
        let last_rid = base.last_rid;
        Self {
            base,
            fields: Overlay::default(),
            scalars: Overlay::default(),
            indexes: Overlay::default(),
            last_rid,
        }
    }

    pub(crate) fn new(table_ref: TableRef, identifier: &str) -> Self {
        Self::wrap(Arc::new(MetaDocPart::new(table_ref, identifier)))
    }

    /// The committed doc part this copy started from.
    #[must_use]
    pub fn base(&self) -> &MetaDocPart {
        &self.base
    }

    fn column_in_use(&self, identifier: &str) -> bool {
        self.field_by_identifier(identifier).is_some()
            || self.scalar_by_identifier(identifier).is_some()
    }

    /// Adds a field.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if a field with the same name and type, or
    /// any column with the same identifier, already exists.
    pub fn add_meta_field(
        &mut self,
        name: &str,
        identifier: &str,
        field_type: FieldType,
    ) -> CoreResult<&MetaField> {
        if self.field_by_name_and_type(name, field_type).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "doc part {} already has a field {name} of type {field_type}",
                self.base.table_ref
            )));
        }
        if self.column_in_use(identifier) {
            return Err(CoreError::illegal_argument(format!(
                "doc part {} already has a column with identifier {identifier}",
                self.base.table_ref
            )));
        }
        let pos = self.fields.push(
            MetaField::new(name, identifier, field_type),
            MetaElementState::Added,
        );
        self.fields
            .get(pos)
            .ok_or_else(|| CoreError::invalid_operation("field vanished after insert"))
    }

    /// Adds the scalar column for `field_type`.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if the scalar column already exists or the
    /// identifier is taken.
    pub fn add_meta_scalar(&mut self, identifier: &str, field_type: FieldType) -> CoreResult<&MetaScalar> {
        if self.scalar(field_type).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "doc part {} already has a {field_type} scalar",
                self.base.table_ref
            )));
        }
        if self.column_in_use(identifier) {
            return Err(CoreError::illegal_argument(format!(
                "doc part {} already has a column with identifier {identifier}",
                self.base.table_ref
            )));
        }
        let pos = self
            .scalars
            .push(MetaScalar::new(identifier, field_type), MetaElementState::Added);
        self.scalars
            .get(pos)
            .ok_or_else(|| CoreError::invalid_operation("scalar vanished after insert"))
    }

    /// Adds a physical index.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if the identifier is taken, the index has no
    /// columns, or a column does not name a field of this doc part.
    pub fn add_meta_doc_part_index(&mut self, index: MetaDocPartIndex) -> CoreResult<&MetaDocPartIndex> {
        if self.doc_part_index_by_identifier(index.identifier()).is_some() {
            return Err(CoreError::illegal_argument(format!(
                "doc part {} already has an index {}",
                self.base.table_ref,
                index.identifier()
            )));
        }
        if index.columns().is_empty() {
            return Err(CoreError::illegal_argument(format!(
                "doc part index {} has no columns",
                index.identifier()
            )));
        }
        if let Some(column) = index
            .columns()
            .iter()
            .find(|c| self.field_by_identifier(c.identifier()).is_none())
        {
            return Err(CoreError::illegal_argument(format!(
                "doc part index {} references unknown column {}",
                index.identifier(),
                column.identifier()
            )));
        }
        let pos = self.indexes.push(index, MetaElementState::Added);
        self.indexes
            .get(pos)
            .ok_or_else(|| CoreError::invalid_operation("index vanished after insert"))
    }

    /// Removes a physical index. Returns false if it did not exist.
    pub fn remove_meta_doc_part_index_by_identifier(&mut self, identifier: &str) -> bool {
        match self.indexes.remove(|i| i.identifier() == identifier) {
            Removal::Dropped | Removal::Marked => true,
            Removal::NotFound => {
                if self.indexes.is_touched(|i| i.identifier() == identifier) {
                    return false;
                }
                match self.base.indexes.get(identifier) {
                    Some(index) => {
                        self.indexes.push(index.clone(), MetaElementState::Removed);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Records that row ids up to `rid` were handed out.
    pub fn observe_rid(&mut self, rid: u64) {
        self.last_rid = self.last_rid.max(rid);
    }

    pub(crate) fn field_changes(&self) -> impl Iterator<Item = (&MetaField, MetaElementState)> {
        self.fields.changes()
    }

    pub(crate) fn scalar_changes(&self) -> impl Iterator<Item = (&MetaScalar, MetaElementState)> {
        self.scalars.changes()
    }

    pub(crate) fn doc_part_index_changes(
        &self,
    ) -> impl Iterator<Item = (&MetaDocPartIndex, MetaElementState)> {
        self.indexes.changes()
    }
}

impl ChangeTracked for MutableMetaDocPart {
    fn has_changes(&self) -> bool {
        self.fields.has_changes()
            || self.scalars.has_changes()
            || self.indexes.has_changes()
            || self.last_rid > self.base.last_rid
    }
}

impl MetaDocPartRead for MutableMetaDocPart {
    fn table_ref(&self) -> &TableRef {
        &self.base.table_ref
    }

    fn identifier(&self) -> &str {
        &self.base.identifier
    }

    fn last_rid(&self) -> u64 {
        self.last_rid
    }

    fn field_by_name_and_type(&self, name: &str, field_type: FieldType) -> Option<&MetaField> {
        match self.fields.lookup(|f| f.has_key(name, field_type)) {
            Lookup::Alive(field) => Some(field),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.field_by_name_and_type(name, field_type),
        }
    }

    fn field_by_identifier(&self, identifier: &str) -> Option<&MetaField> {
        match self.fields.lookup(|f| f.identifier() == identifier) {
            Lookup::Alive(field) => Some(field),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.field_by_identifier(identifier),
        }
    }

    fn fields(&self) -> Box<dyn Iterator<Item = &MetaField> + '_> {
        let base = self
            .base
            .fields
            .values()
            .filter(move |f| !self.fields.is_touched(|o| o.identifier() == f.identifier()));
        Box::new(base.chain(self.fields.alive()))
    }

    fn scalar(&self, field_type: FieldType) -> Option<&MetaScalar> {
        match self.scalars.lookup(|s| s.field_type() == field_type) {
            Lookup::Alive(scalar) => Some(scalar),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.scalar(field_type),
        }
    }

    fn scalar_by_identifier(&self, identifier: &str) -> Option<&MetaScalar> {
        match self.scalars.lookup(|s| s.identifier() == identifier) {
            Lookup::Alive(scalar) => Some(scalar),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.scalar_by_identifier(identifier),
        }
    }

    fn scalars(&self) -> Box<dyn Iterator<Item = &MetaScalar> + '_> {
        let base = self
            .base
            .scalars
            .values()
            .filter(move |s| !self.scalars.is_touched(|o| o.field_type() == s.field_type()));
        Box::new(base.chain(self.scalars.alive()))
    }

    fn doc_part_index_by_identifier(&self, identifier: &str) -> Option<&MetaDocPartIndex> {
        match self.indexes.lookup(|i| i.identifier() == identifier) {
            Lookup::Alive(index) => Some(index),
            Lookup::Removed => None,
            Lookup::Untouched => self.base.doc_part_index_by_identifier(identifier),
        }
    }

    fn doc_part_indexes(&self) -> Box<dyn Iterator<Item = &MetaDocPartIndex> + '_> {
        let base = self
            .base
            .indexes
            .values()
            .filter(move |i| !self.indexes.is_touched(|o| o.identifier() == i.identifier()));
        Box::new(base.chain(self.indexes.alive()))
    }
}
