//! Read-only views shared by immutable and mutable metadata nodes.
//!
//! Code that only inspects metadata (the identifier factory, index
//! compatibility checks, snapshot dumps) takes these traits so that it works
//! the same on a committed snapshot and on a transaction's working copy.

use crate::metainfo::field::{MetaField, MetaScalar};
use crate::metainfo::index::{MetaDocPartIndex, MetaIndex};
use crate::metainfo::table_ref::TableRef;
use crate::types::FieldType;

/// Read access to a doc part.
pub trait MetaDocPartRead {
    /// Path of the doc part inside its collection.
    fn table_ref(&self) -> &TableRef;

    /// Backend table identifier.
    fn identifier(&self) -> &str;

    /// Highest row id handed out so far.
    fn last_rid(&self) -> u64;

    /// Looks up a field by its name key.
    fn field_by_name_and_type(&self, name: &str, field_type: FieldType) -> Option<&MetaField>;

    /// Looks up a field by column identifier.
    fn field_by_identifier(&self, identifier: &str) -> Option<&MetaField>;

    /// All fields.
    fn fields(&self) -> Box<dyn Iterator<Item = &MetaField> + '_>;

    /// Looks up the scalar column of the given type.
    fn scalar(&self, field_type: FieldType) -> Option<&MetaScalar>;

    /// Looks up a scalar column by identifier.
    fn scalar_by_identifier(&self, identifier: &str) -> Option<&MetaScalar>;

    /// All scalar columns.
    fn scalars(&self) -> Box<dyn Iterator<Item = &MetaScalar> + '_>;

    /// Looks up a physical index by identifier.
    fn doc_part_index_by_identifier(&self, identifier: &str) -> Option<&MetaDocPartIndex>;

    /// All physical indexes.
    fn doc_part_indexes(&self) -> Box<dyn Iterator<Item = &MetaDocPartIndex> + '_>;

    /// All fields stored under `name`, whatever their type.
    fn fields_by_name<'a>(&'a self, name: &'a str) -> Box<dyn Iterator<Item = &'a MetaField> + 'a> {
        Box::new(self.fields().filter(move |f| f.name() == name))
    }
}

/// Read access to a collection.
pub trait MetaCollectionRead {
    /// Collection name.
    fn name(&self) -> &str;

    /// Backend identifier.
    fn identifier(&self) -> &str;

    /// Looks up a doc part by path.
    fn doc_part_by_table_ref(&self, table_ref: &TableRef) -> Option<&dyn MetaDocPartRead>;

    /// Looks up a doc part by backend identifier.
    fn doc_part_by_identifier(&self, identifier: &str) -> Option<&dyn MetaDocPartRead>;

    /// All doc parts.
    fn doc_parts(&self) -> Box<dyn Iterator<Item = &dyn MetaDocPartRead> + '_>;

    /// Looks up a logical index by name.
    fn index_by_name(&self, name: &str) -> Option<&MetaIndex>;

    /// All logical indexes.
    fn indexes(&self) -> Box<dyn Iterator<Item = &MetaIndex> + '_>;

    /// Identifier of the root doc part, once it exists.
    fn root_doc_part_identifier(&self) -> Option<&str> {
        self.doc_part_by_table_ref(&TableRef::root())
            .map(|doc_part| doc_part.identifier())
    }
}

/// Read access to a database.
pub trait MetaDatabaseRead {
    /// Database name.
    fn name(&self) -> &str;

    /// Backend identifier.
    fn identifier(&self) -> &str;

    /// Looks up a collection by name.
    fn collection_by_name(&self, name: &str) -> Option<&dyn MetaCollectionRead>;

    /// Looks up a collection by backend identifier.
    fn collection_by_identifier(&self, identifier: &str) -> Option<&dyn MetaCollectionRead>;

    /// All collections.
    fn collections(&self) -> Box<dyn Iterator<Item = &dyn MetaCollectionRead> + '_>;
}

/// Read access to a whole snapshot.
pub trait MetaSnapshotRead {
    /// Looks up a database by name.
    fn database_by_name(&self, name: &str) -> Option<&dyn MetaDatabaseRead>;

    /// Looks up a database by backend identifier.
    fn database_by_identifier(&self, identifier: &str) -> Option<&dyn MetaDatabaseRead>;

    /// All databases.
    fn databases(&self) -> Box<dyn Iterator<Item = &dyn MetaDatabaseRead> + '_>;
}
