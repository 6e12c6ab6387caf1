//! Serializable views of a metadata snapshot.

use crate::metainfo::field::{MetaField, MetaScalar};
use crate::metainfo::index::{MetaDocPartIndex, MetaIndex};
use crate::metainfo::read::{MetaCollectionRead, MetaDatabaseRead, MetaDocPartRead, MetaSnapshotRead};
use crate::metainfo::snapshot::ImmutableMetaSnapshot;
use crate::metainfo::table_ref::TableRef;
use serde::Serialize;

/// A whole snapshot, ready to be printed as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDump {
    /// Snapshot version, if the source was committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Databases, in iteration order of the source.
    pub databases: Vec<DatabaseDump>,
}

/// One database.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseDump {
    /// Database name.
    pub name: String,
    /// Backend identifier.
    pub identifier: String,
    /// Collections.
    pub collections: Vec<CollectionDump>,
}

/// One collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionDump {
    /// Collection name.
    pub name: String,
    /// Backend identifier.
    pub identifier: String,
    /// Identifier of the root doc part, if it exists.
    pub root_doc_part: Option<String>,
    /// Doc parts.
    pub doc_parts: Vec<DocPartDump>,
    /// Logical indexes.
    pub indexes: Vec<MetaIndex>,
}

/// One doc part.
#[derive(Debug, Clone, Serialize)]
pub struct DocPartDump {
    /// Path of the doc part.
    pub table_ref: TableRef,
    /// Backend table identifier.
    pub identifier: String,
    /// Row id high-water mark.
    pub last_rid: u64,
    /// Field columns.
    pub fields: Vec<MetaField>,
    /// Scalar columns.
    pub scalars: Vec<MetaScalar>,
    /// Physical indexes.
    pub indexes: Vec<MetaDocPartIndex>,
}

impl SnapshotDump {
    /// Dumps any snapshot view, committed or in progress.
    #[must_use]
    pub fn from_read(snapshot: &dyn MetaSnapshotRead) -> Self {
        Self {
            version: None,
            databases: snapshot.databases().map(DatabaseDump::from_read).collect(),
        }
    }
}

impl From<&ImmutableMetaSnapshot> for SnapshotDump {
    fn from(snapshot: &ImmutableMetaSnapshot) -> Self {
        Self {
            version: Some(snapshot.version().as_u64()),
            ..Self::from_read(snapshot)
        }
    }
}

impl DatabaseDump {
    fn from_read(database: &dyn MetaDatabaseRead) -> Self {
        Self {
            name: database.name().to_owned(),
            identifier: database.identifier().to_owned(),
            collections: database.collections().map(CollectionDump::from_read).collect(),
        }
    }
}

impl CollectionDump {
    fn from_read(collection: &dyn MetaCollectionRead) -> Self {
        Self {
            name: collection.name().to_owned(),
            identifier: collection.identifier().to_owned(),
            root_doc_part: collection.root_doc_part_identifier().map(str::to_owned),
            doc_parts: collection.doc_parts().map(DocPartDump::from_read).collect(),
            indexes: collection.indexes().cloned().collect(),
        }
    }
}

impl DocPartDump {
    fn from_read(doc_part: &dyn MetaDocPartRead) -> Self {
        Self {
            table_ref: doc_part.table_ref().clone(),
            identifier: doc_part.identifier().to_owned(),
            last_rid: doc_part.last_rid(),
            fields: doc_part.fields().cloned().collect(),
            scalars: doc_part.scalars().cloned().collect(),
            indexes: doc_part.doc_part_indexes().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::collection::MetaCollection;
    use crate::metainfo::database::MetaDatabase;
    use crate::metainfo::doc_part::MetaDocPart;
    use crate::types::FieldType;

    #[test]
    fn dump_serializes_the_tree() {
        let snapshot = ImmutableMetaSnapshot::builder()
            .put_database(
                MetaDatabase::builder("db", "db_id")
                    .put_collection(
                        MetaCollection::builder("col", "col_id")
                            .put_doc_part(
                                MetaDocPart::builder(TableRef::root(), "col_id")
                                    .put_field(MetaField::new("a", "a_i", FieldType::Integer))
                                    .build(),
                            )
                            .build(),
                    )
                    .build(),
            )
            .build();

        let json = serde_json::to_value(SnapshotDump::from(&snapshot)).unwrap();
        assert_eq!(json["version"], 0);
        let collection = &json["databases"][0]["collections"][0];
        assert_eq!(collection["root_doc_part"], "col_id");
        let doc_part = &collection["doc_parts"][0];
        assert_eq!(doc_part["table_ref"], "root");
        assert_eq!(doc_part["fields"][0]["type"], "INTEGER");
    }

    #[test]
    fn in_progress_dump_has_no_version() {
        let snapshot = crate::metainfo::snapshot::MutableMetaSnapshot::new(std::sync::Arc::default());
        let dump = SnapshotDump::from_read(&snapshot);
        assert!(dump.version.is_none());
        assert!(dump.databases.is_empty());
    }
}
