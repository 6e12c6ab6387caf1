//! Optimistic merge of a transaction's metadata changes.
//!
//! A write transaction edits a [`MutableMetaSnapshot`] built over whatever
//! snapshot was current when it started. By the time it commits, other
//! transactions may have installed newer snapshots. [`merge_snapshot`]
//! replays the transaction's changes on top of the latest committed
//! snapshot, level by level, and either produces the successor snapshot or
//! reports the first conflict it finds.
//!
//! Each level (database, collection, doc part, field, scalar, index, doc
//! part index) carries two rule tables, one for added or modified elements
//! and one for removed ones. The first rule whose predicate holds decides
//! the element's fate.

mod index_rules;
mod nodes;
mod result;
mod rule;

pub use result::{ExecutionResult, MergeConflict, NodeKind, RuleId};

use crate::metainfo::snapshot::{ImmutableMetaSnapshot, MutableMetaSnapshot};
use rule::{merge_element, MergeScope};
use tracing::debug;

/// Merges `changes` into `committed`.
///
/// The returned snapshot has the version following `committed` and shares
/// every subtree the changes did not touch. `committed` itself is never
/// modified.
///
/// # Errors
///
/// Returns the first [`MergeConflict`] found, with the path of the element
/// that caused it.
pub fn merge_snapshot(
    committed: &ImmutableMetaSnapshot,
    changes: &MutableMetaSnapshot,
) -> Result<ImmutableMetaSnapshot, MergeConflict> {
    debug!(
        base = %changes.base_version(),
        onto = %committed.version(),
        "merging metadata changes"
    );
    let mut builder = committed.to_builder();
    for (database, state) in changes.modified_databases() {
        let current = builder.build();
        merge_element(&current, database, state, MergeScope::default(), &mut builder)?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::collection::MetaCollection;
    use crate::metainfo::database::MetaDatabase;
    use crate::metainfo::doc_part::MetaDocPart;
    use crate::metainfo::field::MetaField;
    use crate::metainfo::index::{MetaDocPartIndex, MetaIndex};
    use crate::metainfo::read::{MetaCollectionRead, MetaDocPartRead, MetaSnapshotRead};
    use crate::metainfo::table_ref::TableRef;
    use crate::types::FieldIndexOrdering::Asc;
    use crate::types::FieldType;
    use std::sync::Arc;

    fn committed() -> ImmutableMetaSnapshot {
        let root = MetaDocPart::builder(TableRef::root(), "docPartId1")
            .put_field(MetaField::new("fieldName1", "fieldId1", FieldType::Integer))
            .build();
        let collection = MetaCollection::builder("colName1", "colId1")
            .put_doc_part(root)
            .build();
        ImmutableMetaSnapshot::builder()
            .put_database(
                MetaDatabase::builder("dbName1", "dbId1")
                    .put_collection(collection)
                    .build(),
            )
            .build()
    }

    fn over(base: &ImmutableMetaSnapshot) -> MutableMetaSnapshot {
        MutableMetaSnapshot::new(Arc::new(base.clone()))
    }

    fn root_of<'a>(snapshot: &'a ImmutableMetaSnapshot) -> &'a MetaDocPart {
        snapshot
            .database("dbName1")
            .and_then(|d| d.collection("colName1"))
            .and_then(|c| c.doc_part(&TableRef::root()))
            .unwrap()
    }

    #[test]
    fn no_changes_yields_same_content() {
        let base = committed();
        let merged = merge_snapshot(&base, &over(&base)).unwrap();
        assert!(merged.same_content(&base));
        assert_eq!(merged.version(), base.version().next());
    }

    #[test]
    fn untouched_subtrees_are_shared() {
        let mut base = committed();
        base = merge_snapshot(&base, &{
            let mut changes = over(&base);
            changes
                .get_meta_database_by_name_mut("dbName1")
                .unwrap()
                .add_meta_collection("colName2", "colId2")
                .unwrap();
            changes
        })
        .unwrap();

        let mut changes = over(&base);
        changes
            .get_meta_database_by_name_mut("dbName1")
            .unwrap()
            .get_meta_collection_by_name_mut("colName2")
            .unwrap()
            .add_meta_doc_part(TableRef::root(), "colId2")
            .unwrap();
        let merged = merge_snapshot(&base, &changes).unwrap();

        let before = base.database("dbName1").unwrap().collection("colName1").unwrap();
        let after = merged.database("dbName1").unwrap().collection("colName1").unwrap();
        assert!(after.shares_doc_part_with(before, &TableRef::root()));
    }

    #[test]
    fn conflict_path_names_every_level() {
        let base = committed();
        let mut changes = over(&base);
        changes
            .get_meta_database_by_name_mut("dbName1")
            .unwrap()
            .get_meta_collection_by_name_mut("colName1")
            .unwrap()
            .get_meta_doc_part_by_table_ref_mut(&TableRef::root())
            .unwrap()
            .add_meta_field("fieldName2", "fieldId1x", FieldType::Long)
            .unwrap();
        let mut other = over(&base);
        other
            .get_meta_database_by_name_mut("dbName1")
            .unwrap()
            .get_meta_collection_by_name_mut("colName1")
            .unwrap()
            .get_meta_doc_part_by_table_ref_mut(&TableRef::root())
            .unwrap()
            .add_meta_field("fieldName3", "fieldId1x", FieldType::Long)
            .unwrap();

        let merged = merge_snapshot(&base, &changes).unwrap();
        let conflict = merge_snapshot(&merged, &other).unwrap_err();
        assert_eq!(conflict.rule(), RuleId::IdentifierConflict);
        assert_eq!(conflict.path(), ["dbName1", "colName1", "root", "fieldName3"]);
        assert!(conflict
            .message()
            .starts_with("dbName1.colName1.root.fieldName3: there is a previous field"));
    }

    #[test]
    fn last_rid_keeps_the_maximum() {
        let base = committed();
        let mut a = over(&base);
        let mut b = over(&base);
        for (changes, rid) in [(&mut a, 10), (&mut b, 7)] {
            changes
                .get_meta_database_by_name_mut("dbName1")
                .unwrap()
                .get_meta_collection_by_name_mut("colName1")
                .unwrap()
                .get_meta_doc_part_by_table_ref_mut(&TableRef::root())
                .unwrap()
                .observe_rid(rid);
        }
        let first = merge_snapshot(&base, &a).unwrap();
        let second = merge_snapshot(&first, &b).unwrap();
        assert_eq!(root_of(&second).last_rid(), 10);
    }

    #[test]
    fn removed_and_readded_database_is_new() {
        let base = committed();
        let mut changes = over(&base);
        assert!(changes.remove_meta_database_by_name("dbName1"));
        changes.add_meta_database("dbName1", "dbId9").unwrap();
        let merged = merge_snapshot(&base, &changes).unwrap();
        let database = merged.database_by_name("dbName1").unwrap();
        assert_eq!(database.identifier(), "dbId9");
        assert_eq!(database.collections().count(), 0);
    }

    #[test]
    fn index_pair_added_together_merges() {
        let base = committed();
        let mut changes = over(&base);
        let collection = changes
            .get_meta_database_by_name_mut("dbName1")
            .unwrap()
            .get_meta_collection_by_name_mut("colName1")
            .unwrap();
        collection
            .add_meta_index(MetaIndex::new("idx", false).with_field(TableRef::root(), "fieldName1", Asc))
            .unwrap();
        collection
            .get_meta_doc_part_by_table_ref_mut(&TableRef::root())
            .unwrap()
            .add_meta_doc_part_index(MetaDocPartIndex::new("rid_idx", false).with_column("fieldId1", Asc))
            .unwrap();

        let merged = merge_snapshot(&base, &changes).unwrap();
        let collection = merged.database("dbName1").unwrap().collection("colName1").unwrap();
        assert!(collection.index_by_name("idx").is_some());
        assert!(root_of(&merged).doc_part_index_by_identifier("rid_idx").is_some());
    }
}
