//! Merge rule tests against a committed sample snapshot.
//!
//! Changes are built the way a transaction that started from nothing would
//! build them: on an overlay over an empty snapshot.

use docrel_core::{
    merge_snapshot, FieldIndexOrdering::Asc, FieldType, ImmutableMetaSnapshot, MergeConflict,
    MetaCollectionRead, MetaDatabaseRead, MetaDocPart, MetaDocPartIndex, MetaDocPartRead, MetaIndex,
    MetaSnapshotRead, MutableMetaCollection, MutableMetaDocPart, MutableMetaSnapshot, RuleId, TableRef,
};
use docrel_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

fn collection_of(overlay: &mut MutableMetaSnapshot) -> &mut MutableMetaCollection {
    overlay
        .add_meta_database(DB_NAME, DB_ID)
        .unwrap()
        .add_meta_collection(COL_NAME, COL_ID)
        .unwrap()
}

fn root_of(overlay: &mut MutableMetaSnapshot) -> &mut MutableMetaDocPart {
    collection_of(overlay)
        .add_meta_doc_part(TableRef::root(), DOC_PART_ID)
        .unwrap()
}

fn over(base: &ImmutableMetaSnapshot) -> MutableMetaSnapshot {
    MutableMetaSnapshot::new(Arc::new(base.clone()))
}

fn committed_root(snapshot: &ImmutableMetaSnapshot) -> &MetaDocPart {
    snapshot
        .database(DB_NAME)
        .and_then(|d| d.collection(COL_NAME))
        .and_then(|c| c.doc_part(&TableRef::root()))
        .unwrap()
}

fn conflict(changes: &MutableMetaSnapshot) -> MergeConflict {
    merge_snapshot(&sample_snapshot(), changes).unwrap_err()
}

/// The sample snapshot plus a logical index on `fieldName1` and the
/// physical index implementing it.
fn indexed_snapshot() -> ImmutableMetaSnapshot {
    let base = sample_snapshot();
    let collection = base.database(DB_NAME).unwrap().collection(COL_NAME).unwrap();
    let root = committed_root(&base)
        .to_builder()
        .put_doc_part_index(MetaDocPartIndex::new("idx_field", false).with_column(FIELD_ID, Asc))
        .build();
    let collection = collection
        .to_builder()
        .put_doc_part(root)
        .put_index(MetaIndex::new("idx", false).with_field(TableRef::root(), FIELD_NAME, Asc))
        .build();
    let database = base
        .database(DB_NAME)
        .unwrap()
        .to_builder()
        .put_collection(collection)
        .build();
    base.to_builder().put_database(database).build()
}

fn collection_in(changes: &mut MutableMetaSnapshot) -> &mut MutableMetaCollection {
    changes
        .get_meta_database_by_name_mut(DB_NAME)
        .and_then(|d| d.get_meta_collection_by_name_mut(COL_NAME))
        .unwrap()
}

fn root_in(changes: &mut MutableMetaSnapshot) -> &mut MutableMetaDocPart {
    collection_in(changes)
        .get_meta_doc_part_by_table_ref_mut(&TableRef::root())
        .unwrap()
}

/// `base` with one more committed logical index.
fn with_index(base: &ImmutableMetaSnapshot, index: MetaIndex) -> ImmutableMetaSnapshot {
    let database = base.database(DB_NAME).unwrap();
    let collection = database
        .collection(COL_NAME)
        .unwrap()
        .to_builder()
        .put_index(index)
        .build();
    let database = database.to_builder().put_collection(collection).build();
    base.to_builder().put_database(database).build()
}

fn root_index(name: &str, field: &str) -> MetaIndex {
    MetaIndex::new(name, false).with_field(TableRef::root(), field, Asc)
}

#[test]
fn redeclaring_committed_tree_changes_nothing() {
    let base = sample_snapshot();
    let merged = merge_snapshot(&base, &redeclare(&base)).unwrap();
    assert!(merged.same_content(&base));
}

#[test]
fn database_name_collision_is_rejected() {
    let mut changes = empty_overlay();
    changes.add_meta_database(DB_NAME, "dbIdX").unwrap();
    let conflict = conflict(&changes);
    assert_eq!(conflict.rule(), RuleId::NameConflict);
    assert_eq!(conflict.path(), [DB_NAME]);
}

#[test]
fn collection_name_collision_is_rejected() {
    let mut changes = empty_overlay();
    changes
        .add_meta_database(DB_NAME, DB_ID)
        .unwrap()
        .add_meta_collection(COL_NAME, "colIdX")
        .unwrap();
    let conflict = conflict(&changes);
    assert_eq!(conflict.rule(), RuleId::NameConflict);
    assert_eq!(conflict.path(), [DB_NAME, COL_NAME]);
}

#[test]
fn doc_part_name_collision_is_rejected() {
    let mut changes = empty_overlay();
    collection_of(&mut changes)
        .add_meta_doc_part(TableRef::root(), "docPartIdX")
        .unwrap();
    assert_eq!(conflict(&changes).rule(), RuleId::NameConflict);
}

#[test]
fn field_name_collision_is_rejected() {
    let mut changes = empty_overlay();
    root_of(&mut changes)
        .add_meta_field(FIELD_NAME, "fieldIdX", FieldType::Integer)
        .unwrap();
    let conflict = conflict(&changes);
    assert_eq!(conflict.rule(), RuleId::NameConflict);
    assert_eq!(conflict.path(), [DB_NAME, COL_NAME, "root", FIELD_NAME]);
}

#[test]
fn database_identifier_collision_is_rejected() {
    let mut changes = empty_overlay();
    changes.add_meta_database("dbNameX", DB_ID).unwrap();
    assert_eq!(conflict(&changes).rule(), RuleId::IdentifierConflict);
}

#[test]
fn collection_identifier_collision_is_rejected() {
    let mut changes = empty_overlay();
    changes
        .add_meta_database(DB_NAME, DB_ID)
        .unwrap()
        .add_meta_collection("colNameX", COL_ID)
        .unwrap();
    assert_eq!(conflict(&changes).rule(), RuleId::IdentifierConflict);
}

#[test]
fn doc_part_identifier_collision_is_rejected() {
    let mut changes = empty_overlay();
    collection_of(&mut changes)
        .add_meta_doc_part(TableRef::root().child("other"), DOC_PART_ID)
        .unwrap();
    assert_eq!(conflict(&changes).rule(), RuleId::IdentifierConflict);
}

#[test]
fn field_identifier_collision_is_rejected() {
    let mut changes = empty_overlay();
    root_of(&mut changes)
        .add_meta_field("fieldNameX", FIELD_ID, FieldType::Integer)
        .unwrap();
    assert_eq!(conflict(&changes).rule(), RuleId::IdentifierConflict);
}

#[test]
fn scalar_identifier_collision_is_rejected() {
    let mut changes = empty_overlay();
    root_of(&mut changes)
        .add_meta_scalar(SCALAR_ID, FieldType::Long)
        .unwrap();
    assert_eq!(conflict(&changes).rule(), RuleId::IdentifierConflict);
}

#[test]
fn field_with_new_name_and_type_merges() {
    let mut changes = empty_overlay();
    root_of(&mut changes)
        .add_meta_field("fieldName2", "fieldId2", FieldType::String)
        .unwrap();
    let merged = merge_snapshot(&sample_snapshot(), &changes).unwrap();
    let root = committed_root(&merged);
    assert_eq!(root.fields().count(), 2);
    assert!(root.field_by_name_and_type(FIELD_NAME, FieldType::Integer).is_some());
    assert!(root.field_by_name_and_type("fieldName2", FieldType::String).is_some());
}

#[test]
fn orphan_doc_part_index_is_rejected() {
    let mut changes = empty_overlay();
    let root = root_of(&mut changes);
    root.add_meta_field(FIELD_NAME, FIELD_ID, FieldType::Integer).unwrap();
    root.add_meta_doc_part_index(MetaDocPartIndex::new("orphan", false).with_column(FIELD_ID, Asc))
        .unwrap();
    let conflict = conflict(&changes);
    assert_eq!(conflict.rule(), RuleId::OrphanDocPartIndex);
    assert_eq!(conflict.path().last().map(String::as_str), Some("orphan"));
}

#[test]
fn doc_part_index_justified_by_committed_index_merges() {
    let base = with_index(&sample_snapshot(), root_index("idx", FIELD_NAME));
    assert!(committed_root(&base).doc_part_index_by_identifier("idx_field").is_none());

    let mut changes = empty_overlay();
    let root = root_of(&mut changes);
    root.add_meta_field(FIELD_NAME, FIELD_ID, FieldType::Integer).unwrap();
    root.add_meta_doc_part_index(MetaDocPartIndex::new("idx_field", false).with_column(FIELD_ID, Asc))
        .unwrap();

    let merged = merge_snapshot(&base, &changes).unwrap();
    assert!(committed_root(&merged).doc_part_index_by_identifier("idx_field").is_some());
}

#[test]
fn removing_referenced_doc_part_index_is_rejected() {
    let base = indexed_snapshot();
    let mut changes = over(&base);
    assert!(changes
        .get_meta_database_by_name_mut(DB_NAME)
        .and_then(|d| d.get_meta_collection_by_name_mut(COL_NAME))
        .and_then(|c| c.get_meta_doc_part_by_table_ref_mut(&TableRef::root()))
        .unwrap()
        .remove_meta_doc_part_index_by_identifier("idx_field"));

    let conflict = merge_snapshot(&base, &changes).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::StillReferenced);
}

#[test]
fn removing_doc_part_index_with_its_index_succeeds() {
    let base = indexed_snapshot();
    let mut changes = over(&base);
    let collection = changes
        .get_meta_database_by_name_mut(DB_NAME)
        .and_then(|d| d.get_meta_collection_by_name_mut(COL_NAME))
        .unwrap();
    assert!(collection.remove_meta_index_by_name("idx"));
    assert!(collection
        .get_meta_doc_part_by_table_ref_mut(&TableRef::root())
        .unwrap()
        .remove_meta_doc_part_index_by_identifier("idx_field"));

    let merged = merge_snapshot(&base, &changes).unwrap();
    let collection = merged.database(DB_NAME).unwrap().collection(COL_NAME).unwrap();
    assert!(collection.index_by_name("idx").is_none());
    assert!(committed_root(&merged).doc_part_index_by_identifier("idx_field").is_none());
}

#[test]
fn removing_the_only_compatible_index_is_rejected() {
    let base = indexed_snapshot();
    let mut changes = over(&base);
    assert!(changes
        .get_meta_database_by_name_mut(DB_NAME)
        .and_then(|d| d.get_meta_collection_by_name_mut(COL_NAME))
        .unwrap()
        .remove_meta_index_by_name("idx"));

    let conflict = merge_snapshot(&base, &changes).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::OrphansDocPartIndex);
}

#[test]
fn index_duplicating_a_definition_is_rejected() {
    let base = indexed_snapshot();
    let mut changes = over(&base);
    changes
        .get_meta_database_by_name_mut(DB_NAME)
        .and_then(|d| d.get_meta_collection_by_name_mut(COL_NAME))
        .unwrap()
        .add_meta_index(MetaIndex::new("idx_copy", false).with_field(TableRef::root(), FIELD_NAME, Asc))
        .unwrap();

    let conflict = merge_snapshot(&base, &changes).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::ConflictingIndex);
}

#[test]
fn index_redefined_under_same_name_is_rejected() {
    let base = indexed_snapshot();
    let mut changes = empty_overlay();
    collection_of(&mut changes)
        .add_meta_index(MetaIndex::new("idx", true).with_field(TableRef::root(), FIELD_NAME, Asc))
        .unwrap();

    let conflict = merge_snapshot(&base, &changes).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::AttributeConflict);
}

// Two transactions opened on the same base: the first one commits, the
// second is merged onto its result.

#[test]
fn doc_part_index_for_a_concurrently_removed_index_is_orphan() {
    let base = with_index(&sample_snapshot(), root_index("idx", FIELD_NAME));

    let mut drop_index = over(&base);
    assert!(collection_in(&mut drop_index).remove_meta_index_by_name("idx"));
    let mut build_index = over(&base);
    root_in(&mut build_index)
        .add_meta_doc_part_index(MetaDocPartIndex::new("idx_field", false).with_column(FIELD_ID, Asc))
        .unwrap();

    assert!(merge_snapshot(&base, &build_index).is_ok());
    let committed = merge_snapshot(&base, &drop_index).unwrap();
    let conflict = merge_snapshot(&committed, &build_index).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::OrphanDocPartIndex);
    assert_eq!(conflict.path().last().map(String::as_str), Some("idx_field"));
}

#[test]
fn removing_an_index_after_its_twin_was_removed_is_rejected() {
    let spanning = root_index("idx_items", FIELD_NAME).with_field(TableRef::root().child("items"), "price", Asc);
    let base = with_index(&indexed_snapshot(), spanning);

    let mut drop_spanning = over(&base);
    assert!(collection_in(&mut drop_spanning).remove_meta_index_by_name("idx_items"));
    let mut drop_idx = over(&base);
    assert!(collection_in(&mut drop_idx).remove_meta_index_by_name("idx"));

    assert!(merge_snapshot(&base, &drop_idx).is_ok());
    let committed = merge_snapshot(&base, &drop_spanning).unwrap();
    let conflict = merge_snapshot(&committed, &drop_idx).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::OrphansDocPartIndex);
}

#[test]
fn removing_a_doc_part_index_a_concurrent_index_relies_on_is_rejected() {
    let base = indexed_snapshot();

    let mut add_spanning = over(&base);
    collection_in(&mut add_spanning)
        .add_meta_index(root_index("idx_items", FIELD_NAME).with_field(TableRef::root().child("items"), "price", Asc))
        .unwrap();
    let mut drop_both = over(&base);
    assert!(collection_in(&mut drop_both).remove_meta_index_by_name("idx"));
    assert!(root_in(&mut drop_both).remove_meta_doc_part_index_by_identifier("idx_field"));

    assert!(merge_snapshot(&base, &drop_both).is_ok());
    let committed = merge_snapshot(&base, &add_spanning).unwrap();
    let conflict = merge_snapshot(&committed, &drop_both).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::StillReferenced);
    assert_eq!(conflict.path().last().map(String::as_str), Some("idx_field"));
}

#[test]
fn concurrent_indexes_with_one_definition_conflict() {
    let base = sample_snapshot();

    let mut first = over(&base);
    collection_in(&mut first).add_meta_index(root_index("idx_a", FIELD_NAME)).unwrap();
    root_in(&mut first)
        .add_meta_doc_part_index(MetaDocPartIndex::new("idx_a_field", false).with_column(FIELD_ID, Asc))
        .unwrap();
    let mut second = over(&base);
    collection_in(&mut second).add_meta_index(root_index("idx_b", FIELD_NAME)).unwrap();

    let committed = merge_snapshot(&base, &first).unwrap();
    let conflict = merge_snapshot(&committed, &second).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::ConflictingIndex);
    assert_eq!(conflict.path().last().map(String::as_str), Some("idx_b"));
}

#[test]
fn index_without_its_doc_part_index_is_rejected() {
    let base = sample_snapshot();
    let mut changes = over(&base);
    collection_in(&mut changes).add_meta_index(root_index("idx", FIELD_NAME)).unwrap();

    let conflict = merge_snapshot(&base, &changes).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::MissingDocPartIndex);
    assert!(conflict.detail().contains(FIELD_ID));

    root_in(&mut changes)
        .add_meta_doc_part_index(MetaDocPartIndex::new("idx_field", false).with_column(FIELD_ID, Asc))
        .unwrap();
    let merged = merge_snapshot(&base, &changes).unwrap();
    let collection = merged.database(DB_NAME).unwrap().collection(COL_NAME).unwrap();
    assert!(collection.index_by_name("idx").is_some());
}

#[test]
fn field_covered_by_a_concurrent_index_needs_its_doc_part_index() {
    let base = sample_snapshot();
    let mut declare = over(&base);
    collection_in(&mut declare).add_meta_index(root_index("idx2", "fieldName2")).unwrap();
    let committed = merge_snapshot(&base, &declare).unwrap();

    let mut bare = over(&base);
    root_in(&mut bare).add_meta_field("fieldName2", "fieldId2", FieldType::Long).unwrap();
    assert!(merge_snapshot(&base, &bare).is_ok());
    let conflict = merge_snapshot(&committed, &bare).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::MissingDocPartIndex);
    assert_eq!(conflict.path().last().map(String::as_str), Some("fieldName2"));

    let mut indexed = over(&base);
    let root = root_in(&mut indexed);
    root.add_meta_field("fieldName2", "fieldId2", FieldType::Long).unwrap();
    root.add_meta_doc_part_index(MetaDocPartIndex::new("idx2_field", false).with_column("fieldId2", Asc))
        .unwrap();
    let merged = merge_snapshot(&committed, &indexed).unwrap();
    assert!(committed_root(&merged).doc_part_index_by_identifier("idx2_field").is_some());
}

#[test]
fn index_over_a_concurrently_added_field_needs_its_doc_part_index() {
    let base = sample_snapshot();
    let mut add_field = over(&base);
    root_in(&mut add_field).add_meta_field("fieldName2", "fieldId2", FieldType::Long).unwrap();
    let committed = merge_snapshot(&base, &add_field).unwrap();

    let mut declare = over(&base);
    collection_in(&mut declare).add_meta_index(root_index("idx2", "fieldName2")).unwrap();
    assert!(merge_snapshot(&base, &declare).is_ok());
    let conflict = merge_snapshot(&committed, &declare).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::MissingDocPartIndex);
    assert_eq!(conflict.path().last().map(String::as_str), Some("idx2"));
    assert!(conflict.detail().contains("fieldId2"));
}

#[test]
fn redundant_removal_is_a_no_op() {
    let mut base = sample_snapshot();
    base = merge_snapshot(&base, &{
        let mut changes = over(&base);
        changes
            .get_meta_database_by_name_mut(DB_NAME)
            .unwrap()
            .add_meta_collection("colName2", "colId2")
            .unwrap();
        changes
    })
    .unwrap();

    let mut first = over(&base);
    let mut second = over(&base);
    for changes in [&mut first, &mut second] {
        assert!(changes
            .get_meta_database_by_name_mut(DB_NAME)
            .unwrap()
            .remove_meta_collection_by_name("colName2"));
    }

    let after_first = merge_snapshot(&base, &first).unwrap();
    let after_second = merge_snapshot(&after_first, &second).unwrap();
    assert!(after_second.same_content(&after_first));
    assert!(after_second
        .database_by_name(DB_NAME)
        .unwrap()
        .collection_by_name("colName2")
        .is_none());
}

#[test]
fn removal_of_a_replaced_element_is_rejected() {
    let mut base = sample_snapshot();
    base = merge_snapshot(&base, &{
        let mut changes = over(&base);
        changes
            .get_meta_database_by_name_mut(DB_NAME)
            .unwrap()
            .add_meta_collection("colName2", "colId2")
            .unwrap();
        changes
    })
    .unwrap();

    let mut stale = over(&base);
    assert!(stale
        .get_meta_database_by_name_mut(DB_NAME)
        .unwrap()
        .remove_meta_collection_by_name("colName2"));

    let mut replacing = over(&base);
    let database = replacing.get_meta_database_by_name_mut(DB_NAME).unwrap();
    assert!(database.remove_meta_collection_by_name("colName2"));
    database.add_meta_collection("colName2", "colId3").unwrap();
    let replaced = merge_snapshot(&base, &replacing).unwrap();

    let conflict = merge_snapshot(&replaced, &stale).unwrap_err();
    assert_eq!(conflict.rule(), RuleId::IdentityMismatch);
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn redeclaring_any_snapshot_is_idempotent(base in snapshot_strategy()) {
        let merged = merge_snapshot(&base, &redeclare(&base)).unwrap();
        prop_assert!(merged.same_content(&base));
        prop_assert_eq!(merged.version(), base.version().next());
    }

    #[test]
    fn disjoint_field_additions_never_conflict((left, right) in disjoint_field_specs_strategy()) {
        let add = |specs: &[FieldSpec]| {
            let mut changes = empty_overlay();
            let root = root_of(&mut changes);
            for (name, field_type) in specs {
                root.add_meta_field(name, &field_identifier(name, *field_type), *field_type).unwrap();
            }
            changes
        };

        let first = merge_snapshot(&sample_snapshot(), &add(&left)).unwrap();
        let second = merge_snapshot(&first, &add(&right)).unwrap();
        let root = committed_root(&second);
        prop_assert_eq!(root.fields().count(), 1 + left.len() + right.len());
        for (name, field_type) in left.iter().chain(&right) {
            prop_assert!(root.field_by_name_and_type(name, *field_type).is_some());
        }
    }
}
