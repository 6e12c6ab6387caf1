//! Property-based test generators using proptest.
//!
//! Generated snapshots use identifiers derived from names, so they never
//! contain duplicate names or identifiers at any level.

use docrel_core::{
    FieldType, ImmutableMetaSnapshot, MetaCollection, MetaDatabase, MetaDocPart, MetaField, TableRef,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// A field to declare: name and type.
pub type FieldSpec = (String, FieldType);

/// Strategy for generating valid metadata names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating field types.
pub fn field_type_strategy() -> impl Strategy<Value = FieldType> {
    prop::sample::select(FieldType::ALL.to_vec())
}

/// Strategy for generating a set of fields with distinct (name, type) keys.
pub fn field_specs_strategy(max: usize) -> impl Strategy<Value = BTreeSet<FieldSpec>> {
    prop::collection::btree_set((name_strategy(), field_type_strategy()), 0..max)
}

/// Strategy for generating two disjoint sets of fields.
///
/// Models two transactions that add different fields to the same doc part.
pub fn disjoint_field_specs_strategy() -> impl Strategy<Value = (Vec<FieldSpec>, Vec<FieldSpec>)> {
    field_specs_strategy(16).prop_map(|specs| {
        let (left, right): (Vec<_>, Vec<_>) = specs.into_iter().enumerate().partition(|(i, _)| i % 2 == 0);
        (
            left.into_iter().map(|(_, spec)| spec).collect(),
            right.into_iter().map(|(_, spec)| spec).collect(),
        )
    })
}

/// Identifier given to a generated field.
#[must_use]
pub fn field_identifier(name: &str, field_type: FieldType) -> String {
    format!("f_{name}_{}", field_type.identifier_char())
}

type Layout = BTreeMap<String, BTreeMap<String, BTreeSet<FieldSpec>>>;

/// Strategy for generating committed snapshots.
///
/// Up to three databases of up to three collections, each with a root doc
/// part holding a handful of fields.
pub fn snapshot_strategy() -> impl Strategy<Value = ImmutableMetaSnapshot> {
    let collections = prop::collection::btree_map(name_strategy(), field_specs_strategy(6), 0..3);
    prop::collection::btree_map(name_strategy(), collections, 0..3).prop_map(|layout| build_snapshot(&layout))
}

fn build_snapshot(layout: &Layout) -> ImmutableMetaSnapshot {
    let mut snapshot = ImmutableMetaSnapshot::builder();
    for (db_name, collections) in layout {
        let mut database = MetaDatabase::builder(db_name.as_str(), format!("d_{db_name}"));
        for (col_name, fields) in collections {
            let col_id = format!("c_{col_name}");
            let mut root = MetaDocPart::builder(TableRef::root(), format!("{col_id}_root"));
            for (name, field_type) in fields {
                root.put_field(MetaField::new(
                    name.as_str(),
                    field_identifier(name, *field_type),
                    *field_type,
                ));
            }
            database.put_collection(
                MetaCollection::builder(col_name.as_str(), col_id)
                    .put_doc_part(root.build())
                    .build(),
            );
        }
        snapshot.put_database(database.build());
    }
    snapshot.build()
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrel_core::{MetaCollectionRead, MetaDatabaseRead, MetaDocPartRead, MetaSnapshotRead};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn names_start_with_a_letter(name in name_strategy()) {
            prop_assert!(name.chars().next().is_some_and(|c| c.is_ascii_lowercase()));
        }

        #[test]
        fn disjoint_specs_share_nothing((left, right) in disjoint_field_specs_strategy()) {
            prop_assert!(left.iter().all(|spec| !right.contains(spec)));
        }

        #[test]
        fn generated_field_identifiers_are_unique(snapshot in snapshot_strategy()) {
            for database in snapshot.databases() {
                for collection in database.collections() {
                    for doc_part in collection.doc_parts() {
                        let ids: BTreeSet<_> = doc_part.fields().map(|f| f.identifier()).collect();
                        prop_assert_eq!(ids.len(), doc_part.fields().count());
                    }
                }
            }
        }
    }
}
