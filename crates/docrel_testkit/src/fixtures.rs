//! Test fixtures and manager helpers.
//!
//! Provides a committed sample snapshot, a manager wired to an in-memory
//! backend, and the end-to-end merge scenarios run against the sample.

use docrel_backend::InMemoryBackend;
use docrel_core::{
    Config, FieldType, ImmutableMetaSnapshot, InternalTransactionManager, MetaCollection,
    MetaCollectionRead, MetaDatabase, MetaDatabaseRead, MetaDocPart, MetaDocPartRead, MetaField,
    MetaScalar, MetaSnapshotRead, MetainfoRepository, MutableMetaSnapshot, SnapshotDump, TableRef,
};
use std::sync::Arc;

/// Name of the sample database.
pub const DB_NAME: &str = "dbName1";
/// Identifier of the sample database.
pub const DB_ID: &str = "dbId1";
/// Name of the sample collection.
pub const COL_NAME: &str = "colName1";
/// Identifier of the sample collection.
pub const COL_ID: &str = "colId1";
/// Identifier of the sample root doc part.
pub const DOC_PART_ID: &str = "docPartId1";
/// Name of the sample field.
pub const FIELD_NAME: &str = "fieldName1";
/// Identifier of the sample field.
pub const FIELD_ID: &str = "fieldId1";
/// Identifier of the sample scalar.
pub const SCALAR_ID: &str = "scalarId1";

/// The committed snapshot every scenario starts from.
///
/// `dbName1 -> colName1 -> root (docPartId1) -> fieldName1 (INTEGER)`, plus
/// an INTEGER scalar on the root doc part.
#[must_use]
pub fn sample_snapshot() -> ImmutableMetaSnapshot {
    let root = MetaDocPart::builder(TableRef::root(), DOC_PART_ID)
        .put_field(MetaField::new(FIELD_NAME, FIELD_ID, FieldType::Integer))
        .put_scalar(MetaScalar::new(SCALAR_ID, FieldType::Integer))
        .build();
    ImmutableMetaSnapshot::builder()
        .put_database(
            MetaDatabase::builder(DB_NAME, DB_ID)
                .put_collection(MetaCollection::builder(COL_NAME, COL_ID).put_doc_part(root).build())
                .build(),
        )
        .build()
}

/// An empty overlay, as if written by a transaction that started before
/// anything was committed.
#[must_use]
pub fn empty_overlay() -> MutableMetaSnapshot {
    MutableMetaSnapshot::new(Arc::new(ImmutableMetaSnapshot::empty()))
}

/// Builds an overlay over an empty snapshot that declares every element of
/// `snapshot` again, with the same names and identifiers.
///
/// Merging the result into `snapshot` must change nothing.
///
/// # Panics
///
/// Panics if `snapshot` contains duplicate names or identifiers.
#[must_use]
pub fn redeclare(snapshot: &dyn MetaSnapshotRead) -> MutableMetaSnapshot {
    let mut overlay = empty_overlay();
    for database in snapshot.databases() {
        let new_database = overlay
            .add_meta_database(database.name(), database.identifier())
            .expect("duplicate database");
        for collection in database.collections() {
            let new_collection = new_database
                .add_meta_collection(collection.name(), collection.identifier())
                .expect("duplicate collection");
            for index in collection.indexes() {
                new_collection
                    .add_meta_index(index.clone())
                    .expect("duplicate index");
            }
            for doc_part in collection.doc_parts() {
                redeclare_doc_part(
                    new_collection
                        .add_meta_doc_part(doc_part.table_ref().clone(), doc_part.identifier())
                        .expect("duplicate doc part"),
                    doc_part,
                );
            }
        }
    }
    overlay
}

fn redeclare_doc_part(target: &mut docrel_core::MutableMetaDocPart, source: &dyn MetaDocPartRead) {
    for field in source.fields() {
        target
            .add_meta_field(field.name(), field.identifier(), field.field_type())
            .expect("duplicate field");
    }
    for scalar in source.scalars() {
        target
            .add_meta_scalar(scalar.identifier(), scalar.field_type())
            .expect("duplicate scalar");
    }
    for index in source.doc_part_indexes() {
        target
            .add_meta_doc_part_index(index.clone())
            .expect("duplicate doc part index");
    }
}

/// Renders a snapshot the way the CLI prints it.
///
/// # Panics
///
/// Panics if the dump cannot be serialized, which would be a bug.
#[must_use]
pub fn snapshot_json(snapshot: &ImmutableMetaSnapshot) -> serde_json::Value {
    serde_json::to_value(SnapshotDump::from(snapshot)).expect("snapshot dump is serializable")
}

/// A manager over a fresh repository, plus the backend its transactions
/// run on.
pub struct TestManager {
    /// The transaction manager.
    pub manager: Arc<InternalTransactionManager>,
    /// The backend every transaction of this fixture opens.
    pub backend: InMemoryBackend,
}

impl TestManager {
    /// Creates a manager over an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::with_snapshot(ImmutableMetaSnapshot::empty(), Config::default())
    }

    /// Creates a manager over a repository seeded with `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: ImmutableMetaSnapshot, config: Config) -> Self {
        let repository = Arc::new(MetainfoRepository::with_snapshot(snapshot));
        Self {
            manager: Arc::new(InternalTransactionManager::new(repository, config)),
            backend: InMemoryBackend::new(),
        }
    }

    /// Returns the latest committed snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<ImmutableMetaSnapshot> {
        self.manager.repository().current_snapshot()
    }
}

impl Default for TestManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestManager {
    type Target = InternalTransactionManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

/// End-to-end merge scenarios against [`sample_snapshot`].
pub mod scenarios {
    use super::*;
    use docrel_core::{merge_snapshot, CoreResult, RuleId};
    use std::fmt;

    /// One step of the end-to-end scenario.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Scenario {
        /// Re-declares the committed path unchanged.
        Idempotent,
        /// Declares `dbName1` with identifier `dbId2`.
        DatabaseRenamed,
        /// Declares a second doc part reusing `docPartId1`.
        DocPartIdReused,
        /// Declares `fieldName1`/`fieldId1` as TIME.
        FieldTypeChanged,
        /// Declares a new field next to the committed one.
        NewField,
    }

    impl Scenario {
        /// Every scenario, in the order they are usually run.
        pub const ALL: [Scenario; 5] = [
            Self::Idempotent,
            Self::DatabaseRenamed,
            Self::DocPartIdReused,
            Self::FieldTypeChanged,
            Self::NewField,
        ];

        /// Parses a scenario from its letter (`a` to `e`) or its name.
        #[must_use]
        pub fn parse(value: &str) -> Option<Self> {
            Self::ALL
                .into_iter()
                .find(|s| s.letter().to_string() == value || s.name() == value)
        }

        /// Letter of the scenario step.
        #[must_use]
        pub fn letter(self) -> char {
            match self {
                Self::Idempotent => 'a',
                Self::DatabaseRenamed => 'b',
                Self::DocPartIdReused => 'c',
                Self::FieldTypeChanged => 'd',
                Self::NewField => 'e',
            }
        }

        /// Short name used on the command line.
        #[must_use]
        pub fn name(self) -> &'static str {
            match self {
                Self::Idempotent => "idempotent",
                Self::DatabaseRenamed => "database-renamed",
                Self::DocPartIdReused => "doc-part-id-reused",
                Self::FieldTypeChanged => "field-type-changed",
                Self::NewField => "new-field",
            }
        }

        /// The rule expected to reject the changes, or `None` if they merge.
        #[must_use]
        pub fn expected_rule(self) -> Option<RuleId> {
            match self {
                Self::Idempotent | Self::NewField => None,
                Self::DatabaseRenamed => Some(RuleId::NameConflict),
                Self::DocPartIdReused | Self::FieldTypeChanged => Some(RuleId::IdentifierConflict),
            }
        }

        /// Builds the changes this scenario proposes.
        ///
        /// # Panics
        ///
        /// Panics if the overlay rejects the changes, which would be a bug in
        /// the fixture.
        #[must_use]
        pub fn changes(self) -> MutableMetaSnapshot {
            let mut overlay = empty_overlay();
            match self {
                Self::Idempotent => return redeclare(&sample_snapshot()),
                Self::DatabaseRenamed => {
                    overlay.add_meta_database(DB_NAME, "dbId2").expect("fresh overlay");
                }
                Self::DocPartIdReused => {
                    overlay
                        .add_meta_database(DB_NAME, DB_ID)
                        .and_then(|d| d.add_meta_collection(COL_NAME, COL_ID))
                        .and_then(|c| c.add_meta_doc_part(TableRef::root().child("sub"), DOC_PART_ID))
                        .expect("fresh overlay");
                }
                Self::FieldTypeChanged => {
                    overlay
                        .add_meta_database(DB_NAME, DB_ID)
                        .and_then(|d| d.add_meta_collection(COL_NAME, COL_ID))
                        .and_then(|c| c.add_meta_doc_part(TableRef::root(), DOC_PART_ID))
                        .and_then(|p| p.add_meta_field(FIELD_NAME, FIELD_ID, FieldType::Time))
                        .expect("fresh overlay");
                }
                Self::NewField => {
                    overlay
                        .add_meta_database(DB_NAME, DB_ID)
                        .and_then(|d| d.add_meta_collection(COL_NAME, COL_ID))
                        .and_then(|c| c.add_meta_doc_part(TableRef::root(), DOC_PART_ID))
                        .and_then(|p| p.add_meta_field("fieldName2", "fieldId2", FieldType::Long))
                        .expect("fresh overlay");
                }
            }
            overlay
        }

        /// Merges the changes into the sample snapshot.
        ///
        /// # Errors
        ///
        /// Returns `Unmergeable` if the merge rejects the changes.
        pub fn run(self) -> CoreResult<ImmutableMetaSnapshot> {
            Ok(merge_snapshot(&sample_snapshot(), &self.changes())?)
        }
    }

    impl fmt::Display for Scenario {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "({}) {}", self.letter(), self.name())
        }
    }
}
