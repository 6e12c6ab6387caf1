//! Metadata tree: databases, collections, doc parts and their columns.
//!
//! Every level exists in two flavours. The immutable types (`MetaDatabase`,
//! `MetaCollection`, ...) make up a committed [`ImmutableMetaSnapshot`] and
//! are shared between snapshots through `Arc`. The mutable types
//! (`MutableMetaDatabase`, ...) are copy-on-write overlays a write
//! transaction edits; they record what changed so the merge can replay it.
//!
//! Read access goes through the `Meta*Read` traits, which both flavours
//! implement.

pub(crate) mod collection;
pub(crate) mod database;
pub(crate) mod doc_part;
pub(crate) mod dump;
pub(crate) mod field;
pub(crate) mod identifier;
pub(crate) mod index;
pub(crate) mod read;
pub(crate) mod rid;
pub(crate) mod snapshot;
pub(crate) mod state;
pub(crate) mod table_ref;

pub use collection::{MetaCollection, MetaCollectionBuilder, MutableMetaCollection};
pub use database::{MetaDatabase, MetaDatabaseBuilder, MutableMetaDatabase};
pub use doc_part::{MetaDocPart, MetaDocPartBuilder, MutableMetaDocPart};
pub use dump::{CollectionDump, DatabaseDump, DocPartDump, SnapshotDump};
pub use field::{MetaField, MetaScalar};
pub use identifier::{IdentifierFactory, MAX_SALT_ATTEMPTS, SEPARATOR};
pub use index::{MetaDocPartIndex, MetaDocPartIndexColumn, MetaIndex, MetaIndexField};
pub use read::{MetaCollectionRead, MetaDatabaseRead, MetaDocPartRead, MetaSnapshotRead};
pub use rid::RidGenerator;
pub use snapshot::{ImmutableMetaSnapshot, MutableMetaSnapshot, SnapshotBuilder};
pub use state::{ChangeTracked, ChangedElement, MetaElementState};
pub use table_ref::TableRef;
