//! Deterministic backend identifiers.
//!
//! Identifiers are derived from names instead of being generated, so two
//! transactions that independently add the same element compute the same
//! identifier and converge at merge time instead of creating two entities.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::metainfo::collection::MutableMetaCollection;
use crate::metainfo::database::MutableMetaDatabase;
use crate::metainfo::doc_part::MutableMetaDocPart;
use crate::metainfo::field::MetaField;
use crate::metainfo::read::{MetaDatabaseRead, MetaDocPartRead, MetaSnapshotRead};
use crate::metainfo::snapshot::MutableMetaSnapshot;
use crate::metainfo::table_ref::TableRef;
use crate::types::FieldType;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Separator between the parts of an identifier.
pub const SEPARATOR: char = '_';

/// Salted candidates tried after the plain one collides.
pub const MAX_SALT_ATTEMPTS: u32 = 16;

const HASH_LEN: usize = 8;

/// Derives backend identifiers from names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierFactory {
    max_length: usize,
}

impl IdentifierFactory {
    /// Creates a factory producing identifiers of at most `max_length` bytes.
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Creates a factory from the engine configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_identifier_length)
    }

    /// Identifier of the column holding scalars of `field_type`.
    #[must_use]
    pub fn scalar_identifier(field_type: FieldType) -> String {
        format!("v{SEPARATOR}{}", field_type.identifier_char())
    }

    /// Identifier for a new database.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierExhausted` if every candidate is taken.
    pub fn database_identifier(&self, snapshot: &dyn MetaSnapshotRead, name: &str) -> CoreResult<String> {
        self.derive(&[name], None, |candidate| {
            snapshot
                .database_by_identifier(candidate)
                .is_some_and(|d| d.name() != name)
        })
    }

    /// Identifier for a new collection of `database`.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierExhausted` if every candidate is taken.
    pub fn collection_identifier(&self, database: &dyn MetaDatabaseRead, name: &str) -> CoreResult<String> {
        self.derive(&[name], None, |candidate| {
            database
                .collection_by_identifier(candidate)
                .is_some_and(|c| c.name() != name)
        })
    }

    /// Identifier for a new doc part.
    ///
    /// Doc parts become tables sharing one namespace per database, so the
    /// candidate is checked against every collection of `database`.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierExhausted` if every candidate is taken.
    pub fn doc_part_identifier(
        &self,
        database: &dyn MetaDatabaseRead,
        collection_name: &str,
        collection_identifier: &str,
        table_ref: &TableRef,
    ) -> CoreResult<String> {
        let mut chain: Vec<&str> = vec![collection_identifier];
        chain.extend(table_ref.path().iter().map(String::as_str));
        self.derive(&chain, None, |candidate| {
            database.collections().any(|collection| {
                collection
                    .doc_part_by_identifier(candidate)
                    .is_some_and(|d| collection.name() != collection_name || d.table_ref() != table_ref)
            })
        })
    }

    /// Identifier for a new field of `doc_part`.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierExhausted` if every candidate is taken.
    pub fn field_identifier(
        &self,
        doc_part: &dyn MetaDocPartRead,
        name: &str,
        field_type: FieldType,
    ) -> CoreResult<String> {
        self.derive(&[name], Some(field_type.identifier_char()), |candidate| {
            doc_part
                .field_by_identifier(candidate)
                .is_some_and(|f| !f.has_key(name, field_type))
                || doc_part.scalar_by_identifier(candidate).is_some()
        })
    }

    fn derive(
        &self,
        chain: &[&str],
        type_char: Option<char>,
        in_use: impl Fn(&str) -> bool,
    ) -> CoreResult<String> {
        let base = chain
            .iter()
            .map(|part| escape(part))
            .collect::<Vec<_>>()
            .join(&SEPARATOR.to_string());
        let tail = type_char.map(|c| format!("{SEPARATOR}{c}")).unwrap_or_default();

        let plain = if base.len() + tail.len() > self.max_length {
            self.fit(&base, &format!("{SEPARATOR}{}{tail}", hash_of(chain)))
        } else {
            format!("{base}{tail}")
        };
        if !in_use(&plain) {
            return Ok(plain);
        }

        let hash = hash_of(chain);
        for attempt in 0..MAX_SALT_ATTEMPTS {
            let salt = if attempt == 0 {
                format!("{SEPARATOR}{hash}{tail}")
            } else {
                format!("{SEPARATOR}{hash}{SEPARATOR}{attempt}{tail}")
            };
            let candidate = self.fit(&base, &salt);
            if !in_use(&candidate) {
                debug!(name = %chain.join("."), %candidate, "identifier salted after collision");
                return Ok(candidate);
            }
        }
        Err(CoreError::IdentifierExhausted {
            name: chain.join("."),
        })
    }

    fn fit(&self, base: &str, tail: &str) -> String {
        let room = self.max_length.saturating_sub(tail.len());
        let mut end = base.len().min(room);
        while !base.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{tail}", &base[..end])
    }
}

impl Default for IdentifierFactory {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn escape(part: &str) -> String {
    part.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_digit() || c.is_ascii_lowercase() || c == '_' || c == '$' {
                c
            } else {
                SEPARATOR
            }
        })
        .collect()
}

fn hash_of(chain: &[&str]) -> String {
    let digest = Sha256::digest(chain.join("\u{0}").as_bytes());
    let mut hex = String::with_capacity(HASH_LEN);
    for byte in digest.iter().take(HASH_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

impl MutableMetaSnapshot {
    /// Returns the database named `name`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if no identifier can be derived.
    pub fn get_or_create_database(
        &mut self,
        factory: &IdentifierFactory,
        name: &str,
    ) -> CoreResult<&mut MutableMetaDatabase> {
        if self.database_by_name(name).is_none() {
            let identifier = factory.database_identifier(&*self, name)?;
            self.add_meta_database(name, &identifier)?;
        }
        self.get_meta_database_by_name_mut(name)
            .ok_or_else(|| CoreError::invalid_operation(format!("database {name} disappeared")))
    }

    /// Returns the collection, creating it and its root doc part if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if no identifier can be derived.
    pub fn get_or_create_collection(
        &mut self,
        factory: &IdentifierFactory,
        database_name: &str,
        collection_name: &str,
    ) -> CoreResult<&mut MutableMetaCollection> {
        let database = self.get_or_create_database(factory, database_name)?;
        if database.collection_by_name(collection_name).is_none() {
            let identifier = factory.collection_identifier(&*database, collection_name)?;
            let root = TableRef::root();
            let root_identifier =
                factory.doc_part_identifier(&*database, collection_name, &identifier, &root)?;
            database
                .add_meta_collection(collection_name, &identifier)?
                .add_meta_doc_part(root, &root_identifier)?;
        }
        database
            .get_meta_collection_by_name_mut(collection_name)
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("collection {collection_name} disappeared"))
            })
    }

    /// Returns the doc part at `table_ref`, creating it and its ancestors if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if no identifier can be derived.
    pub fn get_or_create_doc_part(
        &mut self,
        factory: &IdentifierFactory,
        database_name: &str,
        collection_name: &str,
        table_ref: &TableRef,
    ) -> CoreResult<&mut MutableMetaDocPart> {
        match table_ref.parent() {
            Some(parent) => {
                self.get_or_create_doc_part(factory, database_name, collection_name, &parent)?;
            }
            None => {
                self.get_or_create_collection(factory, database_name, collection_name)?;
            }
        }

        let missing = || CoreError::invalid_operation(format!("collection {collection_name} disappeared"));
        let database = self
            .get_meta_database_by_name_mut(database_name)
            .ok_or_else(missing)?;
        let (exists, collection_identifier) = {
            let collection = database.collection_by_name(collection_name).ok_or_else(missing)?;
            (
                collection.doc_part_by_table_ref(table_ref).is_some(),
                collection.identifier().to_owned(),
            )
        };
        if !exists {
            let identifier = factory.doc_part_identifier(
                &*database,
                collection_name,
                &collection_identifier,
                table_ref,
            )?;
            database
                .get_meta_collection_by_name_mut(collection_name)
                .ok_or_else(missing)?
                .add_meta_doc_part(table_ref.clone(), &identifier)?;
        }
        database
            .get_meta_collection_by_name_mut(collection_name)
            .and_then(|c| c.get_meta_doc_part_by_table_ref_mut(table_ref))
            .ok_or_else(|| CoreError::invalid_operation(format!("doc part {table_ref} disappeared")))
    }

    /// Returns the field `name` of type `field_type`, creating it (and the
    /// path leading to it) if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if no identifier can be derived.
    pub fn get_or_create_field(
        &mut self,
        factory: &IdentifierFactory,
        database_name: &str,
        collection_name: &str,
        table_ref: &TableRef,
        name: &str,
        field_type: FieldType,
    ) -> CoreResult<MetaField> {
        let doc_part = self.get_or_create_doc_part(factory, database_name, collection_name, table_ref)?;
        if let Some(field) = doc_part.field_by_name_and_type(name, field_type) {
            return Ok(field.clone());
        }
        let identifier = factory.field_identifier(&*doc_part, name, field_type)?;
        Ok(doc_part.add_meta_field(name, &identifier, field_type)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::snapshot::ImmutableMetaSnapshot;
    use std::sync::Arc;

    fn snapshot() -> MutableMetaSnapshot {
        MutableMetaSnapshot::new(Arc::new(ImmutableMetaSnapshot::empty()))
    }

    #[test]
    fn escapes_and_lowercases() {
        let factory = IdentifierFactory::default();
        let snapshot = snapshot();
        assert_eq!(factory.database_identifier(&snapshot, "My-DB").unwrap(), "my_db");
        assert_eq!(factory.database_identifier(&snapshot, "a$b_1").unwrap(), "a$b_1");
    }

    #[test]
    fn field_identifier_carries_type_char() {
        let factory = IdentifierFactory::default();
        let mut snapshot = snapshot();
        let field = snapshot
            .get_or_create_field(&factory, "db", "col", &TableRef::root(), "Price", FieldType::Double)
            .unwrap();
        assert_eq!(field.identifier(), "price_d");
        assert_eq!(IdentifierFactory::scalar_identifier(FieldType::Integer), "v_i");
    }

    #[test]
    fn derivation_is_deterministic() {
        let factory = IdentifierFactory::default();
        let mut a = snapshot();
        let mut b = snapshot();
        let fa = a
            .get_or_create_field(&factory, "db", "col", &TableRef::root().child("items"), "x", FieldType::Long)
            .unwrap();
        let fb = b
            .get_or_create_field(&factory, "db", "col", &TableRef::root().child("items"), "x", FieldType::Long)
            .unwrap();
        assert_eq!(fa, fb);
    }

    #[test]
    fn collision_is_salted() {
        let factory = IdentifierFactory::default();
        let mut snapshot = snapshot();
        let root = TableRef::root();
        let first = snapshot
            .get_or_create_field(&factory, "db", "col", &root, "a.b", FieldType::String)
            .unwrap();
        let second = snapshot
            .get_or_create_field(&factory, "db", "col", &root, "a_b", FieldType::String)
            .unwrap();
        assert_eq!(first.identifier(), "a_b_s");
        assert_ne!(second.identifier(), first.identifier());
        assert!(second.identifier().starts_with("a_b_"));
        assert!(second.identifier().ends_with("_s"));
    }

    #[test]
    fn long_names_are_truncated_with_hash() {
        let factory = IdentifierFactory::new(20);
        let snapshot = snapshot();
        let long = "a".repeat(50);
        let identifier = factory.database_identifier(&snapshot, &long).unwrap();
        assert_eq!(identifier.len(), 20);
        assert_ne!(
            identifier,
            factory.database_identifier(&snapshot, &"a".repeat(51)).unwrap()
        );
    }

    #[test]
    fn exhausted_when_every_candidate_is_taken() {
        let factory = IdentifierFactory::default();
        let taken = factory.derive(&["x"], None, |_| true);
        assert!(matches!(taken, Err(CoreError::IdentifierExhausted { .. })));
    }

    #[test]
    fn get_or_create_builds_the_whole_path() {
        let factory = IdentifierFactory::default();
        let mut snapshot = snapshot();
        let nested = TableRef::root().child("a").child("b");
        snapshot
            .get_or_create_doc_part(&factory, "db", "col", &nested)
            .unwrap();

        let database = snapshot.database_by_name("db").unwrap();
        let collection = database.collection_by_name("col").unwrap();
        assert_eq!(collection.doc_parts().count(), 3);
        assert_eq!(collection.root_doc_part_identifier(), Some("col"));
        assert_eq!(
            collection.doc_part_by_table_ref(&nested).unwrap().identifier(),
            "col_a_b"
        );
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let factory = IdentifierFactory::default();
        let mut snapshot = snapshot();
        let root = TableRef::root();
        let a = snapshot
            .get_or_create_field(&factory, "db", "col", &root, "f", FieldType::Integer)
            .unwrap();
        let b = snapshot
            .get_or_create_field(&factory, "db", "col", &root, "f", FieldType::Integer)
            .unwrap();
        assert_eq!(a, b);
        let collection = snapshot
            .database_by_name("db")
            .unwrap()
            .collection_by_name("col")
            .unwrap();
        assert_eq!(
            collection.doc_part_by_table_ref(&root).unwrap().fields().count(),
            1
        );
    }
}
