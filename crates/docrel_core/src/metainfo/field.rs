//! Field and scalar columns of a doc part.

use crate::metainfo::state::ChangeTracked;
use crate::types::FieldType;
use serde::Serialize;

/// A document field mapped to a column.
///
/// `identifier` is the column name and is never reused. A document field
/// seen with two different types maps to two `MetaField`s, so the name key
/// inside a doc part is `(name, field_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetaField {
    name: String,
    identifier: String,
    #[serde(rename = "type")]
    field_type: FieldType,
}

impl MetaField {
    /// Creates a field.
    pub fn new(name: impl Into<String>, identifier: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            field_type,
        }
    }

    /// Document field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Type of the stored values.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns true if this field is stored under `name` with `field_type`.
    #[must_use]
    pub fn has_key(&self, name: &str, field_type: FieldType) -> bool {
        self.name == name && self.field_type == field_type
    }
}

impl ChangeTracked for MetaField {
    fn has_changes(&self) -> bool {
        false
    }
}

/// Column holding the scalar elements of an array doc part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetaScalar {
    identifier: String,
    #[serde(rename = "type")]
    field_type: FieldType,
}

impl MetaScalar {
    /// Creates a scalar column.
    pub fn new(identifier: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            identifier: identifier.into(),
            field_type,
        }
    }

    /// Column identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Type of the stored values.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
}

impl ChangeTracked for MetaScalar {
    fn has_changes(&self) -> bool {
        false
    }
}
