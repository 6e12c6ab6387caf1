//! Logical and physical index definitions.
//!
//! A [`MetaIndex`] is what the application asked for: a named index over
//! document fields, possibly spanning several doc parts. A
//! [`MetaDocPartIndex`] is what the backend builds: a composite index over
//! the columns of one doc part. The two are linked by compatibility rather
//! than by reference, see [`MetaIndex::is_compatible`].

use crate::metainfo::read::MetaDocPartRead;
use crate::metainfo::state::ChangeTracked;
use crate::metainfo::table_ref::TableRef;
use crate::types::FieldIndexOrdering;
use serde::Serialize;
use std::fmt;

/// One field of a logical index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetaIndexField {
    table_ref: TableRef,
    name: String,
    ordering: FieldIndexOrdering,
}

impl MetaIndexField {
    /// Creates an index field.
    pub fn new(table_ref: TableRef, name: impl Into<String>, ordering: FieldIndexOrdering) -> Self {
        Self {
            table_ref,
            name: name.into(),
            ordering,
        }
    }

    /// Doc part the field lives in.
    #[must_use]
    pub fn table_ref(&self) -> &TableRef {
        &self.table_ref
    }

    /// Document field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sort direction.
    #[must_use]
    pub fn ordering(&self) -> FieldIndexOrdering {
        self.ordering
    }

    fn is_compatible(&self, doc_part: &dyn MetaDocPartRead, column: &MetaDocPartIndexColumn) -> bool {
        if self.ordering != column.ordering {
            return false;
        }
        doc_part
            .field_by_identifier(&column.identifier)
            .is_some_and(|field| field.name() == self.name)
    }
}

/// A named index declared by the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetaIndex {
    name: String,
    unique: bool,
    fields: Vec<MetaIndexField>,
}

impl MetaIndex {
    /// Creates an index with no fields.
    pub fn new(name: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            unique,
            fields: Vec::new(),
        }
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(
        mut self,
        table_ref: TableRef,
        name: impl Into<String>,
        ordering: FieldIndexOrdering,
    ) -> Self {
        self.fields.push(MetaIndexField::new(table_ref, name, ordering));
        self
    }

    /// Index name, unique within its collection.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the index enforces uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Fields in index order.
    #[must_use]
    pub fn fields(&self) -> &[MetaIndexField] {
        &self.fields
    }

    /// Fields that live in the doc part at `table_ref`, in index order.
    pub fn fields_in<'a>(&'a self, table_ref: &'a TableRef) -> impl Iterator<Item = &'a MetaIndexField> + 'a {
        self.fields.iter().filter(move |f| f.table_ref == *table_ref)
    }

    /// Returns true if any field lives in the doc part at `table_ref`.
    #[must_use]
    pub fn touches(&self, table_ref: &TableRef) -> bool {
        self.fields_in(table_ref).next().is_some()
    }

    /// Returns true if both indexes are defined over the same fields.
    ///
    /// Names are ignored.
    #[must_use]
    pub fn same_definition(&self, other: &MetaIndex) -> bool {
        self.unique == other.unique && self.fields == other.fields
    }

    /// Returns true if `index` implements this index's projection onto
    /// `doc_part`.
    ///
    /// The projection must be non-empty and pair up one to one, in order,
    /// with the physical columns. Each column must resolve to a field of the
    /// same name with the same ordering.
    #[must_use]
    pub fn is_compatible(&self, doc_part: &dyn MetaDocPartRead, index: &MetaDocPartIndex) -> bool {
        if self.unique != index.unique {
            return false;
        }
        let projection: Vec<&MetaIndexField> = self.fields_in(doc_part.table_ref()).collect();
        if projection.is_empty() || projection.len() != index.columns.len() {
            return false;
        }
        projection
            .iter()
            .zip(&index.columns)
            .all(|(field, column)| field.is_compatible(doc_part, column))
    }

    /// Column identifiers of `doc_part` this index's projection resolves to.
    ///
    /// A field stored under several types yields one combination per type,
    /// and each combination needs its own physical index. Empty if the index
    /// has no field in `doc_part` or a projected field has no column yet.
    #[must_use]
    pub fn column_combinations(&self, doc_part: &dyn MetaDocPartRead) -> Vec<Vec<String>> {
        let mut combinations: Vec<Vec<String>> = Vec::new();
        for (position, field) in self.fields_in(doc_part.table_ref()).enumerate() {
            let columns: Vec<&str> = doc_part
                .fields_by_name(field.name())
                .map(|f| f.identifier())
                .collect();
            combinations = if position == 0 {
                columns.iter().map(|c| vec![(*c).to_owned()]).collect()
            } else {
                combinations
                    .iter()
                    .flat_map(|prefix| {
                        columns.iter().map(move |c| {
                            let mut next = prefix.clone();
                            next.push((*c).to_owned());
                            next
                        })
                    })
                    .collect()
            };
        }
        combinations
    }

    /// Returns true if `index` implements this index over exactly `columns`.
    #[must_use]
    pub fn is_implemented_by(
        &self,
        doc_part: &dyn MetaDocPartRead,
        columns: &[String],
        index: &MetaDocPartIndex,
    ) -> bool {
        index.columns.len() == columns.len()
            && index
                .columns
                .iter()
                .zip(columns)
                .all(|(column, identifier)| column.identifier == *identifier)
            && self.is_compatible(doc_part, index)
    }

    /// Column combinations of `doc_part` no physical index implements yet.
    #[must_use]
    pub fn unimplemented_combinations(&self, doc_part: &dyn MetaDocPartRead) -> Vec<Vec<String>> {
        self.column_combinations(doc_part)
            .into_iter()
            .filter(|columns| {
                !doc_part
                    .doc_part_indexes()
                    .any(|physical| self.is_implemented_by(doc_part, columns, physical))
            })
            .collect()
    }
}

impl ChangeTracked for MetaIndex {
    fn has_changes(&self) -> bool {
        false
    }
}

/// One column of a physical index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetaDocPartIndexColumn {
    identifier: String,
    ordering: FieldIndexOrdering,
}

impl MetaDocPartIndexColumn {
    /// Creates a column referencing the field column `identifier`.
    pub fn new(identifier: impl Into<String>, ordering: FieldIndexOrdering) -> Self {
        Self {
            identifier: identifier.into(),
            ordering,
        }
    }

    /// Identifier of the indexed field column.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Sort direction.
    #[must_use]
    pub fn ordering(&self) -> FieldIndexOrdering {
        self.ordering
    }
}

/// A composite index over the columns of one doc part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetaDocPartIndex {
    identifier: String,
    unique: bool,
    columns: Vec<MetaDocPartIndexColumn>,
}

impl MetaDocPartIndex {
    /// Creates an index with no columns.
    pub fn new(identifier: impl Into<String>, unique: bool) -> Self {
        Self {
            identifier: identifier.into(),
            unique,
            columns: Vec::new(),
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn with_column(mut self, identifier: impl Into<String>, ordering: FieldIndexOrdering) -> Self {
        self.columns
            .push(MetaDocPartIndexColumn::new(identifier, ordering));
        self
    }

    /// Backend identifier of the index.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether the index enforces uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Columns in index order.
    #[must_use]
    pub fn columns(&self) -> &[MetaDocPartIndexColumn] {
        &self.columns
    }

    /// Returns true if both indexes cover the same columns the same way.
    #[must_use]
    pub fn same_columns(&self, other: &MetaDocPartIndex) -> bool {
        self.unique == other.unique && self.columns == other.columns
    }

    /// Short description of the column list, e.g. `unique(a_i ASC, b_s DESC)`.
    #[must_use]
    pub fn signature(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MetaDocPartIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            f.write_str("unique")?;
        }
        f.write_str("(")?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", column.identifier, column.ordering)?;
        }
        f.write_str(")")
    }
}

impl ChangeTracked for MetaDocPartIndex {
    fn has_changes(&self) -> bool {
        false
    }
}
