//! Core type definitions for docrel.

use serde::Serialize;
use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Version of a committed metadata snapshot.
///
/// Every successful merge installs a snapshot whose version is one higher
/// than the snapshot it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SnapshotVersion(pub u64);

impl SnapshotVersion {
    /// The version of an empty, never-merged repository.
    pub const INITIAL: Self = Self(0);

    /// Creates a new snapshot version.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next version.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Type of the values stored in a field column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    /// Raw bytes.
    Binary,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// 64-bit float.
    Double,
    /// Point in time.
    Instant,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// Mongo object id.
    MongoObjectId,
    /// Mongo timestamp.
    MongoTimeStamp,
    /// Explicit null.
    Null,
    /// UTF-8 string.
    String,
    /// Time of day.
    Time,
    /// Nested document or array stored in a child doc part.
    Child,
}

impl FieldType {
    /// All field types.
    pub const ALL: [Self; 13] = [
        Self::Binary,
        Self::Boolean,
        Self::Date,
        Self::Double,
        Self::Instant,
        Self::Integer,
        Self::Long,
        Self::MongoObjectId,
        Self::MongoTimeStamp,
        Self::Null,
        Self::String,
        Self::Time,
        Self::Child,
    ];

    /// Character appended to identifiers of columns holding this type.
    #[must_use]
    pub const fn identifier_char(self) -> char {
        match self {
            Self::Binary => 'r',
            Self::Boolean => 'b',
            Self::Date => 'c',
            Self::Double => 'd',
            Self::Instant => 'g',
            Self::Integer => 'i',
            Self::Long => 'l',
            Self::MongoObjectId => 'x',
            Self::MongoTimeStamp => 'y',
            Self::Null => 'n',
            Self::String => 's',
            Self::Time => 't',
            Self::Child => 'e',
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Binary => "BINARY",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Double => "DOUBLE",
            Self::Instant => "INSTANT",
            Self::Integer => "INTEGER",
            Self::Long => "LONG",
            Self::MongoObjectId => "MONGO_OBJECT_ID",
            Self::MongoTimeStamp => "MONGO_TIME_STAMP",
            Self::Null => "NULL",
            Self::String => "STRING",
            Self::Time => "TIME",
            Self::Child => "CHILD",
        };
        f.write_str(name)
    }
}

/// Sort direction of an index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldIndexOrdering {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl fmt::Display for FieldIndexOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("ASC"),
            Self::Desc => f.write_str("DESC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn transaction_id_ordering() {
        let t1 = TransactionId::new(1);
        let t2 = TransactionId::new(2);
        assert!(t1 < t2);
    }

    #[test]
    fn snapshot_version_next() {
        let v = SnapshotVersion::INITIAL.next().next();
        assert_eq!(v.as_u64(), 2);
        assert_eq!(format!("{v}"), "v2");
    }

    #[test]
    fn field_type_chars_are_distinct() {
        let chars: HashSet<char> = FieldType::ALL.iter().map(|t| t.identifier_char()).collect();
        assert_eq!(chars.len(), FieldType::ALL.len());
    }

    #[test]
    fn field_type_display() {
        assert_eq!(FieldType::Integer.to_string(), "INTEGER");
        assert_eq!(FieldType::MongoTimeStamp.to_string(), "MONGO_TIME_STAMP");
    }
}
