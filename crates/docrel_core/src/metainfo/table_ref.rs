//! Tree paths identifying doc parts.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Path from a collection's root document to a nested document or array.
///
/// The root has an empty path. Every other ref has exactly one parent: the
/// same path without its last segment. Cloning is cheap.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableRef {
    path: Arc<[String]>,
}

impl TableRef {
    /// Returns the root table ref.
    #[must_use]
    pub fn root() -> Self {
        Self {
            path: Arc::from(Vec::<String>::new()),
        }
    }

    /// Builds a table ref from its path segments.
    #[must_use]
    pub fn from_path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = segments.into_iter().map(Into::into).collect();
        Self {
            path: Arc::from(path),
        }
    }

    /// Returns the ref of the nested document stored under `name`.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.path.to_vec();
        path.push(name.into());
        Self {
            path: Arc::from(path),
        }
    }

    /// Returns the parent ref, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.path.split_last()?;
        Some(Self {
            path: Arc::from(init.to_vec()),
        })
    }

    /// Returns true for the root ref.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Number of segments between the root and this ref.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Returns the last segment, or `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }

    /// Returns the full path.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Returns true if `self` is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &TableRef) -> bool {
        other.path.len() > self.path.len() && other.path.starts_with(&self.path)
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("root");
        }
        f.write_str(&self.path.join("."))
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableRef({self})")
    }
}

impl Serialize for TableRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
