//! Merge outcomes and conflict reporting.

use crate::error::CoreError;
use std::fmt;

/// Level of the metadata tree a merge step works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A database of a snapshot.
    Database,
    /// A collection of a database.
    Collection,
    /// A doc part of a collection.
    DocPart,
    /// A field of a doc part.
    Field,
    /// A scalar column of a doc part.
    Scalar,
    /// A logical index of a collection.
    Index,
    /// A physical index of a doc part.
    DocPartIndex,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Database => "database",
            Self::Collection => "collection",
            Self::DocPart => "doc part",
            Self::Field => "field",
            Self::Scalar => "scalar",
            Self::Index => "index",
            Self::DocPartIndex => "doc part index",
        };
        f.write_str(name)
    }
}

/// Identifies the merge rule that decided an element's fate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleId {
    /// Nothing committed matches; the element is copied in.
    NewElement,
    /// A committed sibling has the same name but another identifier.
    NameConflict,
    /// A committed sibling has the same identifier but another name.
    IdentifierConflict,
    /// The element is already committed; its children are merged.
    ModifyExisting,
    /// Same identity, different definition.
    AttributeConflict,
    /// Removing something that is already gone.
    AlreadyAbsent,
    /// The name and identifier of a removed element point at different
    /// committed elements.
    IdentityMismatch,
    /// A physical index is removed while a logical index still needs it.
    StillReferenced,
    /// The element is deleted.
    Remove,
    /// A physical index no logical index justifies.
    OrphanDocPartIndex,
    /// A logical index duplicates the definition of another one.
    ConflictingIndex,
    /// Removing a logical index would leave a physical index unjustified.
    OrphansDocPartIndex,
    /// A committed logical index would be left without the physical index
    /// implementing it.
    MissingDocPartIndex,
    /// No rule matched the situation.
    NoApplicableRule,
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NewElement => "new_element",
            Self::NameConflict => "name_conflict",
            Self::IdentifierConflict => "identifier_conflict",
            Self::ModifyExisting => "modify_existing",
            Self::AttributeConflict => "attribute_conflict",
            Self::AlreadyAbsent => "already_absent",
            Self::IdentityMismatch => "identity_mismatch",
            Self::StillReferenced => "still_referenced",
            Self::Remove => "remove",
            Self::OrphanDocPartIndex => "orphan_doc_part_index",
            Self::ConflictingIndex => "conflicting_index",
            Self::OrphansDocPartIndex => "orphans_doc_part_index",
            Self::MissingDocPartIndex => "missing_doc_part_index",
            Self::NoApplicableRule => "no_applicable_rule",
        };
        f.write_str(name)
    }
}

/// A rejected change, with the path of the element that caused it.
///
/// The path is filled while the merge unwinds: the failing level reports
/// the detail and every enclosing level prepends its own segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    rule: RuleId,
    detail: String,
    path: Vec<String>,
}

impl MergeConflict {
    /// Creates a conflict with an empty path.
    pub fn new(rule: RuleId, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
            path: Vec::new(),
        }
    }

    /// Prepends the segment of an enclosing element.
    #[must_use]
    pub fn within(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }

    /// Rule that rejected the change.
    #[must_use]
    pub fn rule(&self) -> RuleId {
        self.rule
    }

    /// What went wrong, without the path.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Segments from the database down to the failing element.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Full message: the path joined with `.`, then the detail.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.detail)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.detail)
        }
    }
}

impl From<MergeConflict> for CoreError {
    fn from(conflict: MergeConflict) -> Self {
        CoreError::unmergeable(conflict.rule, conflict.message())
    }
}

/// Outcome of a single merge rule.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The rule applied its change.
    Success,
    /// The rule rejected the change.
    Error(MergeConflict),
}

impl ExecutionResult {
    /// Shorthand for an error result.
    pub fn error(rule: RuleId, detail: impl Into<String>) -> Self {
        Self::Error(MergeConflict::new(rule, detail))
    }

    /// Returns true on success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Converts into a `Result` so callers can use `?`.
    ///
    /// # Errors
    ///
    /// Returns the conflict carried by [`Self::Error`].
    pub fn into_result(self) -> Result<(), MergeConflict> {
        match self {
            Self::Success => Ok(()),
            Self::Error(conflict) => Err(conflict),
        }
    }
}

impl From<Result<(), MergeConflict>> for ExecutionResult {
    fn from(result: Result<(), MergeConflict>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(conflict) => Self::Error(conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_prepended_while_unwinding() {
        let conflict = MergeConflict::new(RuleId::NameConflict, "boom")
            .within("fieldName1")
            .within("root")
            .within("colName1")
            .within("dbName1");
        assert_eq!(conflict.path(), ["dbName1", "colName1", "root", "fieldName1"]);
        assert_eq!(conflict.message(), "dbName1.colName1.root.fieldName1: boom");
    }

    #[test]
    fn empty_path_renders_detail_only() {
        assert_eq!(MergeConflict::new(RuleId::Remove, "x").message(), "x");
    }

    #[test]
    fn into_core_error_keeps_rule() {
        let err: CoreError = MergeConflict::new(RuleId::IdentifierConflict, "bad")
            .within("db")
            .into();
        assert_eq!(err.rule(), Some(RuleId::IdentifierConflict));
        assert!(err.to_string().contains("identifier_conflict"));
        assert!(err.to_string().contains("db: bad"));
    }

    #[test]
    fn execution_result_round_trips_result() {
        assert!(ExecutionResult::from(Ok(())).is_success());
        let failed = ExecutionResult::error(RuleId::OrphanDocPartIndex, "orphan");
        assert!(!failed.is_success());
        assert_eq!(
            failed.into_result().unwrap_err().rule(),
            RuleId::OrphanDocPartIndex
        );
    }

    #[test]
    fn display_names() {
        assert_eq!(NodeKind::DocPartIndex.to_string(), "doc part index");
        assert_eq!(RuleId::NoApplicableRule.to_string(), "no_applicable_rule");
        assert_eq!(RuleId::MissingDocPartIndex.to_string(), "missing_doc_part_index");
    }
}
