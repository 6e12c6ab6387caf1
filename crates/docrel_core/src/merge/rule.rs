//! Generic merge step and the rules shared by every level.

use crate::merge::result::{ExecutionResult, MergeConflict, NodeKind, RuleId};
use crate::metainfo::collection::{MetaCollection, MutableMetaCollection};
use crate::metainfo::doc_part::MutableMetaDocPart;
use crate::metainfo::state::MetaElementState;
use tracing::trace;

/// One level of the metadata tree, seen from the merge.
///
/// `Self` is the changed element as found in a transaction's overlay;
/// `Committed` is the element type stored in the committed parent.
pub(crate) trait MergeNode: Sized + 'static {
    /// Level this node lives on.
    const KIND: NodeKind;

    /// Committed container the element is looked up in.
    type Parent: 'static;
    /// Element type stored in the committed container.
    type Committed: 'static;
    /// Builder of the container being produced.
    type Builder;

    /// Rules for added and modified elements, in priority order.
    const ADD_RULES: &'static [Rule<Self>];
    /// Rules for removed elements, in priority order.
    const REMOVE_RULES: &'static [Rule<Self>];

    /// Committed sibling with the same name key.
    fn by_name<'p>(parent: &'p Self::Parent, changed: &Self) -> Option<&'p Self::Committed>;

    /// Committed sibling with the same identifier.
    fn by_identifier<'p>(parent: &'p Self::Parent, changed: &Self) -> Option<&'p Self::Committed>;

    /// Returns true if both lookups found the same committed element.
    fn same(a: &Self::Committed, b: &Self::Committed) -> bool {
        std::ptr::eq(a, b)
    }

    /// Name key, as shown in conflict messages.
    fn node_key(&self) -> String;

    /// Backend identifier.
    fn node_identifier(&self) -> &str;

    /// Name key of a committed element.
    fn committed_key(committed: &Self::Committed) -> String;

    /// Backend identifier of a committed element.
    fn committed_identifier(committed: &Self::Committed) -> &str;

    /// Path segment of this element in conflict messages.
    fn segment(&self) -> String;

    /// Copies a new element into `builder`.
    fn insert_new(ctx: &MergeContext<'_, Self>, builder: &mut Self::Builder) -> ExecutionResult;

    /// Merges the element into its committed counterpart.
    fn merge_existing(
        ctx: &MergeContext<'_, Self>,
        existing: &Self::Committed,
        builder: &mut Self::Builder,
    ) -> ExecutionResult;

    /// Deletes a committed element from `builder`.
    fn remove(existing: &Self::Committed, builder: &mut Self::Builder);
}

/// Context collected once per element and handed to every rule.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MergeScope<'a> {
    /// The transaction's copy of the enclosing collection.
    pub(crate) new_collection: Option<&'a MutableMetaCollection>,
    /// The committed collection the changes are merged into.
    pub(crate) old_collection: Option<&'a MetaCollection>,
    /// The transaction's copy of the enclosing doc part.
    pub(crate) new_doc_part: Option<&'a MutableMetaDocPart>,
}

pub(crate) struct MergeContext<'a, N: MergeNode> {
    pub(crate) parent: &'a N::Parent,
    pub(crate) changed: &'a N,
    pub(crate) state: MetaElementState,
    pub(crate) by_name: Option<&'a N::Committed>,
    pub(crate) by_identifier: Option<&'a N::Committed>,
    pub(crate) scope: MergeScope<'a>,
}

impl<N: MergeNode> MergeContext<'_, N> {
    /// Returns true if name and identifier found the same committed element.
    pub(crate) fn same_element(&self) -> bool {
        matches!((self.by_name, self.by_identifier), (Some(a), Some(b)) if N::same(a, b))
    }
}

/// A predicate and the action taken when it holds.
pub(crate) struct Rule<N: MergeNode> {
    pub(crate) id: RuleId,
    pub(crate) applies: fn(&MergeContext<'_, N>) -> bool,
    pub(crate) execute: fn(&MergeContext<'_, N>, &mut N::Builder) -> ExecutionResult,
}

impl<N: MergeNode> Rule<N> {
    pub(crate) const fn new_element() -> Self {
        Self {
            id: RuleId::NewElement,
            applies: nothing_matches::<N>,
            execute: insert_new::<N>,
        }
    }

    pub(crate) const fn name_conflict() -> Self {
        Self {
            id: RuleId::NameConflict,
            applies: name_taken::<N>,
            execute: report_name_conflict::<N>,
        }
    }

    pub(crate) const fn identifier_conflict() -> Self {
        Self {
            id: RuleId::IdentifierConflict,
            applies: identifier_taken::<N>,
            execute: report_identifier_conflict::<N>,
        }
    }

    pub(crate) const fn modify_existing() -> Self {
        Self {
            id: RuleId::ModifyExisting,
            applies: same_element::<N>,
            execute: modify_existing::<N>,
        }
    }

    pub(crate) const fn already_absent() -> Self {
        Self {
            id: RuleId::AlreadyAbsent,
            applies: nothing_matches::<N>,
            execute: succeed::<N>,
        }
    }

    pub(crate) const fn identity_mismatch() -> Self {
        Self {
            id: RuleId::IdentityMismatch,
            applies: identity_differs::<N>,
            execute: report_identity_mismatch::<N>,
        }
    }

    pub(crate) const fn remove() -> Self {
        Self {
            id: RuleId::Remove,
            applies: same_element::<N>,
            execute: remove_existing::<N>,
        }
    }
}

/// Merges one changed element into `builder`.
///
/// `parent` is the container as merged so far, so an element removed and
/// re-added by the same transaction is seen as new.
pub(crate) fn merge_element<N: MergeNode>(
    parent: &N::Parent,
    changed: &N,
    state: MetaElementState,
    scope: MergeScope<'_>,
    builder: &mut N::Builder,
) -> Result<(), MergeConflict> {
    let rules = match state {
        MetaElementState::NotChanged => return Ok(()),
        MetaElementState::Removed => N::REMOVE_RULES,
        MetaElementState::Added | MetaElementState::Modified => N::ADD_RULES,
    };
    let ctx = MergeContext {
        parent,
        changed,
        state,
        by_name: N::by_name(parent, changed),
        by_identifier: N::by_identifier(parent, changed),
        scope,
    };

    let result = match rules.iter().find(|rule| (rule.applies)(&ctx)) {
        Some(rule) => {
            trace!(kind = %N::KIND, element = %changed.segment(), %state, rule = %rule.id, "merge rule");
            (rule.execute)(&ctx, builder)
        }
        None => no_applicable_rule(&ctx),
    };
    result
        .into_result()
        .map_err(|conflict| conflict.within(changed.segment()))
}

fn nothing_matches<N: MergeNode>(ctx: &MergeContext<'_, N>) -> bool {
    ctx.by_name.is_none() && ctx.by_identifier.is_none()
}

fn name_taken<N: MergeNode>(ctx: &MergeContext<'_, N>) -> bool {
    ctx.by_name.is_some() && !ctx.same_element()
}

fn identifier_taken<N: MergeNode>(ctx: &MergeContext<'_, N>) -> bool {
    ctx.by_name.is_none() && ctx.by_identifier.is_some()
}

fn same_element<N: MergeNode>(ctx: &MergeContext<'_, N>) -> bool {
    ctx.same_element()
}

fn identity_differs<N: MergeNode>(ctx: &MergeContext<'_, N>) -> bool {
    !ctx.same_element()
}

fn insert_new<N: MergeNode>(ctx: &MergeContext<'_, N>, builder: &mut N::Builder) -> ExecutionResult {
    N::insert_new(ctx, builder)
}

fn succeed<N: MergeNode>(_: &MergeContext<'_, N>, _: &mut N::Builder) -> ExecutionResult {
    ExecutionResult::Success
}

fn modify_existing<N: MergeNode>(ctx: &MergeContext<'_, N>, builder: &mut N::Builder) -> ExecutionResult {
    match ctx.by_name {
        Some(existing) => N::merge_existing(ctx, existing, builder),
        None => no_applicable_rule(ctx),
    }
}

fn remove_existing<N: MergeNode>(ctx: &MergeContext<'_, N>, builder: &mut N::Builder) -> ExecutionResult {
    match ctx.by_name {
        Some(existing) => {
            N::remove(existing, builder);
            ExecutionResult::Success
        }
        None => no_applicable_rule(ctx),
    }
}

fn report_name_conflict<N: MergeNode>(ctx: &MergeContext<'_, N>, _: &mut N::Builder) -> ExecutionResult {
    let previous = ctx.by_name.map(N::committed_identifier).unwrap_or_default();
    ExecutionResult::error(
        RuleId::NameConflict,
        format!(
            "there is a previous {} whose name is {} that has a different identifier. \
             The previous element identifier is {} and the new one is {}",
            N::KIND,
            ctx.changed.node_key(),
            previous,
            ctx.changed.node_identifier()
        ),
    )
}

fn report_identifier_conflict<N: MergeNode>(ctx: &MergeContext<'_, N>, _: &mut N::Builder) -> ExecutionResult {
    let previous = ctx.by_identifier.map(N::committed_key).unwrap_or_default();
    ExecutionResult::error(
        RuleId::IdentifierConflict,
        format!(
            "there is a previous {} whose identifier is {} that has a different name. \
             The previous element name is {} and the new one is {}",
            N::KIND,
            ctx.changed.node_identifier(),
            previous,
            ctx.changed.node_key()
        ),
    )
}

fn report_identity_mismatch<N: MergeNode>(ctx: &MergeContext<'_, N>, _: &mut N::Builder) -> ExecutionResult {
    let detail = match (ctx.by_name, ctx.by_identifier) {
        (Some(named), _) => format!(
            "cannot remove {} {}: the committed one has identifier {}, not {}",
            N::KIND,
            ctx.changed.node_key(),
            N::committed_identifier(named),
            ctx.changed.node_identifier()
        ),
        (None, Some(identified)) => format!(
            "cannot remove {} with identifier {}: the committed one is named {}, not {}",
            N::KIND,
            ctx.changed.node_identifier(),
            N::committed_key(identified),
            ctx.changed.node_key()
        ),
        (None, None) => format!("cannot remove {} {}", N::KIND, ctx.changed.node_key()),
    };
    ExecutionResult::error(RuleId::IdentityMismatch, detail)
}

fn no_applicable_rule<N: MergeNode>(ctx: &MergeContext<'_, N>) -> ExecutionResult {
    ExecutionResult::error(
        RuleId::NoApplicableRule,
        format!(
            "no merge rule applies to {} {} in state {}",
            N::KIND,
            ctx.changed.node_key(),
            ctx.state
        ),
    )
}
