//! Rules that keep logical and physical indexes consistent.
//!
//! Every committed physical index must be compatible with at least one
//! committed logical index, and every committed logical index must be
//! implemented by a physical index on each doc part it covers. Both sides
//! may change in the same transaction, so the logical indexes that count are
//! the ones this transaction added plus the latest committed ones it did not
//! remove. The transaction's own base is never consulted: it may still hold
//! indexes another transaction removed since.

use crate::merge::result::{ExecutionResult, RuleId};
use crate::merge::rule::{MergeContext, MergeScope, Rule};
use crate::metainfo::collection::MetaCollectionBuilder;
use crate::metainfo::doc_part::{MetaDocPart, MetaDocPartBuilder};
use crate::metainfo::field::MetaField;
use crate::metainfo::index::{MetaDocPartIndex, MetaIndex};
use crate::metainfo::read::{MetaCollectionRead, MetaDocPartRead};
use crate::metainfo::table_ref::TableRef;

pub(crate) const fn conflicting_index() -> Rule<MetaIndex> {
    Rule {
        id: RuleId::ConflictingIndex,
        applies: has_twin_index,
        execute: report_twin_index,
    }
}

pub(crate) const fn unimplemented_index() -> Rule<MetaIndex> {
    Rule {
        id: RuleId::MissingDocPartIndex,
        applies: leaves_doc_part_unindexed,
        execute: report_unindexed_doc_part,
    }
}

pub(crate) const fn orphans_doc_part_index() -> Rule<MetaIndex> {
    Rule {
        id: RuleId::OrphansDocPartIndex,
        applies: orphans_on_removal,
        execute: report_orphaned_by_removal,
    }
}

pub(crate) const fn unindexed_field() -> Rule<MetaField> {
    Rule {
        id: RuleId::MissingDocPartIndex,
        applies: leaves_field_unindexed,
        execute: report_unindexed_field,
    }
}

pub(crate) const fn orphan_doc_part_index() -> Rule<MetaDocPartIndex> {
    Rule {
        id: RuleId::OrphanDocPartIndex,
        applies: is_orphan,
        execute: report_orphan,
    }
}

pub(crate) const fn still_referenced() -> Rule<MetaDocPartIndex> {
    Rule {
        id: RuleId::StillReferenced,
        applies: is_still_referenced,
        execute: report_still_referenced,
    }
}

fn removed_here(scope: &MergeScope<'_>, name: &str) -> bool {
    scope
        .new_collection
        .is_some_and(|collection| collection.is_index_removed(name))
}

/// Logical indexes that survive the merge.
fn remaining_indexes<'a>(scope: &MergeScope<'a>) -> Vec<&'a MetaIndex> {
    let mut indexes: Vec<&'a MetaIndex> = Vec::new();
    if let Some(new_collection) = scope.new_collection {
        indexes.extend(
            new_collection
                .index_changes()
                .filter(|(_, state)| state.is_alive())
                .map(|(index, _)| index),
        );
    }
    if let Some(old_collection) = scope.old_collection {
        for index in old_collection.indexes() {
            if !removed_here(scope, index.name()) && !indexes.iter().any(|i| i.name() == index.name()) {
                indexes.push(index);
            }
        }
    }
    indexes
}

fn twin_index<'a>(ctx: &MergeContext<'a, MetaIndex>) -> Option<&'a MetaIndex> {
    ctx.parent.indexes().find(|index| {
        index.name() != ctx.changed.name()
            && index.same_definition(ctx.changed)
            && !removed_here(&ctx.scope, index.name())
    })
}

fn has_twin_index(ctx: &MergeContext<'_, MetaIndex>) -> bool {
    twin_index(ctx).is_some()
}

fn report_twin_index(ctx: &MergeContext<'_, MetaIndex>, _: &mut MetaCollectionBuilder) -> ExecutionResult {
    let twin = twin_index(ctx).map(MetaIndex::name).unwrap_or_default();
    ExecutionResult::error(
        RuleId::ConflictingIndex,
        format!(
            "index {} has the same definition as the previous index {twin}",
            ctx.changed.name()
        ),
    )
}

/// Doc part, as merged so far, with a column combination the new index
/// covers but no physical index implements.
///
/// A redefinition under a committed name is left to the attribute check.
fn unindexed_doc_part<'a>(ctx: &MergeContext<'a, MetaIndex>) -> Option<(&'a MetaDocPart, Vec<String>)> {
    if ctx
        .by_name
        .is_some_and(|existing| !existing.same_definition(ctx.changed))
    {
        return None;
    }
    ctx.parent.meta_doc_parts().find_map(|doc_part| {
        ctx.changed
            .unimplemented_combinations(doc_part)
            .into_iter()
            .next()
            .map(|columns| (doc_part, columns))
    })
}

fn leaves_doc_part_unindexed(ctx: &MergeContext<'_, MetaIndex>) -> bool {
    unindexed_doc_part(ctx).is_some()
}

fn report_unindexed_doc_part(
    ctx: &MergeContext<'_, MetaIndex>,
    _: &mut MetaCollectionBuilder,
) -> ExecutionResult {
    let detail = match unindexed_doc_part(ctx) {
        Some((doc_part, columns)) => format!(
            "index {} needs a doc part index on ({}) of {}, which this transaction did not create",
            ctx.changed.name(),
            columns.join(", "),
            doc_part.table_ref()
        ),
        None => format!("index {} is missing a doc part index", ctx.changed.name()),
    };
    ExecutionResult::error(RuleId::MissingDocPartIndex, detail)
}

/// Latest committed index covering a newly added field whose physical index
/// this transaction did not create.
fn index_missing_for_field<'a>(ctx: &MergeContext<'a, MetaField>) -> Option<&'a MetaIndex> {
    let doc_part = ctx.scope.new_doc_part?;
    let old_collection = ctx.scope.old_collection?;
    old_collection.indexes().find(|index| {
        !removed_here(&ctx.scope, index.name())
            && index
                .unimplemented_combinations(doc_part)
                .iter()
                .any(|columns| columns.iter().any(|column| column == ctx.changed.identifier()))
    })
}

fn leaves_field_unindexed(ctx: &MergeContext<'_, MetaField>) -> bool {
    ctx.by_name.is_none() && ctx.by_identifier.is_none() && index_missing_for_field(ctx).is_some()
}

fn report_unindexed_field(ctx: &MergeContext<'_, MetaField>, _: &mut MetaDocPartBuilder) -> ExecutionResult {
    let index = index_missing_for_field(ctx).map(MetaIndex::name).unwrap_or_default();
    ExecutionResult::error(
        RuleId::MissingDocPartIndex,
        format!(
            "field {} ({}) is covered by index {index} but no doc part index implements it",
            ctx.changed.name(),
            ctx.changed.field_type()
        ),
    )
}

fn orphaned_by_removal<'a>(ctx: &MergeContext<'a, MetaIndex>) -> Option<(&'a TableRef, &'a MetaDocPartIndex)> {
    let removed = ctx.by_name?;
    let survivors = remaining_indexes(&ctx.scope);
    ctx.parent.meta_doc_parts().find_map(|doc_part| {
        doc_part
            .doc_part_indexes()
            .find(|physical| {
                removed.is_compatible(doc_part, physical)
                    && !survivors
                        .iter()
                        .any(|logical| logical.is_compatible(doc_part, physical))
            })
            .map(|physical| (doc_part.table_ref(), physical))
    })
}

fn orphans_on_removal(ctx: &MergeContext<'_, MetaIndex>) -> bool {
    orphaned_by_removal(ctx).is_some()
}

fn report_orphaned_by_removal(
    ctx: &MergeContext<'_, MetaIndex>,
    _: &mut MetaCollectionBuilder,
) -> ExecutionResult {
    let detail = match orphaned_by_removal(ctx) {
        Some((table_ref, physical)) => format!(
            "removing index {} would leave the doc part index {} of {table_ref} without a compatible index",
            ctx.changed.name(),
            physical.identifier()
        ),
        None => format!("removing index {} would orphan a doc part index", ctx.changed.name()),
    };
    ExecutionResult::error(RuleId::OrphansDocPartIndex, detail)
}

fn is_orphan(ctx: &MergeContext<'_, MetaDocPartIndex>) -> bool {
    let Some(doc_part) = ctx.scope.new_doc_part else {
        return false;
    };
    !remaining_indexes(&ctx.scope)
        .iter()
        .any(|logical| logical.is_compatible(doc_part, ctx.changed))
}

fn report_orphan(ctx: &MergeContext<'_, MetaDocPartIndex>, _: &mut MetaDocPartBuilder) -> ExecutionResult {
    ExecutionResult::error(
        RuleId::OrphanDocPartIndex,
        format!(
            "the doc part index {} {} is not compatible with any index of the collection",
            ctx.changed.identifier(),
            ctx.changed.signature()
        ),
    )
}

fn referencing_index<'a>(ctx: &MergeContext<'a, MetaDocPartIndex>) -> Option<&'a MetaIndex> {
    let committed = ctx.by_identifier?;
    remaining_indexes(&ctx.scope)
        .into_iter()
        .find(|logical| logical.is_compatible(ctx.parent, committed))
}

fn is_still_referenced(ctx: &MergeContext<'_, MetaDocPartIndex>) -> bool {
    referencing_index(ctx).is_some()
}

fn report_still_referenced(
    ctx: &MergeContext<'_, MetaDocPartIndex>,
    _: &mut MetaDocPartBuilder,
) -> ExecutionResult {
    let referencing = referencing_index(ctx).map(MetaIndex::name).unwrap_or_default();
    ExecutionResult::error(
        RuleId::StillReferenced,
        format!(
            "the doc part index {} cannot be removed because index {referencing} is still compatible with it",
            ctx.changed.identifier()
        ),
    )
}
