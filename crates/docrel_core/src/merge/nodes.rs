//! `MergeNode` for every level of the metadata tree.
//!
//! Containers rebuild from their committed counterpart and merge their
//! changed children in the order the transaction touched them. Leaves are
//! copied in or checked for equality.

use crate::merge::index_rules;
use crate::merge::result::{ExecutionResult, MergeConflict, NodeKind, RuleId};
use crate::merge::rule::{merge_element, MergeContext, MergeNode, MergeScope, Rule};
use crate::metainfo::collection::{MetaCollection, MetaCollectionBuilder, MutableMetaCollection};
use crate::metainfo::database::{MetaDatabase, MetaDatabaseBuilder, MutableMetaDatabase};
use crate::metainfo::doc_part::{MetaDocPart, MetaDocPartBuilder, MutableMetaDocPart};
use crate::metainfo::field::{MetaField, MetaScalar};
use crate::metainfo::index::{MetaDocPartIndex, MetaIndex};
use crate::metainfo::read::{MetaCollectionRead, MetaDatabaseRead, MetaDocPartRead};
use crate::metainfo::snapshot::{ImmutableMetaSnapshot, SnapshotBuilder};

fn merge_database(
    base: &MetaDatabase,
    changed: &MutableMetaDatabase,
) -> Result<MetaDatabase, MergeConflict> {
    let mut builder = base.to_builder();
    for (collection, state) in changed.collection_changes() {
        let current = builder.build();
        merge_element(&current, collection, state, MergeScope::default(), &mut builder)?;
    }
    Ok(builder.build())
}

fn merge_collection(
    base: &MetaCollection,
    changed: &MutableMetaCollection,
) -> Result<MetaCollection, MergeConflict> {
    let scope = MergeScope {
        new_collection: Some(changed),
        old_collection: Some(base),
        new_doc_part: None,
    };
    let mut builder = base.to_builder();
    for (doc_part, state) in changed.doc_part_changes() {
        let current = builder.build();
        merge_element(&current, doc_part, state, scope, &mut builder)?;
    }
    for (index, state) in changed.index_changes() {
        let current = builder.build();
        merge_element(&current, index, state, scope, &mut builder)?;
    }
    Ok(builder.build())
}

fn merge_doc_part(
    base: &MetaDocPart,
    changed: &MutableMetaDocPart,
    scope: MergeScope<'_>,
) -> Result<MetaDocPart, MergeConflict> {
    let scope = MergeScope {
        new_doc_part: Some(changed),
        ..scope
    };
    let mut builder = base.to_builder();
    for (field, state) in changed.field_changes() {
        let current = builder.build();
        merge_element(&current, field, state, scope, &mut builder)?;
    }
    for (scalar, state) in changed.scalar_changes() {
        let current = builder.build();
        merge_element(&current, scalar, state, scope, &mut builder)?;
    }
    for (index, state) in changed.doc_part_index_changes() {
        let current = builder.build();
        merge_element(&current, index, state, scope, &mut builder)?;
    }
    builder.raise_last_rid(changed.last_rid());
    Ok(builder.build())
}

impl MergeNode for MutableMetaDatabase {
    const KIND: NodeKind = NodeKind::Database;

    type Parent = ImmutableMetaSnapshot;
    type Committed = MetaDatabase;
    type Builder = SnapshotBuilder;

    const ADD_RULES: &'static [Rule<Self>] = &[
        Rule::new_element(),
        Rule::name_conflict(),
        Rule::identifier_conflict(),
        Rule::modify_existing(),
    ];
    const REMOVE_RULES: &'static [Rule<Self>] = &[
        Rule::already_absent(),
        Rule::identity_mismatch(),
        Rule::remove(),
    ];

    fn by_name<'p>(parent: &'p ImmutableMetaSnapshot, changed: &Self) -> Option<&'p MetaDatabase> {
        parent.database(changed.name())
    }

    fn by_identifier<'p>(parent: &'p ImmutableMetaSnapshot, changed: &Self) -> Option<&'p MetaDatabase> {
        parent.database_with_identifier(changed.identifier())
    }

    fn node_key(&self) -> String {
        self.name().to_owned()
    }

    fn node_identifier(&self) -> &str {
        self.identifier()
    }

    fn committed_key(committed: &MetaDatabase) -> String {
        committed.name().to_owned()
    }

    fn committed_identifier(committed: &MetaDatabase) -> &str {
        committed.identifier()
    }

    fn segment(&self) -> String {
        self.name().to_owned()
    }

    fn insert_new(ctx: &MergeContext<'_, Self>, builder: &mut SnapshotBuilder) -> ExecutionResult {
        merge_database(ctx.changed.base(), ctx.changed)
            .map(|database| {
                builder.put_database(database);
            })
            .into()
    }

    fn merge_existing(
        ctx: &MergeContext<'_, Self>,
        existing: &MetaDatabase,
        builder: &mut SnapshotBuilder,
    ) -> ExecutionResult {
        merge_database(existing, ctx.changed)
            .map(|database| {
                builder.put_database(database);
            })
            .into()
    }

    fn remove(existing: &MetaDatabase, builder: &mut SnapshotBuilder) {
        builder.remove_database(existing.name());
    }
}

impl MergeNode for MutableMetaCollection {
    const KIND: NodeKind = NodeKind::Collection;

    type Parent = MetaDatabase;
    type Committed = MetaCollection;
    type Builder = MetaDatabaseBuilder;

    const ADD_RULES: &'static [Rule<Self>] = &[
        Rule::new_element(),
        Rule::name_conflict(),
        Rule::identifier_conflict(),
        Rule::modify_existing(),
    ];
    const REMOVE_RULES: &'static [Rule<Self>] = &[
        Rule::already_absent(),
        Rule::identity_mismatch(),
        Rule::remove(),
    ];

    fn by_name<'p>(parent: &'p MetaDatabase, changed: &Self) -> Option<&'p MetaCollection> {
        parent.collection(changed.name())
    }

    fn by_identifier<'p>(parent: &'p MetaDatabase, changed: &Self) -> Option<&'p MetaCollection> {
        parent.collection_with_identifier(changed.identifier())
    }

    fn node_key(&self) -> String {
        self.name().to_owned()
    }

    fn node_identifier(&self) -> &str {
        self.identifier()
    }

    fn committed_key(committed: &MetaCollection) -> String {
        committed.name().to_owned()
    }

    fn committed_identifier(committed: &MetaCollection) -> &str {
        committed.identifier()
    }

    fn segment(&self) -> String {
        self.name().to_owned()
    }

    fn insert_new(ctx: &MergeContext<'_, Self>, builder: &mut MetaDatabaseBuilder) -> ExecutionResult {
        merge_collection(ctx.changed.base(), ctx.changed)
            .map(|collection| {
                builder.put_collection(collection);
            })
            .into()
    }

    fn merge_existing(
        ctx: &MergeContext<'_, Self>,
        existing: &MetaCollection,
        builder: &mut MetaDatabaseBuilder,
    ) -> ExecutionResult {
        merge_collection(existing, ctx.changed)
            .map(|collection| {
                builder.put_collection(collection);
            })
            .into()
    }

    fn remove(existing: &MetaCollection, builder: &mut MetaDatabaseBuilder) {
        builder.remove_collection(existing.name());
    }
}

impl MergeNode for MutableMetaDocPart {
    const KIND: NodeKind = NodeKind::DocPart;

    type Parent = MetaCollection;
    type Committed = MetaDocPart;
    type Builder = MetaCollectionBuilder;

    const ADD_RULES: &'static [Rule<Self>] = &[
        Rule::new_element(),
        Rule::name_conflict(),
        Rule::identifier_conflict(),
        Rule::modify_existing(),
    ];
    const REMOVE_RULES: &'static [Rule<Self>] = &[
        Rule::already_absent(),
        Rule::identity_mismatch(),
        Rule::remove(),
    ];

    fn by_name<'p>(parent: &'p MetaCollection, changed: &Self) -> Option<&'p MetaDocPart> {
        parent.doc_part(changed.table_ref())
    }

    fn by_identifier<'p>(parent: &'p MetaCollection, changed: &Self) -> Option<&'p MetaDocPart> {
        parent.doc_part_with_identifier(changed.identifier())
    }

    fn node_key(&self) -> String {
        self.table_ref().to_string()
    }

    fn node_identifier(&self) -> &str {
        self.identifier()
    }

    fn committed_key(committed: &MetaDocPart) -> String {
        committed.table_ref().to_string()
    }

    fn committed_identifier(committed: &MetaDocPart) -> &str {
        committed.identifier()
    }

    fn segment(&self) -> String {
        self.table_ref().to_string()
    }

    fn insert_new(ctx: &MergeContext<'_, Self>, builder: &mut MetaCollectionBuilder) -> ExecutionResult {
        merge_doc_part(ctx.changed.base(), ctx.changed, ctx.scope)
            .map(|doc_part| {
                builder.put_doc_part(doc_part);
            })
            .into()
    }

    fn merge_existing(
        ctx: &MergeContext<'_, Self>,
        existing: &MetaDocPart,
        builder: &mut MetaCollectionBuilder,
    ) -> ExecutionResult {
        merge_doc_part(existing, ctx.changed, ctx.scope)
            .map(|doc_part| {
                builder.put_doc_part(doc_part);
            })
            .into()
    }

    fn remove(existing: &MetaDocPart, builder: &mut MetaCollectionBuilder) {
        builder.remove_doc_part(existing.table_ref());
    }
}

impl MergeNode for MetaField {
    const KIND: NodeKind = NodeKind::Field;

    type Parent = MetaDocPart;
    type Committed = MetaField;
    type Builder = MetaDocPartBuilder;

    const ADD_RULES: &'static [Rule<Self>] = &[
        index_rules::unindexed_field(),
        Rule::new_element(),
        Rule::name_conflict(),
        Rule::identifier_conflict(),
        Rule::modify_existing(),
    ];
    const REMOVE_RULES: &'static [Rule<Self>] = &[
        Rule::already_absent(),
        Rule::identity_mismatch(),
        Rule::remove(),
    ];

    fn by_name<'p>(parent: &'p MetaDocPart, changed: &Self) -> Option<&'p MetaField> {
        parent.field_by_name_and_type(changed.name(), changed.field_type())
    }

    fn by_identifier<'p>(parent: &'p MetaDocPart, changed: &Self) -> Option<&'p MetaField> {
        parent.field_by_identifier(changed.identifier())
    }

    fn node_key(&self) -> String {
        Self::committed_key(self)
    }

    fn node_identifier(&self) -> &str {
        self.identifier()
    }

    fn committed_key(committed: &MetaField) -> String {
        format!("{} ({})", committed.name(), committed.field_type())
    }

    fn committed_identifier(committed: &MetaField) -> &str {
        committed.identifier()
    }

    fn segment(&self) -> String {
        self.name().to_owned()
    }

    fn insert_new(ctx: &MergeContext<'_, Self>, builder: &mut MetaDocPartBuilder) -> ExecutionResult {
        builder.put_field(ctx.changed.clone());
        ExecutionResult::Success
    }

    fn merge_existing(
        ctx: &MergeContext<'_, Self>,
        existing: &MetaField,
        _: &mut MetaDocPartBuilder,
    ) -> ExecutionResult {
        leaf_unchanged(ctx, existing)
    }

    fn remove(existing: &MetaField, builder: &mut MetaDocPartBuilder) {
        builder.remove_field(existing.name(), existing.field_type());
    }
}

impl MergeNode for MetaScalar {
    const KIND: NodeKind = NodeKind::Scalar;

    type Parent = MetaDocPart;
    type Committed = MetaScalar;
    type Builder = MetaDocPartBuilder;

    const ADD_RULES: &'static [Rule<Self>] = &[
        Rule::new_element(),
        Rule::name_conflict(),
        Rule::identifier_conflict(),
        Rule::modify_existing(),
    ];
    const REMOVE_RULES: &'static [Rule<Self>] = &[
        Rule::already_absent(),
        Rule::identity_mismatch(),
        Rule::remove(),
    ];

    fn by_name<'p>(parent: &'p MetaDocPart, changed: &Self) -> Option<&'p MetaScalar> {
        parent.scalar(changed.field_type())
    }

    fn by_identifier<'p>(parent: &'p MetaDocPart, changed: &Self) -> Option<&'p MetaScalar> {
        parent.scalar_by_identifier(changed.identifier())
    }

    fn node_key(&self) -> String {
        self.field_type().to_string()
    }

    fn node_identifier(&self) -> &str {
        self.identifier()
    }

    fn committed_key(committed: &MetaScalar) -> String {
        committed.field_type().to_string()
    }

    fn committed_identifier(committed: &MetaScalar) -> &str {
        committed.identifier()
    }

    fn segment(&self) -> String {
        self.identifier().to_owned()
    }

    fn insert_new(ctx: &MergeContext<'_, Self>, builder: &mut MetaDocPartBuilder) -> ExecutionResult {
        builder.put_scalar(ctx.changed.clone());
        ExecutionResult::Success
    }

    fn merge_existing(
        ctx: &MergeContext<'_, Self>,
        existing: &MetaScalar,
        _: &mut MetaDocPartBuilder,
    ) -> ExecutionResult {
        leaf_unchanged(ctx, existing)
    }

    fn remove(existing: &MetaScalar, builder: &mut MetaDocPartBuilder) {
        builder.remove_scalar(existing.field_type());
    }
}

impl MergeNode for MetaIndex {
    const KIND: NodeKind = NodeKind::Index;

    type Parent = MetaCollection;
    type Committed = MetaIndex;
    type Builder = MetaCollectionBuilder;

    const ADD_RULES: &'static [Rule<Self>] = &[
        index_rules::conflicting_index(),
        index_rules::unimplemented_index(),
        Rule::new_element(),
        Rule::name_conflict(),
        Rule::identifier_conflict(),
        Rule::modify_existing(),
    ];
    const REMOVE_RULES: &'static [Rule<Self>] = &[
        Rule::already_absent(),
        Rule::identity_mismatch(),
        index_rules::orphans_doc_part_index(),
        Rule::remove(),
    ];

    fn by_name<'p>(parent: &'p MetaCollection, changed: &Self) -> Option<&'p MetaIndex> {
        parent.index_by_name(changed.name())
    }

    // Logical indexes have no backend identifier of their own.
    fn by_identifier<'p>(parent: &'p MetaCollection, changed: &Self) -> Option<&'p MetaIndex> {
        parent.index_by_name(changed.name())
    }

    fn node_key(&self) -> String {
        self.name().to_owned()
    }

    fn node_identifier(&self) -> &str {
        self.name()
    }

    fn committed_key(committed: &MetaIndex) -> String {
        committed.name().to_owned()
    }

    fn committed_identifier(committed: &MetaIndex) -> &str {
        committed.name()
    }

    fn segment(&self) -> String {
        self.name().to_owned()
    }

    fn insert_new(ctx: &MergeContext<'_, Self>, builder: &mut MetaCollectionBuilder) -> ExecutionResult {
        builder.put_index(ctx.changed.clone());
        ExecutionResult::Success
    }

    fn merge_existing(
        ctx: &MergeContext<'_, Self>,
        existing: &MetaIndex,
        _: &mut MetaCollectionBuilder,
    ) -> ExecutionResult {
        if existing.same_definition(ctx.changed) {
            ExecutionResult::Success
        } else {
            ExecutionResult::error(
                RuleId::AttributeConflict,
                format!(
                    "there is a previous index named {} with a different definition",
                    existing.name()
                ),
            )
        }
    }

    fn remove(existing: &MetaIndex, builder: &mut MetaCollectionBuilder) {
        builder.remove_index(existing.name());
    }
}

impl MergeNode for MetaDocPartIndex {
    const KIND: NodeKind = NodeKind::DocPartIndex;

    type Parent = MetaDocPart;
    type Committed = MetaDocPartIndex;
    type Builder = MetaDocPartBuilder;

    const ADD_RULES: &'static [Rule<Self>] = &[
        index_rules::orphan_doc_part_index(),
        Rule::new_element(),
        Rule::name_conflict(),
        Rule::identifier_conflict(),
        Rule::modify_existing(),
    ];
    const REMOVE_RULES: &'static [Rule<Self>] = &[
        Rule::already_absent(),
        Rule::identity_mismatch(),
        index_rules::still_referenced(),
        Rule::remove(),
    ];

    // Two physical indexes over the same columns are the same index.
    fn by_name<'p>(parent: &'p MetaDocPart, changed: &Self) -> Option<&'p MetaDocPartIndex> {
        parent.doc_part_indexes().find(|index| index.same_columns(changed))
    }

    fn by_identifier<'p>(parent: &'p MetaDocPart, changed: &Self) -> Option<&'p MetaDocPartIndex> {
        parent.doc_part_index_by_identifier(changed.identifier())
    }

    fn node_key(&self) -> String {
        self.signature()
    }

    fn node_identifier(&self) -> &str {
        self.identifier()
    }

    fn committed_key(committed: &MetaDocPartIndex) -> String {
        committed.signature()
    }

    fn committed_identifier(committed: &MetaDocPartIndex) -> &str {
        committed.identifier()
    }

    fn segment(&self) -> String {
        self.identifier().to_owned()
    }

    fn insert_new(ctx: &MergeContext<'_, Self>, builder: &mut MetaDocPartBuilder) -> ExecutionResult {
        builder.put_doc_part_index(ctx.changed.clone());
        ExecutionResult::Success
    }

    fn merge_existing(
        ctx: &MergeContext<'_, Self>,
        existing: &MetaDocPartIndex,
        _: &mut MetaDocPartBuilder,
    ) -> ExecutionResult {
        leaf_unchanged(ctx, existing)
    }

    fn remove(existing: &MetaDocPartIndex, builder: &mut MetaDocPartBuilder) {
        builder.remove_doc_part_index(existing.identifier());
    }
}

fn leaf_unchanged<N>(ctx: &MergeContext<'_, N>, existing: &N) -> ExecutionResult
where
    N: MergeNode<Committed = N> + PartialEq,
{
    if existing == ctx.changed {
        ExecutionResult::Success
    } else {
        ExecutionResult::error(
            RuleId::AttributeConflict,
            format!(
                "the previous {} {} has different attributes",
                N::KIND,
                ctx.changed.node_key()
            ),
        )
    }
}
