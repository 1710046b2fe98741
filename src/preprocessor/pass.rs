use std::rc::Rc;

use enum_dispatch::enum_dispatch;
use strum_macros::Display;

use crate::error::OptResult;
use crate::expr::ExprRef;
use crate::preprocessor::*;

/// One whole-tree rewrite of the preprocessing pipeline.
///
/// A pass never mutates its input: it returns either the same `Rc` or a new tree sharing the
/// unchanged subtrees.
#[enum_dispatch]
pub trait PreprocessPass {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef>;
}

#[enum_dispatch(PreprocessPass)]
#[derive(Clone, Debug, Display)]
pub enum PassImpl {
    RemoveUnusedCteAnchors,
    RemoveSuperfluousLimit,
    RemoveSuperfluousOuterRefs,
    TrimExistentialSubqueries,
    PruneSuperfluousEquality,
    SimplifyQuantifiedSubqueries,
    UnnestScalarSubqueries,
    UnnestBoolOps,
    ConvertToArrayIn,
    InferPredicates,
    EliminateSelfComparisons,
    DedupBoolOps,
    FactorizeCommonExprs,
    ExtractInferredFilters,
    PreprocessWindows,
    CollapseUnions,
    PruneUnusedComputedColumns,
    Normalize,
    OuterJoinToInnerJoin,
    CollapseInnerJoins,
    PruneEmptySubtrees,
    CollapseProjects,
    AddProjectBelowSubquery,
    ReorderScalarCmpChildren,
    RewriteInSubqueryToExists,
}

/// The passes of a full preprocessing run, in order.
pub fn default_passes() -> Vec<PassImpl> {
    vec![
        RemoveUnusedCteAnchors.into(),
        RemoveSuperfluousLimit.into(),
        RemoveSuperfluousOuterRefs.into(),
        TrimExistentialSubqueries.into(),
        PruneSuperfluousEquality.into(),
        SimplifyQuantifiedSubqueries.into(),
        UnnestScalarSubqueries.into(),
        UnnestBoolOps.into(),
        ConvertToArrayIn.into(),
        InferPredicates::with_outer_join_inference().into(),
        EliminateSelfComparisons.into(),
        DedupBoolOps.into(),
        FactorizeCommonExprs.into(),
        ExtractInferredFilters.into(),
        PreprocessWindows.into(),
        CollapseUnions.into(),
        PruneUnusedComputedColumns.into(),
        Normalize.into(),
        OuterJoinToInnerJoin.into(),
        CollapseInnerJoins.into(),
        InferPredicates::from_constraints_only().into(),
        PruneEmptySubtrees.into(),
        CollapseProjects.into(),
        AddProjectBelowSubquery.into(),
        ReorderScalarCmpChildren.into(),
        RewriteInSubqueryToExists.into(),
    ]
}

/// Rebuilds `expr` over the mapped children, or hands back `expr` itself when no child changed.
pub(crate) fn map_children<F>(expr: &ExprRef, mut f: F) -> OptResult<ExprRef>
where
    F: FnMut(&ExprRef) -> OptResult<ExprRef>,
{
    let mut changed = false;
    let mut children = Vec::with_capacity(expr.arity());
    for child in expr.children() {
        let new_child = f(child)?;
        changed |= !Rc::ptr_eq(&new_child, child);
        children.push(new_child);
    }
    Ok(if changed {
        expr.with_children(children)
    } else {
        expr.clone()
    })
}

/// Applies `f` to every node, children first.
pub(crate) fn transform_up<F>(expr: &ExprRef, ctx: &PreprocessContext, f: &F) -> OptResult<ExprRef>
where
    F: Fn(&ExprRef) -> OptResult<ExprRef>,
{
    let _guard = ctx.enter()?;
    let rewritten = map_children(expr, |child| transform_up(child, ctx, f))?;
    f(&rewritten)
}

/// Applies `f` top-down. When `f` returns `Some`, its result replaces the node and the
/// traversal does not descend into it.
pub(crate) fn transform_down<F>(
    expr: &ExprRef,
    ctx: &PreprocessContext,
    f: &F,
) -> OptResult<ExprRef>
where
    F: Fn(&ExprRef) -> OptResult<Option<ExprRef>>,
{
    let _guard = ctx.enter()?;
    if let Some(replaced) = f(expr)? {
        return Ok(replaced);
    }
    map_children(expr, |child| transform_down(child, ctx, f))
}
