//! Predicate push-down.
//!
//! Select predicates are split into conjuncts, and each conjunct travels down the tree to the
//! lowest operator whose output covers the columns it reads. Stacked selects merge on the way.
//! A select over a left outer join whose predicate rejects NULLs on the inner side turns the
//! join into an inner join.

use std::collections::BTreeMap;

use log::debug;

use crate::config::TraceFlag;
use crate::error::OptResult;
use crate::expr::{
    conjunction, conjuncts, is_const_true, is_null_rejecting, remap_columns, safe_select, Expr,
    ExprRef,
};
use crate::operator::{ColumnRef, ColumnSet, Join, JoinType, LogicalOperator, SetOp};
use crate::preprocessor::{map_children, PreprocessContext, PreprocessPass};

#[derive(Clone, Debug, Default)]
pub struct Normalize;

impl PreprocessPass for Normalize {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        normalize(expr, ctx)
    }
}

/// Pushes all select and join predicates of `expr` as far down as they can go.
pub fn normalize(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if expr.arity() == 0 {
        return Ok(expr.clone());
    }
    match expr.logical_op() {
        Some(LogicalOperator::LogicalSelect) => {
            let pred = normalize(expr.child(1), ctx)?;
            filter(expr.child(0), pred, ctx)
        }
        Some(LogicalOperator::LogicalJoin(_) | LogicalOperator::LogicalNAryJoin) => {
            let last = expr.arity() - 1;
            let pred = normalize(expr.child(last), ctx)?;
            let mut children = expr.children()[..last].to_vec();
            children.push(pred);
            push_through_join(&expr.with_children(children), Expr::bool_const(true), ctx)
        }
        _ => map_children(expr, |child| normalize(child, ctx)),
    }
}

/// Normal form of `input` filtered by `pred`.
fn filter(input: &ExprRef, pred: ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if is_const_true(&pred) {
        return normalize(input, ctx);
    }
    let op = match input.logical_op() {
        Some(op) if input.arity() > 0 => op,
        _ => return Ok(safe_select(input.clone(), pred)),
    };
    match op {
        LogicalOperator::LogicalSelect => {
            let merged = conjunction([normalize(input.child(1), ctx)?, pred]);
            filter(input.child(0), merged, ctx)
        }
        LogicalOperator::LogicalJoin(join) if join.join_type() == JoinType::LeftOuter => {
            match simplify_select_on_outer_join(input, &pred, ctx) {
                Some(inner_join) => normalize(&inner_join, ctx),
                None => push_through_outer_child(input, pred, ctx),
            }
        }
        LogicalOperator::LogicalJoin(join) if !join.is_inner() => {
            push_through_outer_child(input, pred, ctx)
        }
        LogicalOperator::LogicalJoin(_) | LogicalOperator::LogicalNAryJoin => {
            push_through_join(input, pred, ctx)
        }
        LogicalOperator::LogicalGbAgg(agg) if agg.is_scalar() => {
            Ok(safe_select(normalize(input, ctx)?, pred))
        }
        LogicalOperator::LogicalProject
        | LogicalOperator::LogicalGbAgg(_)
        | LogicalOperator::LogicalCteAnchor(_) => {
            let (new_child, remaining) = push_conjuncts(input.child(0), conjuncts(&pred), ctx)?;
            let mut children = vec![new_child];
            for child in &input.children()[1..] {
                children.push(normalize(child, ctx)?);
            }
            select_over(input.with_children(children), remaining, ctx)
        }
        LogicalOperator::LogicalSequenceProject(window) => {
            let partition: ColumnSet = window.partition_columns().iter().copied().collect();
            let (pushable, unpushable): (Vec<_>, Vec<_>) =
                conjuncts(&pred).into_iter().partition(|conj| {
                    let props = conj.scalar_props();
                    !partition.is_empty()
                        && !props.has_subquery()
                        && props.used_columns().is_subset(&partition)
                });
            let new_child = filter(input.child(0), conjunction(pushable), ctx)?;
            let window_fns = normalize(input.child(1), ctx)?;
            select_over(input.with_children([new_child, window_fns]), unpushable, ctx)
        }
        LogicalOperator::LogicalUnion(set_op) | LogicalOperator::LogicalUnionAll(set_op)
            if !pred.scalar_props().has_subquery() =>
        {
            push_through_set_op(input, set_op, &pred, ctx)
        }
        _ => Ok(safe_select(normalize(input, ctx)?, pred)),
    }
}

/// Whether `conj` can be evaluated on the output of `expr`.
fn pushable(expr: &ExprRef, conj: &ExprRef) -> bool {
    let props = conj.scalar_props();
    !props.has_subquery()
        && props
            .used_columns()
            .is_subset(expr.relational_props().output_columns())
}

/// Pushes the conjuncts `input` can evaluate into it; returns the rewritten input and the
/// conjuncts left over.
fn push_conjuncts(
    input: &ExprRef,
    conjs: Vec<ExprRef>,
    ctx: &PreprocessContext,
) -> OptResult<(ExprRef, Vec<ExprRef>)> {
    let (pushable, remaining): (Vec<_>, Vec<_>) =
        conjs.into_iter().partition(|conj| pushable(input, conj));
    Ok((filter(input, conjunction(pushable), ctx)?, remaining))
}

fn select_over(
    input: ExprRef,
    conjs: Vec<ExprRef>,
    ctx: &PreprocessContext,
) -> OptResult<ExprRef> {
    if conjs.is_empty() {
        return Ok(input);
    }
    let pred = conjunction(conjs);
    if let Some(LogicalOperator::LogicalJoin(join)) = input.logical_op() {
        if join.join_type() == JoinType::LeftOuter {
            if let Some(inner_join) = simplify_select_on_outer_join(&input, &pred, ctx) {
                return normalize(&inner_join, ctx);
            }
        }
    }
    Ok(safe_select(input, pred))
}

/// Inner join equivalent to filtering `outer_join` by `pred`, when `pred` rejects the
/// NULL-extended rows of the inner side.
fn simplify_select_on_outer_join(
    outer_join: &ExprRef,
    pred: &ExprRef,
    ctx: &PreprocessContext,
) -> Option<ExprRef> {
    if ctx.trace_flag(TraceFlag::DisableOuterJoinToInnerJoinRewrite) {
        return None;
    }
    let inner_output = outer_join.child(1).relational_props();
    if !is_null_rejecting(pred, inner_output.output_columns()) {
        return None;
    }
    debug!("Select predicate rejects NULLs of the inner side, using an inner join");
    Some(Expr::new(
        LogicalOperator::LogicalJoin(Join::inner()),
        [
            outer_join.child(0).clone(),
            outer_join.child(1).clone(),
            conjunction([pred.clone(), outer_join.child(2).clone()]),
        ],
    ))
}

/// Filters a join that only preserves rows of its outer side. Conjuncts on the outer side go
/// below the join, the rest stays above it.
fn push_through_outer_child(
    join: &ExprRef,
    pred: ExprRef,
    ctx: &PreprocessContext,
) -> OptResult<ExprRef> {
    let (new_outer, remaining) = push_conjuncts(join.child(0), conjuncts(&pred), ctx)?;
    let rebuilt = join.with_children([new_outer, join.child(1).clone(), join.child(2).clone()]);
    let result = push_through_join_children(&rebuilt, Expr::bool_const(true), false, ctx)?;
    select_over(result, remaining, ctx)
}

fn push_through_join(join: &ExprRef, pred: ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    match join.logical_op() {
        Some(LogicalOperator::LogicalJoin(j)) if !j.is_inner() && !is_const_true(&pred) => {
            push_through_outer_child(join, pred, ctx)
        }
        _ => push_through_join_children(join, pred, true, ctx),
    }
}

/// Distributes the join predicate and `pred` over the join inputs.
///
/// The outer side of a left outer join only receives conjuncts when `normalize_outer` is
/// unset, i.e. when it was already handled by [`push_through_outer_child`].
fn push_through_join_children(
    join: &ExprRef,
    pred: ExprRef,
    normalize_outer: bool,
    ctx: &PreprocessContext,
) -> OptResult<ExprRef> {
    let join_type = match join.logical_op() {
        Some(LogicalOperator::LogicalJoin(j)) => j.join_type(),
        _ => JoinType::Inner,
    };
    let last = join.arity() - 1;
    let mut remaining = conjuncts(&conjunction([join.child(last).clone(), pred]));
    let mut children = Vec::with_capacity(join.arity());
    for (i, child) in join.children()[..last].iter().enumerate() {
        let keep_conjuncts = join_type == JoinType::LeftAntiSemi
            || (i == 0 && join_type == JoinType::LeftOuter);
        if keep_conjuncts {
            children.push(if normalize_outer || i > 0 {
                normalize(child, ctx)?
            } else {
                child.clone()
            });
            continue;
        }
        let (new_child, rest) = push_conjuncts(child, remaining, ctx)?;
        children.push(new_child);
        remaining = rest;
    }
    children.push(conjunction(remaining));
    Ok(join.with_children(children))
}

/// Pushes `pred` into every input of a set operation, renaming output columns to the input's.
fn push_through_set_op(
    input: &ExprRef,
    set_op: &SetOp,
    pred: &ExprRef,
    ctx: &PreprocessContext,
) -> OptResult<ExprRef> {
    let mut children = Vec::with_capacity(input.arity());
    for (child, child_columns) in input.children().iter().zip(set_op.input_columns()) {
        let mapping: BTreeMap<ColumnRef, ColumnRef> = set_op
            .output_columns()
            .iter()
            .copied()
            .zip(child_columns.iter().copied())
            .filter(|(output, input)| output != input)
            .collect();
        children.push(filter(child, remap_columns(pred, &mapping), ctx)?);
    }
    Ok(input.with_children(children))
}
