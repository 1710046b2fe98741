//! Rewrites of boolean scalar expressions.

use std::collections::BTreeMap;

use log::debug;

use crate::config::TraceFlag;
use crate::constraint::ColumnConstraint;
use crate::error::OptResult;
use crate::expr::{
    bool_op_of, conjunction, const_datum, dedup_exprs, disjunction, ident_column, is_and, is_not,
    is_or, Expr, ExprRef,
};
use crate::operator::{BoolOp, CmpType, ColumnRef, ScalarOperator};
use crate::preprocessor::{map_children, transform_up, PreprocessContext, PreprocessPass};

/// Simplifies `(a < b) = TRUE` to `a < b` and `(a < b) = FALSE` to `a >= b`.
#[derive(Clone, Debug, Default)]
pub struct PruneSuperfluousEquality;

impl PreprocessPass for PruneSuperfluousEquality {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| {
            if !matches!(e.scalar_op(), Some(ScalarOperator::ScalarCmp(cmp)) if cmp.cmp_type() == CmpType::Eq)
            {
                return Ok(e.clone());
            }
            let (inner, value) = match (
                const_datum(e.child(0)).and_then(|d| d.as_bool()),
                const_datum(e.child(1)).and_then(|d| d.as_bool()),
            ) {
                (None, Some(value)) => (e.child(0), value),
                (Some(value), None) => (e.child(1), value),
                _ => return Ok(e.clone()),
            };
            let inner_cmp = match inner.scalar_op() {
                Some(ScalarOperator::ScalarCmp(cmp)) => *cmp,
                _ => return Ok(e.clone()),
            };
            if value {
                return Ok(inner.clone());
            }
            match ctx.metadata().inverse(inner_cmp)? {
                Some(inverse) => Ok(Expr::cmp(
                    inverse,
                    inner.child(0).clone(),
                    inner.child(1).clone(),
                )),
                None => Ok(e.clone()),
            }
        })
    }
}

/// Brings boolean expressions into canonical form: nested ANDs and ORs are flattened, NOT is
/// pushed through AND/OR, double negation is removed and `NOT EXISTS` becomes a single
/// operator.
#[derive(Clone, Debug, Default)]
pub struct UnnestBoolOps;

impl PreprocessPass for UnnestBoolOps {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        unnest_bool_ops(expr, ctx)
    }
}

pub fn unnest_bool_ops(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if is_not(expr) {
        let child = expr.child(0);
        if is_not(child) {
            return unnest_bool_ops(child.child(0), ctx);
        }
        if let Some(op @ (BoolOp::And | BoolOp::Or)) = bool_op_of(child) {
            let dual = if op == BoolOp::And { BoolOp::Or } else { BoolOp::And };
            let negated = Expr::new(
                ScalarOperator::ScalarBoolOp(dual),
                child.children().iter().map(|c| Expr::not(c.clone())),
            );
            return unnest_bool_ops(&negated, ctx);
        }
        let flipped = match child.scalar_op() {
            Some(ScalarOperator::ScalarSubqueryExists) => Some(ScalarOperator::ScalarSubqueryNotExists),
            Some(ScalarOperator::ScalarSubqueryNotExists) => Some(ScalarOperator::ScalarSubqueryExists),
            _ => None,
        };
        if let Some(op) = flipped {
            let rel = unnest_bool_ops(child.child(0), ctx)?;
            return Ok(Expr::new(op, [rel]));
        }
    }

    let rewritten = map_children(expr, |c| unnest_bool_ops(c, ctx))?;
    match bool_op_of(&rewritten) {
        Some(op @ (BoolOp::And | BoolOp::Or))
            if rewritten.children().iter().any(|c| bool_op_of(c) == Some(op)) =>
        {
            let mut operands = Vec::with_capacity(rewritten.arity());
            for child in rewritten.children() {
                if bool_op_of(child) == Some(op) {
                    operands.extend(child.children().iter().cloned());
                } else {
                    operands.push(child.clone());
                }
            }
            Ok(Expr::new(ScalarOperator::ScalarBoolOp(op), operands))
        }
        _ => Ok(rewritten),
    }
}

/// Rewrites `x = 1 OR x = 2` into `x IN (1, 2)` and `x <> 1 AND x <> 2` into `x NOT IN (1, 2)`.
///
/// Only active with [`TraceFlag::ArrayInConversion`].
#[derive(Clone, Debug, Default)]
pub struct ConvertToArrayIn;

impl PreprocessPass for ConvertToArrayIn {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        if !ctx.trace_flag(TraceFlag::ArrayInConversion) {
            return Ok(expr.clone());
        }
        transform_up(expr, ctx, &|e| {
            let (op, cmp_type) = match bool_op_of(e) {
                Some(BoolOp::Or) => (BoolOp::Or, CmpType::Eq),
                Some(BoolOp::And) => (BoolOp::And, CmpType::NEq),
                _ => return Ok(e.clone()),
            };
            convert_to_array(e, op, cmp_type, ctx)
        })
    }
}

/// The column of `col OP const` or `const OP col` when OP has the given comparison type.
fn column_compared_to_const(expr: &Expr, cmp_type: CmpType) -> Option<ColumnRef> {
    match expr.scalar_op()? {
        ScalarOperator::ScalarCmp(cmp) if cmp.cmp_type() == cmp_type => {
            match (ident_column(expr.child(0)), ident_column(expr.child(1))) {
                (Some(column), None) if const_datum(expr.child(1)).is_some() => Some(column),
                (None, Some(column)) if const_datum(expr.child(0)).is_some() => Some(column),
                _ => None,
            }
        }
        _ => None,
    }
}

fn convert_to_array(
    expr: &ExprRef,
    op: BoolOp,
    cmp_type: CmpType,
    ctx: &PreprocessContext,
) -> OptResult<ExprRef> {
    let mut groups: BTreeMap<ColumnRef, Vec<usize>> = BTreeMap::new();
    for (i, child) in expr.children().iter().enumerate() {
        if let Some(column) = column_compared_to_const(child, cmp_type) {
            if column.data_type().is_constrainable() {
                groups.entry(column).or_default().push(i);
            }
        }
    }
    groups.retain(|_, members| members.len() > 1);
    if groups.is_empty() {
        return Ok(expr.clone());
    }

    let mut converted: BTreeMap<usize, ExprRef> = BTreeMap::new();
    let mut dropped = vec![false; expr.arity()];
    for members in groups.values() {
        let operands = members.iter().map(|i| expr.child(*i).clone());
        let group = match op {
            BoolOp::Or => disjunction(operands),
            _ => conjunction(operands),
        };
        let constraint = match ColumnConstraint::from_scalar_expr(&group) {
            Some(constraint) => constraint,
            None => continue,
        };
        let array = constraint.to_scalar_expr(ctx.metadata(), true)?;
        if !matches!(array.scalar_op(), Some(ScalarOperator::ScalarArrayCmp(_))) {
            continue;
        }
        debug!("Converted {} comparisons on {} to an array", members.len(), constraint.column().id());
        converted.insert(members[0], array);
        for i in &members[1..] {
            dropped[*i] = true;
        }
    }
    if converted.is_empty() {
        return Ok(expr.clone());
    }

    let children = expr
        .children()
        .iter()
        .enumerate()
        .filter(|(i, _)| !dropped[*i])
        .map(|(i, child)| converted.get(&i).cloned().unwrap_or_else(|| child.clone()));
    Ok(match op {
        BoolOp::Or => disjunction(children),
        _ => conjunction(children),
    })
}

/// Folds comparisons of a column with itself.
///
/// `x = x`, `x <= x` and `x >= x` are true and `x <> x`, `x < x` and `x > x` false, unless `x`
/// may be NULL. `x IS DISTINCT FROM x` is always false.
#[derive(Clone, Debug, Default)]
pub struct EliminateSelfComparisons;

impl PreprocessPass for EliminateSelfComparisons {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| Ok(eliminate_self_comparison(e)))
    }
}

fn eliminate_self_comparison(expr: &ExprRef) -> ExprRef {
    let op = match expr.scalar_op() {
        Some(op @ (ScalarOperator::ScalarCmp(_) | ScalarOperator::ScalarIsDistinctFrom(_))) => op,
        _ => return expr.clone(),
    };
    let column = match (ident_column(expr.child(0)), ident_column(expr.child(1))) {
        (Some(left), Some(right)) if left == right => left,
        _ => return expr.clone(),
    };
    let value = match op {
        ScalarOperator::ScalarIsDistinctFrom(_) => false,
        ScalarOperator::ScalarCmp(_) if column.nullable() => return expr.clone(),
        ScalarOperator::ScalarCmp(cmp) => match cmp.cmp_type() {
            CmpType::Eq | CmpType::LEq | CmpType::GEq => true,
            CmpType::NEq | CmpType::L | CmpType::G => false,
            _ => return expr.clone(),
        },
        _ => return expr.clone(),
    };
    Expr::bool_const(value)
}

/// Removes duplicate operands of AND and OR.
#[derive(Clone, Debug, Default)]
pub struct DedupBoolOps;

impl PreprocessPass for DedupBoolOps {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| Ok(dedup_bool_op(e)))
    }
}

pub(crate) fn dedup_bool_op(expr: &ExprRef) -> ExprRef {
    if !is_and(expr) && !is_or(expr) {
        return expr.clone();
    }
    let mut children = dedup_exprs(expr.children().to_vec());
    if children.len() == expr.arity() {
        expr.clone()
    } else if children.len() == 1 {
        children.remove(0)
    } else {
        expr.with_children(children)
    }
}

/// Rewrites `const OP x` into `x OP' const`, where OP' is the commutator of OP.
///
/// Comparisons whose operator has no commutator are left alone.
#[derive(Clone, Debug, Default)]
pub struct ReorderScalarCmpChildren;

impl PreprocessPass for ReorderScalarCmpChildren {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| {
            let cmp = match e.scalar_op() {
                Some(ScalarOperator::ScalarCmp(cmp)) => *cmp,
                _ => return Ok(e.clone()),
            };
            if const_datum(e.child(0)).is_none() || const_datum(e.child(1)).is_some() {
                return Ok(e.clone());
            }
            match ctx.metadata().commuted(cmp)? {
                Some(commuted) => Ok(Expr::cmp(commuted, e.child(1).clone(), e.child(0).clone())),
                None => Ok(e.clone()),
            }
        })
    }
}
