//! Rewrites of disjunctive predicates.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use crate::error::OptResult;
use crate::expr::{conjunction, disjunction, is_and, is_or, ExprRef};
use crate::operator::{ColumnRef, ColumnSet, LogicalOperator, SourceId};
use crate::preprocessor::{
    dedup_bool_op, map_children, unnest_bool_ops, DedupBoolOps, PreprocessContext,
    PreprocessPass,
};

/// Pulls conjuncts shared by every branch of a disjunction out of it:
/// `(a AND b) OR (a AND c)` becomes `a AND (b OR c)`.
#[derive(Clone, Debug, Default)]
pub struct FactorizeCommonExprs;

impl PreprocessPass for FactorizeCommonExprs {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        let factorized = process_disjunctions(expr, None, ctx, &|disj, _| Ok(factorize(disj)))?;
        // Factoring out may leave nested ANDs and duplicates behind.
        let unnested = unnest_bool_ops(&factorized, ctx)?;
        DedupBoolOps.apply(&unnested, ctx)
    }
}

/// Adds filters implied by a disjunction that only read columns of one base relation (or one
/// computed column), so the normalizer can push them towards the relation.
///
/// From `(t.a = 1 AND s.b = 2) OR (t.a = 3 AND s.c = 4)` it derives `t.a = 1 OR t.a = 3` and
/// `s.b = 2 OR s.c = 4`.
#[derive(Clone, Debug, Default)]
pub struct ExtractInferredFilters;

impl PreprocessPass for ExtractInferredFilters {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        process_disjunctions(expr, None, ctx, &|disj, ancestor| {
            Ok(extract_inferred_filters(disj, ancestor))
        })
    }
}

/// Applies `f` to every topmost OR node, together with its lowest relational ancestor.
fn process_disjunctions<F>(
    expr: &ExprRef,
    ancestor: Option<&ExprRef>,
    ctx: &PreprocessContext,
    f: &F,
) -> OptResult<ExprRef>
where
    F: Fn(&ExprRef, Option<&ExprRef>) -> OptResult<ExprRef>,
{
    let _guard = ctx.enter()?;
    let ancestor = if expr.is_logical() { Some(expr) } else { ancestor };
    if is_or(expr) {
        return f(expr, ancestor);
    }
    map_children(expr, |child| process_disjunctions(child, ancestor, ctx, f))
}

fn operands(expr: &ExprRef) -> Vec<ExprRef> {
    if is_and(expr) {
        expr.children().to_vec()
    } else {
        vec![expr.clone()]
    }
}

fn factorize(disj: &ExprRef) -> ExprRef {
    let branches = disj.children();
    let mut counts: HashMap<ExprRef, usize> = HashMap::new();
    for branch in branches {
        let distinct: HashSet<ExprRef> = operands(branch).into_iter().collect();
        for operand in distinct {
            *counts.entry(operand).or_insert(0) += 1;
        }
    }

    let mut factors: Vec<ExprRef> = Vec::new();
    let mut residuals = Vec::with_capacity(branches.len());
    for branch in branches {
        let mut rest = Vec::new();
        for operand in operands(branch) {
            if counts.get(&operand) == Some(&branches.len()) {
                if !factors.contains(&operand) {
                    factors.push(operand);
                }
            } else {
                rest.push(operand);
            }
        }
        residuals.push(conjunction(rest));
    }
    if factors.is_empty() {
        return disj.clone();
    }
    debug!("Factored {} common conjuncts out of a disjunction", factors.len());
    factors.push(disjunction(residuals));
    conjunction(factors)
}

/// Where the columns of a pushable predicate come from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ColumnOrigin {
    Table(SourceId),
    Computed(ColumnRef),
}

/// The single origin of the columns `expr` reads, if it can be evaluated on its own.
fn column_origin(expr: &ExprRef) -> Option<ColumnOrigin> {
    let props = expr.scalar_props();
    if !props.defined_columns().is_empty()
        || props.has_subquery()
        || props.has_volatile_function()
    {
        return None;
    }
    let mut origin = None;
    for column in props.used_columns() {
        let current = match column.source() {
            Some(source) => ColumnOrigin::Table(source),
            None => ColumnOrigin::Computed(*column),
        };
        match origin {
            None => origin = Some(current),
            Some(existing) if existing != current => return None,
            _ => {}
        }
    }
    origin
}

/// Columns defined by the scalar children of the children of a Select.
fn columns_produced_by_children(ancestor: Option<&ExprRef>) -> ColumnSet {
    match ancestor {
        Some(select) if select.logical_op() == Some(&LogicalOperator::LogicalSelect) => select
            .children()
            .iter()
            .flat_map(|child| child.children().iter())
            .filter(|grandchild| grandchild.is_scalar())
            .flat_map(|grandchild| grandchild.scalar_props().defined_columns().clone())
            .collect(),
        _ => ColumnSet::new(),
    }
}

fn extract_inferred_filters(disj: &ExprRef, ancestor: Option<&ExprRef>) -> ExprRef {
    let produced = columns_produced_by_children(ancestor);
    // For each origin, the operands reading it, grouped by branch.
    let mut by_origin: BTreeMap<ColumnOrigin, Vec<Vec<ExprRef>>> = BTreeMap::new();

    for (position, branch) in disj.children().iter().enumerate() {
        for operand in operands(branch) {
            let origin = match column_origin(&operand) {
                Some(ColumnOrigin::Computed(column)) if produced.contains(&column) => continue,
                Some(origin) => origin,
                None => continue,
            };
            // Only origins present in the first branch can cover all branches.
            if position > 0 && !by_origin.contains_key(&origin) {
                continue;
            }
            let groups = by_origin.entry(origin).or_default();
            if groups.len() == position {
                groups.push(vec![operand]);
            } else if groups.len() == position + 1 {
                if let Some(last) = groups.last_mut() {
                    last.push(operand);
                }
            }
        }
        if position == 0 && by_origin.is_empty() {
            return disj.clone();
        }
    }

    let branches = disj.arity();
    let filters: Vec<ExprRef> = by_origin
        .into_values()
        .filter(|groups| groups.len() == branches)
        .map(|groups| disjunction(groups.into_iter().map(conjunction)))
        .collect();
    if filters.is_empty() {
        return disj.clone();
    }
    debug!("Inferred {} filters from a disjunction", filters.len());
    let mut conjuncts = vec![disj.clone()];
    conjuncts.extend(filters);
    dedup_bool_op(&conjunction(conjuncts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{conjuncts, Expr, LogicalExprBuilder};
    use crate::operator::{CmpType, JoinType};
    use crate::preprocessor::testing::TestEnv;

    #[test]
    fn test_common_conjunct_factored_out() {
        let env = TestEnv::new();
        let t = env.table("t", 3, true);
        let (a, b, c) = (t.columns()[0], t.columns()[1], t.columns()[2]);
        let a_eq_b = env.cmp(CmpType::Eq, Expr::ident(a), Expr::ident(b));
        let c_gt_0 = env.cmp(CmpType::G, Expr::ident(c), Expr::int_const(0));
        let a_gt_0 = env.cmp(CmpType::G, Expr::ident(a), Expr::int_const(0));
        let pred = disjunction([
            conjunction([a_eq_b.clone(), c_gt_0.clone()]),
            conjunction([a_eq_b.clone(), a_gt_0.clone()]),
        ]);
        let expr = LogicalExprBuilder::get(t).select(pred).build();

        let result = FactorizeCommonExprs.apply(&expr, &env.ctx()).unwrap();
        assert_eq!(
            &conjunction([a_eq_b, disjunction([c_gt_0, a_gt_0])]),
            result.child(1)
        );
    }

    #[test]
    fn test_absorbed_branch() {
        let env = TestEnv::new();
        let t = env.table("t", 2, true);
        let (a, b) = (t.columns()[0], t.columns()[1]);
        let a_gt_0 = env.cmp(CmpType::G, Expr::ident(a), Expr::int_const(0));
        let b_gt_0 = env.cmp(CmpType::G, Expr::ident(b), Expr::int_const(0));
        let pred = disjunction([a_gt_0.clone(), conjunction([a_gt_0.clone(), b_gt_0])]);
        let expr = LogicalExprBuilder::get(t).select(pred).build();

        let result = FactorizeCommonExprs.apply(&expr, &env.ctx()).unwrap();
        assert_eq!(&a_gt_0, result.child(1));
    }

    #[test]
    fn test_filters_per_relation() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let s = env.table("s", 2, true);
        let a = t.columns()[0];
        let (b, c) = (s.columns()[0], s.columns()[1]);
        let cmp = |col: ColumnRef, v: i64| env.cmp(CmpType::Eq, Expr::ident(col), Expr::int_const(v));
        let pred = disjunction([
            conjunction([cmp(a, 1), cmp(b, 2)]),
            conjunction([cmp(a, 3), cmp(c, 4)]),
        ]);
        let expr = LogicalExprBuilder::get(t)
            .join(JoinType::Inner, LogicalExprBuilder::get(s).build(), pred.clone())
            .build();

        let result = ExtractInferredFilters.apply(&expr, &env.ctx()).unwrap();
        let preds = conjuncts(result.child(2));
        assert_eq!(3, preds.len());
        assert_eq!(pred, preds[0]);
        assert!(preds.contains(&disjunction([cmp(a, 1), cmp(a, 3)])));
        assert!(preds.contains(&disjunction([cmp(b, 2), cmp(c, 4)])));
    }

    #[test]
    fn test_no_filter_without_full_cover() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let s = env.table("s", 1, true);
        let (a, b) = (t.columns()[0], s.columns()[0]);
        let pred = disjunction([
            env.cmp(CmpType::Eq, Expr::ident(a), Expr::int_const(1)),
            env.cmp(CmpType::Eq, Expr::ident(b), Expr::int_const(2)),
        ]);
        let expr = LogicalExprBuilder::get(t)
            .join(JoinType::Inner, LogicalExprBuilder::get(s).build(), pred)
            .build();
        let result = ExtractInferredFilters.apply(&expr, &env.ctx()).unwrap();
        assert!(std::rc::Rc::ptr_eq(&expr, &result));
    }
}
