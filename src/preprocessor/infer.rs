use log::debug;

use crate::config::TraceFlag;
use crate::constraint::ColumnConstraint;
use crate::error::OptResult;
use crate::expr::{
    conjunction, conjuncts, contains_expr, is_const_true, is_not, safe_select, Expr, ExprRef,
};
use crate::operator::{CmpType, ColumnRef, ColumnSet, LogicalOperator, ScalarOperator};
use crate::preprocessor::{
    map_children, normalize, DedupBoolOps, PreprocessContext, PreprocessPass,
};
use crate::properties::ConstraintProperty;

/// Derives predicates from the constraint property of each relational node and places them
/// as filters over the node's children.
///
/// For `a = b AND a = 5` this adds `b = 5` below the node. Pairwise equalities of every
/// equivalence class not already known to a child are added as well. Afterwards the tree is
/// normalized so the new filters travel down to where they can be evaluated.
///
/// With outer join inference, constraints of the outer side of a left outer join are also
/// transferred to its inner side through the join predicate.
#[derive(Clone, Debug)]
pub struct InferPredicates {
    outer_join_inference: bool,
}

impl InferPredicates {
    pub fn with_outer_join_inference() -> Self {
        Self {
            outer_join_inference: true,
        }
    }

    pub fn from_constraints_only() -> Self {
        Self {
            outer_join_inference: false,
        }
    }
}

impl PreprocessPass for InferPredicates {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        let with_preds = add_predicates_from_constraints(expr, ctx)?;
        if !self.outer_join_inference {
            return Ok(with_preds);
        }
        let mut added = false;
        let inferred = infer_on_outer_join_inner_side(&with_preds, ctx, &mut added)?;
        if added {
            add_predicates_from_constraints(&inferred, ctx)
        } else {
            Ok(inferred)
        }
    }
}

fn add_predicates_from_constraints(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let mut processed = ColumnSet::new();
    let with_constraints = from_constraints(expr, ctx, &mut processed)?;
    let mut processed = ColumnSet::new();
    let with_equalities = add_equality_predicates(&with_constraints, ctx, &mut processed)?;
    let normalized = normalize(&with_equalities, ctx)?;
    DedupBoolOps.apply(&normalized, ctx)
}

/// The constraint of `column` implied by the other members of its equivalence class.
fn mapped_from_equivalent_columns(
    constraints: &ConstraintProperty,
    column: &ColumnRef,
) -> Option<ColumnConstraint> {
    let class = constraints.equivalence_class(column)?;
    class
        .iter()
        .filter(|c| *c != column)
        .filter_map(|c| constraints.constraint(c))
        .map(|c| c.with_column(*column))
        .reduce(|acc, c| acc.intersect(&c))
}

/// Conjunction of the predicates implied for `columns`, or `None` when nothing is implied.
///
/// Columns that received a predicate are added to `processed`.
fn scalar_predicates(
    ctx: &PreprocessContext,
    constraints: &ConstraintProperty,
    not_null: &ColumnSet,
    columns: &ColumnSet,
    processed: &mut ColumnSet,
) -> OptResult<Option<ExprRef>> {
    let array_in = ctx.trace_flag(TraceFlag::ArrayInConversion);
    let mut preds = Vec::new();
    for column in columns {
        let constraint = match mapped_from_equivalent_columns(constraints, column) {
            Some(constraint) => constraint,
            None => continue,
        };
        processed.insert(*column);
        let pred = constraint.to_scalar_expr(ctx.metadata(), array_in)?;
        if is_const_true(&pred) {
            continue;
        }
        // `c IS NOT NULL` adds nothing when c is known non-null or already constrained.
        let not_null_test = is_not(&pred)
            && matches!(pred.child(0).scalar_op(), Some(ScalarOperator::ScalarNullTest));
        if not_null_test && (not_null.contains(column) || constraints.constraint(column).is_some())
        {
            continue;
        }
        preds.push(pred);
    }
    Ok((!preds.is_empty()).then(|| conjunction(preds)))
}

fn from_constraints(
    expr: &ExprRef,
    ctx: &PreprocessContext,
    processed: &mut ColumnSet,
) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if !expr.is_logical() {
        return from_constraints_scalar(expr, ctx);
    }
    let props = expr.relational_props();
    map_children(expr, |child| {
        if child.is_scalar() {
            return from_constraints_scalar(child, ctx);
        }
        let columns: ColumnSet = child
            .relational_props()
            .output_columns()
            .difference(processed)
            .copied()
            .collect();
        let pred = scalar_predicates(
            ctx,
            props.constraints(),
            props.not_null_columns(),
            &columns,
            processed,
        )?;
        let new_child = from_constraints(child, ctx, processed)?;
        Ok(match pred {
            Some(pred) => {
                debug!("Inferred filter {:?} below {}", pred, expr.operator().name());
                safe_select(new_child, pred)
            }
            None => new_child,
        })
    })
}

/// Relational trees nested in subqueries are processed with their own set of columns.
fn from_constraints_scalar(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if !expr.scalar_props().has_subquery() {
        return Ok(expr.clone());
    }
    map_children(expr, |child| {
        if child.is_logical() {
            from_constraints(child, ctx, &mut ColumnSet::new())
        } else {
            from_constraints_scalar(child, ctx)
        }
    })
}

fn add_equality_predicates(
    expr: &ExprRef,
    ctx: &PreprocessContext,
    processed: &mut ColumnSet,
) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    let op = match expr.logical_op() {
        Some(op) => op,
        None => return Ok(expr.clone()),
    };
    let pred = if op.is_dml() {
        Expr::bool_const(true)
    } else {
        let existing = expr
            .children()
            .iter()
            .rev()
            .find(|c| c.is_scalar())
            .map(conjuncts)
            .unwrap_or_default();
        let props = expr.relational_props();
        let mut preds = Vec::new();
        for class in props.constraints().equivalence_classes() {
            let columns: ColumnSet = class.difference(processed).copied().collect();
            if known_to_child(expr, &columns) {
                continue;
            }
            preds.extend(equality_predicates(ctx, &columns, &existing)?);
            processed.extend(columns);
        }
        conjunction(preds)
    };
    let rebuilt = map_children(expr, |child| {
        if child.is_logical() {
            add_equality_predicates(child, ctx, processed)
        } else {
            Ok(child.clone())
        }
    })?;
    Ok(safe_select(rebuilt, pred))
}

/// Whether some child already knows all of `columns` to be equal.
fn known_to_child(expr: &ExprRef, columns: &ColumnSet) -> bool {
    expr.relational_children().any(|child| {
        child
            .relational_props()
            .constraints()
            .equivalence_classes()
            .iter()
            .any(|class| columns.is_subset(class))
    })
}

/// Pairwise equalities over `columns`, skipping those already among `existing`.
fn equality_predicates(
    ctx: &PreprocessContext,
    columns: &ColumnSet,
    existing: &[ExprRef],
) -> OptResult<Vec<ExprRef>> {
    let limit = ctx.config().max_derived_predicates();
    let eq = ctx.metadata().comparison(CmpType::Eq)?;
    let mut preds = Vec::new();
    'outer: for right in columns {
        for left in columns {
            if left == right {
                break;
            }
            if preds.len() >= limit {
                break 'outer;
            }
            let pred = Expr::cmp(eq, Expr::ident(*left), Expr::ident(*right));
            let reversed = Expr::cmp(eq, Expr::ident(*right), Expr::ident(*left));
            if !contains_expr(existing, &pred) && !contains_expr(existing, &reversed) {
                preds.push(pred);
            }
        }
    }
    Ok(preds)
}

/// Moves what is known about the outer side of each left outer join, together with its join
/// predicate, onto the inner side.
fn infer_on_outer_join_inner_side(
    expr: &ExprRef,
    ctx: &PreprocessContext,
    added: &mut bool,
) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    let join = match expr.logical_op() {
        Some(op @ LogicalOperator::LogicalJoin(_)) if op.is_left_outer_join() => op,
        _ => return map_children(expr, |c| infer_on_outer_join_inner_side(c, ctx, added)),
    };
    let (outer, inner, pred) = (expr.child(0), expr.child(1), expr.child(2));
    let constraints = outer
        .relational_props()
        .constraints()
        .combine(inner.relational_props().constraints())
        .combine(&ConstraintProperty::from_predicate(pred));

    let inner_props = inner.relational_props();
    let mut processed = ColumnSet::new();
    let inferred = scalar_predicates(
        ctx,
        &constraints,
        inner_props.not_null_columns(),
        inner_props.output_columns(),
        &mut processed,
    )?;
    let inner = match inferred {
        Some(inferred) if !is_const_true(&inferred) => {
            debug!("Inferred {:?} on the inner side of a left outer join", inferred);
            *added = true;
            normalize(&safe_select(inner.clone(), inferred), ctx)?
        }
        _ => inner.clone(),
    };
    let inner = infer_on_outer_join_inner_side(&inner, ctx, added)?;
    let outer = infer_on_outer_join_inner_side(outer, ctx, added)?;
    Ok(Expr::new(join.clone(), [outer, inner, pred.clone()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::LogicalExprBuilder;
    use crate::operator::JoinType;
    use crate::preprocessor::testing::TestEnv;

    #[test]
    fn test_constant_crosses_join_equality() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let s = env.table("s", 1, true);
        let (a, b) = (t.columns()[0], s.columns()[0]);
        let a_is_5 = env.cmp(CmpType::Eq, Expr::ident(a), Expr::int_const(5));
        let expr = LogicalExprBuilder::get(t)
            .select(a_is_5)
            .join(
                JoinType::Inner,
                LogicalExprBuilder::get(s).build(),
                env.cmp(CmpType::Eq, Expr::ident(a), Expr::ident(b)),
            )
            .build();

        let result = InferPredicates::from_constraints_only()
            .apply(&expr, &env.ctx())
            .unwrap();
        let inner = result.child(1);
        assert_eq!(Some(&LogicalOperator::LogicalSelect), inner.logical_op());
        assert_eq!(
            &env.cmp(CmpType::Eq, Expr::ident(b), Expr::int_const(5)),
            inner.child(1)
        );
        // The join equality is not duplicated.
        assert_eq!(1, conjuncts(result.child(2)).len());
    }

    #[test]
    fn test_outer_side_constant_reaches_inner_side() {
        let env = TestEnv::new();
        let x = env.table("x", 1, true);
        let y = env.table("y", 1, true);
        let (cx, cy) = (x.columns()[0], y.columns()[0]);
        let expr = LogicalExprBuilder::get(x)
            .select(env.cmp(CmpType::Eq, Expr::ident(cx), Expr::int_const(5)))
            .join(
                JoinType::LeftOuter,
                LogicalExprBuilder::get(y).build(),
                env.cmp(CmpType::Eq, Expr::ident(cx), Expr::ident(cy)),
            )
            .build();

        let plain = InferPredicates::from_constraints_only()
            .apply(&expr, &env.ctx())
            .unwrap();
        assert_eq!(expr, plain);

        let result = InferPredicates::with_outer_join_inference()
            .apply(&expr, &env.ctx())
            .unwrap();
        let inner = result.child(1);
        assert_eq!(Some(&LogicalOperator::LogicalSelect), inner.logical_op());
        assert_eq!(
            &env.cmp(CmpType::Eq, Expr::ident(cy), Expr::int_const(5)),
            inner.child(1)
        );
    }

    #[test]
    fn test_existing_equality_not_repeated() {
        let env = TestEnv::new();
        let t = env.table("t", 2, true);
        let (a, b) = (t.columns()[0], t.columns()[1]);
        let expr = LogicalExprBuilder::get(t)
            .select(env.cmp(CmpType::Eq, Expr::ident(a), Expr::ident(b)))
            .build();
        let result = InferPredicates::from_constraints_only()
            .apply(&expr, &env.ctx())
            .unwrap();
        assert_eq!(expr, result);
    }
}
