//! Rewrites of scalar subqueries.

use std::rc::Rc;

use log::debug;

use crate::error::OptResult;
use crate::expr::{conjunction, disjunction, is_and, is_or, Expr, ExprRef};
use crate::operator::{BoolOp, CmpType, LogicalOperator, ScalarOperator, Subquery};
use crate::preprocessor::{map_children, transform_up, PreprocessContext, PreprocessPass};

fn has_bool_const_child(expr: &Expr) -> bool {
    expr.children()
        .iter()
        .any(|c| crate::expr::const_datum(c).and_then(|d| d.as_bool()).is_some())
}

/// Replaces `EXISTS` over an aggregate without grouping columns by `TRUE`, and `NOT EXISTS` over
/// one by `FALSE`: such an aggregate always returns exactly one row.
#[derive(Clone, Debug, Default)]
pub struct TrimExistentialSubqueries;

impl PreprocessPass for TrimExistentialSubqueries {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| {
            let op = match e.scalar_op() {
                Some(op) => op,
                None => return Ok(e.clone()),
            };
            if op.is_existential_subquery() {
                if let Some(LogicalOperator::LogicalGbAgg(agg)) = e.child(0).logical_op() {
                    if agg.is_scalar() {
                        let value = matches!(op, ScalarOperator::ScalarSubqueryExists);
                        debug!("Existential subquery over scalar aggregate is {}", value);
                        return Ok(Expr::bool_const(value));
                    }
                }
                return Ok(e.clone());
            }
            if is_and(e) && has_bool_const_child(e) {
                return Ok(conjunction(e.children().iter().cloned()));
            }
            if is_or(e) && has_bool_const_child(e) {
                return Ok(disjunction(e.children().iter().cloned()));
            }
            Ok(e.clone())
        })
    }
}

/// Whether `rel` ends, below a chain of unary operators, in an aggregate without grouping
/// columns or a one-row constant table.
fn produces_single_row(rel: &ExprRef) -> bool {
    let mut node = rel;
    loop {
        match node.logical_op() {
            Some(LogicalOperator::LogicalGbAgg(agg)) => return agg.is_scalar(),
            Some(LogicalOperator::LogicalConstTableGet(table)) => return table.rows().len() == 1,
            Some(op) if op.is_unary() => node = node.child(0),
            _ => return false,
        }
    }
}

/// Turns `x OP ANY/ALL (subquery)` into `x OP (scalar subquery)` when the subquery returns at
/// most one row.
#[derive(Clone, Debug, Default)]
pub struct SimplifyQuantifiedSubqueries;

impl PreprocessPass for SimplifyQuantifiedSubqueries {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| {
            let quantified = match e.scalar_op() {
                Some(ScalarOperator::ScalarSubqueryAny(q))
                | Some(ScalarOperator::ScalarSubqueryAll(q)) => q,
                _ => return Ok(e.clone()),
            };
            let rel = e.child(0);
            if !rel.relational_props().max_card().at_most_one() || !produces_single_row(rel) {
                return Ok(e.clone());
            }
            let subquery = Expr::new(
                ScalarOperator::ScalarSubquery(Subquery::from_quantified(quantified.column())),
                [rel.clone()],
            );
            Ok(Expr::cmp(quantified.comparison(), e.child(1).clone(), subquery))
        })
    }
}

/// Flattens `(SELECT (SELECT ...))`: a scalar subquery over a projection of a constant table
/// whose only element is another scalar subquery is replaced by the inner subquery.
#[derive(Clone, Debug, Default)]
pub struct UnnestScalarSubqueries;

impl PreprocessPass for UnnestScalarSubqueries {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        unnest_scalar_subqueries(expr, ctx)
    }
}

fn is_scalar_subquery(expr: &Expr) -> bool {
    matches!(expr.scalar_op(), Some(ScalarOperator::ScalarSubquery(_)))
}

/// The inner subquery of `Project(ConstTableGet, [c := (subquery)])`.
fn const_table_subquery(rel: &ExprRef) -> Option<&ExprRef> {
    if rel.logical_op() != Some(&LogicalOperator::LogicalProject) {
        return None;
    }
    if !matches!(
        rel.child(0).logical_op(),
        Some(LogicalOperator::LogicalConstTableGet(_))
    ) {
        return None;
    }
    let list = rel.child(1);
    if list.arity() != 1 {
        return None;
    }
    let value = list.child(0).child(0);
    if is_scalar_subquery(value) {
        Some(value)
    } else {
        None
    }
}

fn unnest_scalar_subqueries(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    let is_element = matches!(
        expr.scalar_op(),
        Some(ScalarOperator::ScalarProjectElement(_))
    );
    if !is_element || !is_scalar_subquery(expr.child(0)) {
        return map_children(expr, |c| unnest_scalar_subqueries(c, ctx));
    }

    let subquery = unnest_scalar_subqueries(expr.child(0), ctx)?;
    if let Some(inner) = const_table_subquery(subquery.child(0)) {
        let const_table = subquery.child(0).child(0);
        let outer_refs = inner.child(0).relational_props().outer_references().clone();
        // The constant table disappears, so the inner subquery must not read it.
        if outer_refs.is_disjoint(const_table.relational_props().output_columns()) {
            debug!("Unnesting scalar subquery over constant table");
            let unnested = unnest_scalar_subqueries(inner, ctx)?;
            return Ok(expr.with_children([unnested]));
        }
    }
    if Rc::ptr_eq(&subquery, expr.child(0)) {
        Ok(expr.clone())
    } else {
        Ok(expr.with_children([subquery]))
    }
}

/// Guards scalar subqueries in project lists that return an outer reference.
///
/// `(SELECT outer_col FROM R)` becomes `(SELECT c FROM Project(R, c := outer_col))`, so the
/// subquery's value is produced inside the subquery.
#[derive(Clone, Debug, Default)]
pub struct AddProjectBelowSubquery;

impl PreprocessPass for AddProjectBelowSubquery {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| {
            if e.logical_op() != Some(&LogicalOperator::LogicalProject) {
                return Ok(e.clone());
            }
            let list = map_children(e.child(1), |element| guard_subqueries(element, ctx))?;
            if Rc::ptr_eq(&list, e.child(1)) {
                Ok(e.clone())
            } else {
                Ok(e.with_children([e.child(0).clone(), list]))
            }
        })
    }
}

fn guard_subqueries(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if let Some(ScalarOperator::ScalarSubquery(subquery)) = expr.scalar_op() {
        let rel = expr.child(0);
        let column = subquery.column();
        if rel.relational_props().output_columns().contains(&column) {
            return Ok(expr.clone());
        }
        let computed = ctx.column_factory().computed_column(column.data_type());
        debug!("Projecting outer reference {} below subquery", column.id());
        let project = Expr::new(
            LogicalOperator::LogicalProject,
            [
                rel.clone(),
                Expr::project_list([Expr::project_element(computed, Expr::ident(column))]),
            ],
        );
        return Ok(Expr::new(
            ScalarOperator::ScalarSubquery(subquery.with_column(computed)),
            [project],
        ));
    }
    if expr.is_logical() {
        return Ok(expr.clone());
    }
    map_children(expr, |c| guard_subqueries(c, ctx))
}

/// Rewrites `x = ANY (SELECT f(outer) FROM R)` into `EXISTS (SELECT * FROM R) AND x = f(outer)`.
///
/// Applies only when the projected expression reads outer references and nothing of `R`.
#[derive(Clone, Debug, Default)]
pub struct RewriteInSubqueryToExists;

impl PreprocessPass for RewriteInSubqueryToExists {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| Ok(in_to_exists(e).unwrap_or_else(|| e.clone())))
    }
}

fn in_to_exists(expr: &ExprRef) -> Option<ExprRef> {
    let quantified = expr.scalar_op()?.as_scalar_subquery_any()?;
    if quantified.comparison().cmp_type() != CmpType::Eq {
        return None;
    }
    let project = expr.child(0);
    if project.logical_op() != Some(&LogicalOperator::LogicalProject) || project.child(1).arity() != 1
    {
        return None;
    }
    let element = project.child(1).child(0);
    if element.scalar_op()?.as_scalar_project_element()? != &quantified.column() {
        return None;
    }
    let value = element.child(0);
    let value_props = value.scalar_props();
    let input = project.child(0);
    let input_output = input.relational_props().output_columns().clone();
    if value_props.used_columns().is_empty()
        || value_props.has_subquery()
        || !value_props.used_columns().is_disjoint(&input_output)
    {
        return None;
    }
    debug!("Rewriting IN subquery into EXISTS");
    let exists = Expr::new(ScalarOperator::ScalarSubqueryExists, [input.clone()]);
    let comparison = Expr::cmp(quantified.comparison(), expr.child(1).clone(), value.clone());
    Some(Expr::new(
        ScalarOperator::ScalarBoolOp(BoolOp::And),
        [exists, comparison],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{DataType, Datum};
    use crate::expr::{is_const_false, is_const_true, LogicalExprBuilder};
    use crate::operator::{AggFunction, ConstTable, Function, QuantifiedSubquery};
    use crate::preprocessor::testing::TestEnv;

    fn sum(column: crate::operator::ColumnRef) -> ExprRef {
        Expr::new(
            ScalarOperator::ScalarAggFunc(AggFunction::new("sum", false)),
            [Expr::ident(column)],
        )
    }

    #[test]
    fn test_trim_exists_over_scalar_agg() {
        let env = TestEnv::new();
        let scan = env.table("t", 1, true);
        let x = scan.columns()[0];
        let total = env.factory.computed_column(DataType::Int);
        let agg = LogicalExprBuilder::get(scan)
            .gb_agg(vec![], vec![(total, sum(x))])
            .build();
        let exists = Expr::new(ScalarOperator::ScalarSubqueryExists, [agg.clone()]);
        let not_exists = Expr::new(ScalarOperator::ScalarSubqueryNotExists, [agg]);

        let result = TrimExistentialSubqueries.apply(&exists, &env.ctx()).unwrap();
        assert!(is_const_true(&result));

        let y = env.factory.computed_column(DataType::Bool);
        let and = conjunction(vec![Expr::ident(y), not_exists]);
        let result = TrimExistentialSubqueries.apply(&and, &env.ctx()).unwrap();
        assert!(is_const_false(&result));
    }

    #[test]
    fn test_exists_over_grouped_agg_stays() {
        let env = TestEnv::new();
        let scan = env.table("t", 1, true);
        let x = scan.columns()[0];
        let agg = LogicalExprBuilder::get(scan).gb_agg(vec![x], vec![]).build();
        let exists = Expr::new(ScalarOperator::ScalarSubqueryExists, [agg]);
        let result = TrimExistentialSubqueries.apply(&exists, &env.ctx()).unwrap();
        assert!(Rc::ptr_eq(&exists, &result));
    }

    #[test]
    fn test_simplify_quantified_over_scalar_agg() {
        let env = TestEnv::new();
        let scan = env.table("t", 1, true);
        let x = scan.columns()[0];
        let total = env.factory.computed_column(DataType::Int);
        let outer = env.factory.computed_column(DataType::Int);
        let agg = LogicalExprBuilder::get(scan)
            .gb_agg(vec![], vec![(total, sum(x))])
            .build();
        let eq = env.comparison(CmpType::Eq);
        let any = Expr::new(
            ScalarOperator::ScalarSubqueryAny(QuantifiedSubquery::new(eq, total)),
            [agg.clone(), Expr::ident(outer)],
        );
        let result = SimplifyQuantifiedSubqueries.apply(&any, &env.ctx()).unwrap();
        assert_eq!(Some(&ScalarOperator::ScalarCmp(eq)), result.scalar_op());
        assert_eq!(Expr::ident(outer), *result.child(0));
        let subquery = result.child(1).scalar_op().unwrap().as_scalar_subquery().unwrap();
        assert!(subquery.generated_by_quantified());
        assert_eq!(total, subquery.column());
        assert_eq!(agg, *result.child(1).child(0));
    }

    #[test]
    fn test_quantified_over_table_stays() {
        let env = TestEnv::new();
        let scan = env.table("t", 1, true);
        let x = scan.columns()[0];
        let outer = env.factory.computed_column(DataType::Int);
        let any = Expr::new(
            ScalarOperator::ScalarSubqueryAny(QuantifiedSubquery::new(env.comparison(CmpType::Eq), x)),
            [LogicalExprBuilder::get(scan).build(), Expr::ident(outer)],
        );
        let result = SimplifyQuantifiedSubqueries.apply(&any, &env.ctx()).unwrap();
        assert!(Rc::ptr_eq(&any, &result));
    }

    #[test]
    fn test_unnest_subquery_of_subquery() {
        let env = TestEnv::new();
        let scan = env.table("y", 1, true);
        let i = scan.columns()[0];
        let inner = Expr::new(
            ScalarOperator::ScalarSubquery(Subquery::new(i)),
            [LogicalExprBuilder::get(scan).build()],
        );
        let wrapped = env.factory.computed_column(DataType::Int);
        let dummy = env.factory.computed_column(DataType::Int);
        let const_table = ConstTable::new(vec![dummy], vec![vec![Datum::Int(1)]]);
        let outer_rel = LogicalExprBuilder::const_table(const_table)
            .project(vec![(wrapped, inner.clone())])
            .build();
        let outer = Expr::new(ScalarOperator::ScalarSubquery(Subquery::new(wrapped)), [outer_rel]);
        let result_col = env.factory.computed_column(DataType::Int);
        let element = Expr::project_element(result_col, outer);

        let result = UnnestScalarSubqueries.apply(&element, &env.ctx()).unwrap();
        assert_eq!(Expr::project_element(result_col, inner), result);
    }

    #[test]
    fn test_add_project_below_outer_ref_subquery() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let s = env.table("s", 1, true);
        let a = t.columns()[0];
        let subquery = Expr::new(
            ScalarOperator::ScalarSubquery(Subquery::new(a)),
            [LogicalExprBuilder::get(s).build()],
        );
        let out = env.factory.computed_column(DataType::Int);
        let expr = LogicalExprBuilder::get(t)
            .project(vec![(out, subquery)])
            .build();
        let result = AddProjectBelowSubquery.apply(&expr, &env.ctx()).unwrap();
        let new_subquery = result.child(1).child(0).child(0);
        let new_column = new_subquery.scalar_op().unwrap().as_scalar_subquery().unwrap().column();
        assert_ne!(a, new_column);
        let guard = new_subquery.child(0);
        assert_eq!(Some(&LogicalOperator::LogicalProject), guard.logical_op());
        assert_eq!(
            Expr::project_element(new_column, Expr::ident(a)),
            *guard.child(1).child(0)
        );
    }

    fn plus_one(column: crate::operator::ColumnRef) -> ExprRef {
        Expr::new(
            ScalarOperator::ScalarFunc(Function::new("int4pl", DataType::Int)),
            [Expr::ident(column), Expr::int_const(1)],
        )
    }

    #[test]
    fn test_in_subquery_to_exists() {
        let env = TestEnv::new();
        let t = env.table("t", 2, true);
        let s = env.table("s", 2, true);
        let (a, d) = (t.columns()[0], t.columns()[1]);
        let (b, c) = (s.columns()[0], s.columns()[1]);
        let eq = env.comparison(CmpType::Eq);
        let correlated = LogicalExprBuilder::get(s)
            .select(env.cmp(CmpType::Eq, Expr::ident(c), Expr::ident(d)))
            .build();
        let projected = env.factory.computed_column(DataType::Int);
        let in_subquery = |value: ExprRef| {
            let rel = LogicalExprBuilder::from_expr(correlated.clone())
                .project(vec![(projected, value)])
                .build();
            Expr::new(
                ScalarOperator::ScalarSubqueryAny(QuantifiedSubquery::new(eq, projected)),
                [rel, Expr::ident(a)],
            )
        };

        // Projection of an outer reference only.
        let result = RewriteInSubqueryToExists
            .apply(&in_subquery(plus_one(d)), &env.ctx())
            .unwrap();
        assert!(is_and(&result));
        assert_eq!(
            Some(&ScalarOperator::ScalarSubqueryExists),
            result.child(0).scalar_op()
        );
        assert_eq!(correlated, *result.child(0).child(0));
        assert_eq!(Expr::cmp(eq, Expr::ident(a), plus_one(d)), *result.child(1));

        // Projection of a column of S.
        let local = in_subquery(plus_one(b));
        let result = RewriteInSubqueryToExists.apply(&local, &env.ctx()).unwrap();
        assert!(Rc::ptr_eq(&local, &result));
    }
}
