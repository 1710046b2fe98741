use std::rc::Rc;

use log::debug;

use crate::config::TraceFlag;
use crate::error::OptResult;
use crate::expr::{Expr, ExprRef};
use crate::operator::{ColumnSet, ConstTable, LogicalOperator, ScalarOperator};
use crate::preprocessor::{map_children, transform_down, PreprocessContext, PreprocessPass};

/// Removes project list elements of projects and aggregates whose columns nothing above them
/// reads.
///
/// Starts from the query's required columns (see
/// [`PreprocessContext::with_required_columns`]) and does nothing without them, or when
/// [`TraceFlag::DisablePruneUnusedComputedColumns`] is set. Elements computing set-returning
/// functions always stay since they change the number of rows. Subqueries are left alone.
#[derive(Clone, Debug, Default)]
pub struct PruneUnusedComputedColumns;

impl PreprocessPass for PruneUnusedComputedColumns {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        if ctx.trace_flag(TraceFlag::DisablePruneUnusedComputedColumns) {
            return Ok(expr.clone());
        }
        match ctx.required_columns() {
            Some(required) => prune_unused(expr, required.clone(), ctx),
            None => Ok(expr.clone()),
        }
    }
}

fn prune_unused(expr: &ExprRef, mut required: ColumnSet, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    let op = match expr.logical_op() {
        Some(op) => op,
        None => return Ok(expr.clone()),
    };
    match op {
        LogicalOperator::LogicalProject | LogicalOperator::LogicalGbAgg(_) => {
            prune_project_list(expr, op, required, ctx)
        }
        // Consumers elsewhere in the tree read the producer's columns.
        LogicalOperator::LogicalCteProducer(_) => Ok(expr.clone()),
        _ => {
            required.extend(expr.relational_props().used_columns().iter().copied());
            map_children(expr, |child| {
                if child.is_logical() {
                    prune_unused(child, required.clone(), ctx)
                } else {
                    Ok(child.clone())
                }
            })
        }
    }
}

fn prune_project_list(
    expr: &ExprRef,
    op: &LogicalOperator,
    mut required: ColumnSet,
    ctx: &PreprocessContext,
) -> OptResult<ExprRef> {
    let list = expr.child(1);
    let list_props = list.scalar_props();
    if let LogicalOperator::LogicalGbAgg(agg) = op {
        required.extend(agg.grouping_columns().iter().copied());
    }
    required.extend(list_props.set_returning_columns().iter().copied());

    let unused: ColumnSet = list_props
        .defined_columns()
        .difference(&required)
        .copied()
        .collect();
    let kept: Vec<ExprRef> = list
        .children()
        .iter()
        .filter(|element| match element.scalar_op() {
            Some(ScalarOperator::ScalarProjectElement(column)) => {
                !unused.contains(column)
            }
            _ => true,
        })
        .cloned()
        .collect();

    let new_list = if unused.is_empty() {
        required.extend(list_props.used_columns().iter().copied());
        list.clone()
    } else if kept.is_empty() {
        match op {
            LogicalOperator::LogicalProject => {
                debug!("Removing project without used columns");
                return prune_unused(expr.child(0), required, ctx);
            }
            LogicalOperator::LogicalGbAgg(agg) if !agg.is_scalar() => {
                debug!("Removing all {} aggregates of a grouping", unused.len());
                Expr::project_list([])
            }
            // A scalar aggregate without aggregates is not meaningful.
            _ => {
                required.extend(list_props.used_columns().iter().copied());
                list.clone()
            }
        }
    } else {
        debug!("Removing {} unused computed columns", unused.len());
        let new_list = Expr::project_list(kept);
        required.extend(new_list.scalar_props().used_columns().iter().copied());
        new_list
    };

    let child = prune_unused(expr.child(0), required, ctx)?;
    if Rc::ptr_eq(&child, expr.child(0)) && Rc::ptr_eq(&new_list, list) {
        Ok(expr.clone())
    } else {
        Ok(expr.with_children([child, new_list]))
    }
}

/// Replaces relational subtrees that provably produce no rows with an empty constant table of
/// the same columns. DML operators are kept.
#[derive(Clone, Debug, Default)]
pub struct PruneEmptySubtrees;

impl PreprocessPass for PruneEmptySubtrees {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_down(expr, ctx, &|e| {
            let op = match e.logical_op() {
                Some(op) => op,
                None => return Ok(None),
            };
            if op.is_dml() || matches!(op, LogicalOperator::LogicalConstTableGet(_)) {
                return Ok(None);
            }
            let props = e.relational_props();
            if !props.max_card().is_zero() {
                return Ok(None);
            }
            debug!("Replacing empty {} with a constant table", op.name());
            let columns = props.output_columns().iter().copied().collect();
            Ok(Some(Expr::leaf(LogicalOperator::LogicalConstTableGet(
                ConstTable::empty(columns),
            ))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreprocessorConfig;
    use crate::datum::DataType;
    use crate::expr::LogicalExprBuilder;
    use crate::operator::{CmpType, Function, JoinType};
    use crate::preprocessor::testing::TestEnv;

    fn required(columns: &[crate::operator::ColumnRef]) -> ColumnSet {
        columns.iter().copied().collect()
    }

    #[test]
    fn test_unused_project_elements_removed() {
        let env = TestEnv::new();
        let t = env.table("t", 2, true);
        let (a, b) = (t.columns()[0], t.columns()[1]);
        let x = env.factory.computed_column(DataType::Int);
        let y = env.factory.computed_column(DataType::Int);
        let expr = LogicalExprBuilder::get(t)
            .project(vec![(x, Expr::ident(a)), (y, Expr::ident(b))])
            .build();
        let ctx = env.ctx().with_required_columns(required(&[x]));

        let result = PruneUnusedComputedColumns.apply(&expr, &ctx).unwrap();
        assert_eq!(1, result.child(1).arity());
        assert!(result.relational_props().output_columns().contains(&x));
        assert!(!result.relational_props().output_columns().contains(&y));
    }

    #[test]
    fn test_project_without_used_elements_disappears() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let a = t.columns()[0];
        let x = env.factory.computed_column(DataType::Int);
        let get = LogicalExprBuilder::get(t).build();
        let expr = LogicalExprBuilder::from_expr(get.clone())
            .project(vec![(x, Expr::ident(a))])
            .build();
        let ctx = env.ctx().with_required_columns(required(&[a]));
        assert_eq!(get, PruneUnusedComputedColumns.apply(&expr, &ctx).unwrap());
    }

    #[test]
    fn test_columns_read_above_are_kept() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let a = t.columns()[0];
        let x = env.factory.computed_column(DataType::Int);
        let srf = env.factory.computed_column(DataType::Int);
        let unnest = Expr::new(
            ScalarOperator::ScalarFunc(Function::new("unnest", DataType::Int).set_returning()),
            [Expr::ident(a)],
        );
        let expr = LogicalExprBuilder::get(t)
            .project(vec![(x, Expr::ident(a)), (srf, unnest)])
            .select(env.cmp(CmpType::G, Expr::ident(x), Expr::int_const(0)))
            .build();
        let ctx = env.ctx().with_required_columns(required(&[a]));
        let result = PruneUnusedComputedColumns.apply(&expr, &ctx).unwrap();
        assert!(Rc::ptr_eq(&expr, &result));
    }

    #[test]
    fn test_pruning_switched_off() {
        let env = TestEnv::with_config(
            PreprocessorConfig::new().with_trace_flag(TraceFlag::DisablePruneUnusedComputedColumns),
        );
        let t = env.table("t", 1, true);
        let a = t.columns()[0];
        let x = env.factory.computed_column(DataType::Int);
        let expr = LogicalExprBuilder::get(t)
            .project(vec![(x, Expr::ident(a))])
            .build();
        let ctx = env.ctx().with_required_columns(required(&[a]));
        let result = PruneUnusedComputedColumns.apply(&expr, &ctx).unwrap();
        assert!(Rc::ptr_eq(&expr, &result));
    }

    #[test]
    fn test_grouping_keeps_grouping_columns() {
        let env = TestEnv::new();
        let t = env.table("t", 2, true);
        let (a, b) = (t.columns()[0], t.columns()[1]);
        let total = env.factory.computed_column(DataType::Int);
        let sum = Expr::new(
            ScalarOperator::ScalarFunc(Function::new("sum", DataType::Int)),
            [Expr::ident(b)],
        );
        let expr = LogicalExprBuilder::get(t)
            .gb_agg(vec![a], vec![(total, sum)])
            .build();
        let ctx = env.ctx().with_required_columns(required(&[a]));

        let result = PruneUnusedComputedColumns.apply(&expr, &ctx).unwrap();
        let agg = result.logical_op().unwrap().as_logical_gb_agg().unwrap();
        assert_eq!(&[a], agg.grouping_columns());
        assert_eq!(0, result.child(1).arity());
    }

    #[test]
    fn test_empty_join_becomes_const_table() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let s = env.table("s", 1, true);
        let join = LogicalExprBuilder::get(t)
            .join(
                JoinType::Inner,
                LogicalExprBuilder::get(s).build(),
                Expr::bool_const(false),
            )
            .build();
        let output = join.relational_props().output_columns().clone();

        let result = PruneEmptySubtrees.apply(&join, &env.ctx()).unwrap();
        let table = result
            .logical_op()
            .unwrap()
            .as_logical_const_table_get()
            .unwrap();
        assert!(table.rows().is_empty());
        assert_eq!(&output, result.relational_props().output_columns());
    }

    #[test]
    fn test_non_empty_tree_unchanged() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let a = t.columns()[0];
        let expr = LogicalExprBuilder::get(t)
            .select(env.cmp(CmpType::Eq, Expr::ident(a), Expr::int_const(1)))
            .build();
        let result = PruneEmptySubtrees.apply(&expr, &env.ctx()).unwrap();
        assert!(Rc::ptr_eq(&expr, &result));
    }
}
