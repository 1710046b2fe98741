use log::debug;

use crate::error::OptResult;
use crate::expr::{Expr, ExprRef};
use crate::operator::{
    exclude_order_columns, ColumnSet, LogicalOperator, SequenceProject, WindowSpec,
};
use crate::preprocessor::{transform_up, PreprocessContext, PreprocessPass};

/// Drops outer references from sort, grouping and partition keys.
///
/// An outer reference is constant for one evaluation of a correlated subquery, so ordering,
/// grouping or partitioning on it has no effect.
#[derive(Clone, Debug, Default)]
pub struct RemoveSuperfluousOuterRefs;

impl PreprocessPass for RemoveSuperfluousOuterRefs {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| Ok(remove_outer_refs(e)))
    }
}

fn remove_outer_refs(expr: &ExprRef) -> ExprRef {
    let op = match expr.logical_op() {
        Some(op) => op,
        None => return expr.clone(),
    };
    let props = expr.relational_props();
    let outer_refs = props.outer_references();
    if outer_refs.is_empty() {
        return expr.clone();
    }

    let new_op = match op {
        LogicalOperator::LogicalLimit(limit) => {
            let order = exclude_order_columns(limit.order(), outer_refs);
            if order.len() == limit.order().len() {
                return expr.clone();
            }
            LogicalOperator::LogicalLimit(limit.with_order(order))
        }
        LogicalOperator::LogicalGbAgg(agg) => {
            let new_agg = agg.exclude_columns(outer_refs);
            let unchanged = new_agg.grouping_columns().len() == agg.grouping_columns().len();
            // Without grouping columns the aggregate would return a row on empty input.
            if unchanged || new_agg.is_scalar() {
                return expr.clone();
            }
            LogicalOperator::LogicalGbAgg(new_agg)
        }
        LogicalOperator::LogicalSequenceProject(window) => {
            let new_window = exclude_window_columns(window, outer_refs);
            if &new_window == window {
                return expr.clone();
            }
            LogicalOperator::LogicalSequenceProject(new_window)
        }
        _ => return expr.clone(),
    };
    debug!("Removed outer references {:?} from {}", outer_refs, op.name());
    Expr::new(new_op, expr.children().iter().cloned())
}

fn exclude_window_columns(window: &SequenceProject, columns: &ColumnSet) -> SequenceProject {
    let partition = window
        .partition_columns()
        .iter()
        .filter(|c| !columns.contains(c))
        .copied()
        .collect();
    let specs = window
        .specs()
        .iter()
        .map(|spec| {
            WindowSpec::new(
                exclude_order_columns(spec.order(), columns),
                spec.frame().copied(),
            )
        })
        .collect();
    SequenceProject::new(partition, specs)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::datum::DataType;
    use crate::expr::LogicalExprBuilder;
    use crate::operator::{OrderKey, ScalarOperator, Subquery};
    use crate::preprocessor::testing::TestEnv;

    #[test]
    fn test_limit_and_gb_agg_keys() {
        let env = TestEnv::new();
        let scan = env.table("t", 1, true);
        let a = scan.columns()[0];
        let outer = env.factory.computed_column(DataType::Int);

        let limit = LogicalExprBuilder::get(scan.clone())
            .limit(vec![OrderKey::asc(outer), OrderKey::desc(a)], 0, Some(1))
            .build();
        let result = RemoveSuperfluousOuterRefs.apply(&limit, &env.ctx()).unwrap();
        let new_limit = result.logical_op().unwrap().as_logical_limit().unwrap();
        assert_eq!(&[OrderKey::desc(a)], new_limit.order());

        let agg = LogicalExprBuilder::get(scan.clone())
            .gb_agg(vec![a, outer], vec![])
            .build();
        let result = RemoveSuperfluousOuterRefs.apply(&agg, &env.ctx()).unwrap();
        let new_agg = result.logical_op().unwrap().as_logical_gb_agg().unwrap();
        assert_eq!(&[a], new_agg.grouping_columns());

        let only_outer = LogicalExprBuilder::get(scan)
            .gb_agg(vec![outer], vec![])
            .build();
        let result = RemoveSuperfluousOuterRefs.apply(&only_outer, &env.ctx()).unwrap();
        assert!(Rc::ptr_eq(&only_outer, &result));
    }

    #[test]
    fn test_window_partition_inside_subquery() {
        let env = TestEnv::new();
        let scan = env.table("t", 1, true);
        let a = scan.columns()[0];
        let outer = env.factory.computed_column(DataType::Int);
        let window = LogicalExprBuilder::get(scan)
            .window(
                SequenceProject::new(
                    vec![outer, a],
                    vec![WindowSpec::new(vec![OrderKey::asc(outer)], None)],
                ),
                vec![],
            )
            .build();
        let subquery = Expr::new(ScalarOperator::ScalarSubquery(Subquery::new(a)), [window]);
        let result = RemoveSuperfluousOuterRefs.apply(&subquery, &env.ctx()).unwrap();
        let new_window = result
            .child(0)
            .logical_op()
            .unwrap()
            .as_logical_sequence_project()
            .unwrap();
        assert_eq!(&[a], new_window.partition_columns());
        assert!(new_window.specs()[0].order().is_empty());
    }
}
