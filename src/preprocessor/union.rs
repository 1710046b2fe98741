use log::debug;

use crate::error::OptResult;
use crate::expr::{Expr, ExprRef};
use crate::operator::{ColumnRef, LogicalOperator, SetOp};
use crate::preprocessor::{transform_up, PreprocessContext, PreprocessPass};

/// Flattens `UNION ALL` inputs that are themselves `UNION ALL`s (and likewise for `UNION`)
/// into one n-ary set operation.
#[derive(Clone, Debug, Default)]
pub struct CollapseUnions;

impl PreprocessPass for CollapseUnions {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| Ok(collapse_set_op(e)))
    }
}

fn collapse_set_op(expr: &ExprRef) -> ExprRef {
    let (op, set_op) = match expr.logical_op() {
        Some(op @ (LogicalOperator::LogicalUnion(s) | LogicalOperator::LogicalUnionAll(s))) => {
            (op, s)
        }
        _ => return expr.clone(),
    };

    let mut collapsed = false;
    let mut children = Vec::with_capacity(expr.arity());
    let mut input_columns = Vec::with_capacity(expr.arity());
    for (child, expected) in expr.children().iter().zip(set_op.input_columns()) {
        match grandchildren_of(op, child, expected) {
            Some(grandchildren) => {
                collapsed = true;
                for (grandchild, columns) in grandchildren {
                    children.push(grandchild);
                    input_columns.push(columns);
                }
            }
            None => {
                children.push(child.clone());
                input_columns.push(expected.clone());
            }
        }
    }
    if !collapsed {
        return expr.clone();
    }

    debug!("Collapsed {} into {} inputs", op.name(), children.len());
    let new_set_op = SetOp::new(set_op.output_columns().to_vec(), input_columns);
    let new_op = match op {
        LogicalOperator::LogicalUnion(_) => LogicalOperator::LogicalUnion(new_set_op),
        _ => LogicalOperator::LogicalUnionAll(new_set_op),
    };
    Expr::new(new_op, children)
}

/// The inputs of `child` with their columns in the order `parent` expects, when `child` is a
/// set operation of the same kind whose output provides all of `expected`.
fn grandchildren_of(
    parent: &LogicalOperator,
    child: &ExprRef,
    expected: &[ColumnRef],
) -> Option<Vec<(ExprRef, Vec<ColumnRef>)>> {
    let child_set_op = match (parent, child.logical_op()?) {
        (LogicalOperator::LogicalUnion(_), LogicalOperator::LogicalUnion(s))
        | (LogicalOperator::LogicalUnionAll(_), LogicalOperator::LogicalUnionAll(s)) => s,
        _ => return None,
    };
    let positions = expected
        .iter()
        .map(|c| child_set_op.output_columns().iter().position(|o| o == c))
        .collect::<Option<Vec<_>>>()?;

    child
        .children()
        .iter()
        .zip(child_set_op.input_columns())
        .map(|(grandchild, columns)| {
            let reordered = positions
                .iter()
                .map(|&p| columns.get(p).copied())
                .collect::<Option<Vec<_>>>()?;
            Some((grandchild.clone(), reordered))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DataType;
    use crate::expr::LogicalExprBuilder;
    use crate::preprocessor::testing::TestEnv;

    #[test]
    fn test_nested_union_all_is_flattened() {
        let env = TestEnv::new();
        let scans: Vec<_> = ["t1", "t2", "t3"]
            .iter()
            .map(|name| env.table(name, 2, true))
            .collect();
        let gets: Vec<_> = scans
            .iter()
            .map(|s| LogicalExprBuilder::get(s.clone()).build())
            .collect();
        let cols = |i: usize| scans[i].columns().to_vec();
        let inner_out = vec![
            env.factory.computed_column(DataType::Int),
            env.factory.computed_column(DataType::Int),
        ];
        let outer_out = vec![
            env.factory.computed_column(DataType::Int),
            env.factory.computed_column(DataType::Int),
        ];
        let inner = LogicalExprBuilder::from_expr(gets[0].clone())
            .union_all(
                vec![gets[1].clone()],
                SetOp::new(inner_out.clone(), vec![cols(0), cols(1)]),
            )
            .build();
        // The outer union reads the inner one's columns swapped.
        let swapped = vec![inner_out[1], inner_out[0]];
        let swap = |c: Vec<ColumnRef>| vec![c[1], c[0]];
        let expr = LogicalExprBuilder::from_expr(inner)
            .union_all(
                vec![gets[2].clone()],
                SetOp::new(outer_out.clone(), vec![swapped, cols(2)]),
            )
            .build();

        let result = CollapseUnions.apply(&expr, &env.ctx()).unwrap();
        let set_op = result.logical_op().unwrap().as_logical_union_all().unwrap();
        assert_eq!(3, result.arity());
        assert_eq!(&outer_out[..], set_op.output_columns());
        assert_eq!(
            &[swap(cols(0)), swap(cols(1)), cols(2)],
            set_op.input_columns()
        );
    }

    #[test]
    fn test_mixed_set_ops_stay() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let s = env.table("s", 1, true);
        let (a, b) = (t.columns()[0], s.columns()[0]);
        let out = env.factory.computed_column(DataType::Int);
        let out2 = env.factory.computed_column(DataType::Int);
        let union = LogicalExprBuilder::get(t)
            .union(
                vec![LogicalExprBuilder::get(s.clone()).build()],
                SetOp::new(vec![out], vec![vec![a], vec![b]]),
            )
            .build();
        let expr = LogicalExprBuilder::from_expr(union)
            .union_all(
                vec![LogicalExprBuilder::get(s).build()],
                SetOp::new(vec![out2], vec![vec![out], vec![b]]),
            )
            .build();
        assert_eq!(expr, CollapseUnions.apply(&expr, &env.ctx()).unwrap());
    }
}
