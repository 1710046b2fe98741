use log::debug;

use crate::error::OptResult;
use crate::expr::{Expr, ExprRef};
use crate::operator::{ColumnSet, LogicalOperator};
use crate::preprocessor::{transform_up, PreprocessContext, PreprocessPass};

/// Merges stacked projects.
///
/// Elements of the upper project that do not read columns computed by the lower one move into
/// the lower project. The upper project stays with the remaining elements, or disappears when
/// none remain. Set-returning elements only move together with the whole project list, and
/// only into a project without set-returning elements of its own.
#[derive(Clone, Debug, Default)]
pub struct CollapseProjects;

impl PreprocessPass for CollapseProjects {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| collapse_project(e, ctx))
    }
}

fn is_project(expr: &ExprRef) -> bool {
    expr.logical_op() == Some(&LogicalOperator::LogicalProject)
}

fn collapse_project(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if !is_project(expr) || !is_project(expr.child(0)) {
        return Ok(expr.clone());
    }
    let child = expr.child(0);
    let child_list = child.child(1);
    let child_props = child_list.scalar_props();
    let child_defined: &ColumnSet = child_props.defined_columns();
    let child_has_srf = child_props.has_set_returning_function();

    let reads_child = |element: &ExprRef| {
        element
            .scalar_props()
            .used_columns()
            .iter()
            .any(|c| child_defined.contains(c))
    };
    let elements = expr.child(1).children();
    let all_movable = elements.iter().all(|e| !reads_child(e));
    let (moved, kept): (Vec<ExprRef>, Vec<ExprRef>) =
        elements.iter().cloned().partition(|element| {
            if reads_child(element) {
                return false;
            }
            !element.scalar_props().has_set_returning_function() || (all_movable && !child_has_srf)
        });
    if moved.is_empty() {
        return Ok(expr.clone());
    }

    debug!("Moving {} project elements into the project below", moved.len());
    let merged_list = Expr::project_list(child_list.children().iter().cloned().chain(moved));
    let merged = collapse_project(
        &Expr::new(
            LogicalOperator::LogicalProject,
            [child.child(0).clone(), merged_list],
        ),
        ctx,
    )?;
    if kept.is_empty() {
        Ok(merged)
    } else {
        Ok(Expr::new(
            LogicalOperator::LogicalProject,
            [merged, Expr::project_list(kept)],
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::datum::DataType;
    use crate::expr::LogicalExprBuilder;
    use crate::operator::{Function, ScalarOperator};
    use crate::preprocessor::testing::TestEnv;

    fn plus_one(input: ExprRef) -> ExprRef {
        Expr::new(
            ScalarOperator::ScalarFunc(Function::new("int4pl", DataType::Int)),
            [input, Expr::int_const(1)],
        )
    }

    #[test]
    fn test_independent_projects_merge() {
        let env = TestEnv::new();
        let t = env.table("t", 2, true);
        let (a, b) = (t.columns()[0], t.columns()[1]);
        let x = env.factory.computed_column(DataType::Int);
        let y = env.factory.computed_column(DataType::Int);
        let get = LogicalExprBuilder::get(t).build();
        let expr = LogicalExprBuilder::from_expr(get.clone())
            .project(vec![(x, plus_one(Expr::ident(a)))])
            .project(vec![(y, plus_one(Expr::ident(b)))])
            .build();

        let result = CollapseProjects.apply(&expr, &env.ctx()).unwrap();
        let expected = LogicalExprBuilder::from_expr(get)
            .project(vec![(x, plus_one(Expr::ident(a))), (y, plus_one(Expr::ident(b)))])
            .build();
        assert_eq!(expected, result);
    }

    #[test]
    fn test_dependent_element_stays_above() {
        let env = TestEnv::new();
        let t = env.table("t", 2, true);
        let (a, b) = (t.columns()[0], t.columns()[1]);
        let x = env.factory.computed_column(DataType::Int);
        let y = env.factory.computed_column(DataType::Int);
        let z = env.factory.computed_column(DataType::Int);
        let expr = LogicalExprBuilder::get(t)
            .project(vec![(x, plus_one(Expr::ident(a)))])
            .project(vec![(y, plus_one(Expr::ident(x))), (z, Expr::ident(b))])
            .build();

        let result = CollapseProjects.apply(&expr, &env.ctx()).unwrap();
        assert!(is_project(&result));
        assert_eq!(1, result.child(1).arity());
        assert_eq!(2, result.child(0).child(1).arity());
        assert_eq!(
            expr.relational_props().output_columns(),
            result.relational_props().output_columns()
        );
    }

    #[test]
    fn test_set_returning_element_needs_whole_list() {
        let env = TestEnv::new();
        let t = env.table("t", 1, true);
        let a = t.columns()[0];
        let x = env.factory.computed_column(DataType::Int);
        let y = env.factory.computed_column(DataType::Int);
        let z = env.factory.computed_column(DataType::Int);
        let unnest = Expr::new(
            ScalarOperator::ScalarFunc(Function::new("unnest", DataType::Int).set_returning()),
            [Expr::ident(a)],
        );
        let expr = LogicalExprBuilder::get(t)
            .project(vec![(x, plus_one(Expr::ident(a)))])
            .project(vec![(y, unnest), (z, plus_one(Expr::ident(x)))])
            .build();

        let result = CollapseProjects.apply(&expr, &env.ctx()).unwrap();
        assert!(Rc::ptr_eq(&expr, &result));
    }
}
