use log::{debug, info};

use crate::config::TraceFlag;
use crate::error::OptResult;
use crate::expr::{conjunction, is_null_rejecting, nary_join, Expr, ExprRef};
use crate::operator::{Join, LogicalOperator};
use crate::preprocessor::{
    map_children, normalize, JoinXform, PreprocessContext, PreprocessPass,
};

/// Turns left outer joins into inner joins where a predicate above them discards the
/// NULL-extended rows anyway.
///
/// Two shapes are handled: a select directly over the outer join, which the normalizer
/// rewrites, and an inner join whose predicate rejects NULLs of the outer join's inner side.
#[derive(Clone, Debug, Default)]
pub struct OuterJoinToInnerJoin;

impl PreprocessPass for OuterJoinToInnerJoin {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        outer_join_to_inner_join(expr, ctx)
    }
}

fn is_inner_join(expr: &ExprRef) -> bool {
    expr.logical_op().map_or(false, |op| op.is_inner_join())
}

fn is_left_outer_join(expr: &ExprRef) -> bool {
    expr.logical_op().map_or(false, |op| op.is_left_outer_join())
}

fn outer_join_to_inner_join(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if let Some(LogicalOperator::LogicalSelect) = expr.logical_op() {
        if is_left_outer_join(expr.child(0)) {
            return normalize(expr, ctx);
        }
    }
    if !is_inner_join(expr) {
        return map_children(expr, |child| outer_join_to_inner_join(child, ctx));
    }

    let enabled = !ctx.trace_flag(TraceFlag::DisableOuterJoinToInnerJoinRewrite);
    let pred = expr.child(expr.arity() - 1);
    map_children(expr, |child| {
        if enabled
            && is_left_outer_join(child)
            && is_null_rejecting(pred, child.child(1).relational_props().output_columns())
        {
            debug!("Join predicate rejects NULLs of an outer join's inner side");
            let inner_join = Expr::new(
                LogicalOperator::LogicalJoin(Join::inner()),
                [
                    outer_join_to_inner_join(child.child(0), ctx)?,
                    outer_join_to_inner_join(child.child(1), ctx)?,
                    outer_join_to_inner_join(child.child(2), ctx)?,
                ],
            );
            return collapse_inner_joins(&inner_join, ctx);
        }
        outer_join_to_inner_join(child, ctx)
    })
}

/// Merges trees of inner joins into n-ary joins whose predicate is the conjunction of the
/// merged join predicates.
///
/// When a resulting join has more inputs than the configured limit, join commutativity and
/// associativity are disabled for the rest of the optimization.
#[derive(Clone, Debug, Default)]
pub struct CollapseInnerJoins;

impl PreprocessPass for CollapseInnerJoins {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        collapse_inner_joins(expr, ctx)
    }
}

fn collapse_inner_joins(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if !is_inner_join(expr) {
        return map_children(expr, |child| collapse_inner_joins(child, ctx));
    }

    let last = expr.arity() - 1;
    let mut collapsed = false;
    let mut inputs = Vec::with_capacity(last);
    let mut preds = Vec::new();
    for child in &expr.children()[..last] {
        if is_inner_join(child) {
            collapsed = true;
            let child_last = child.arity() - 1;
            inputs.extend(child.children()[..child_last].iter().cloned());
            preds.push(child.child(child_last).clone());
        } else {
            inputs.push(collapse_inner_joins(child, ctx)?);
        }
    }
    preds.push(expr.child(last).clone());
    let joined = nary_join(inputs, conjunction(preds));
    let result = if collapsed {
        collapse_inner_joins(&joined, ctx)?
    } else {
        joined
    };

    let arity = result.arity() - 1;
    let limit = ctx.config().join_arity_limit();
    if arity > limit {
        info!(
            "Join of {} inputs exceeds the arity limit {}, disabling join reordering",
            arity, limit
        );
        ctx.disable_xform(JoinXform::JoinCommutativity);
        ctx.disable_xform(JoinXform::JoinAssociativity);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreprocessorConfig;
    use crate::expr::LogicalExprBuilder;
    use crate::operator::{CmpType, JoinType};
    use crate::preprocessor::testing::TestEnv;

    #[test]
    fn test_inner_join_chain_becomes_nary() {
        let env = TestEnv::new();
        let tables: Vec<_> = ["t1", "t2", "t3"]
            .iter()
            .map(|name| env.table(name, 1, true))
            .collect();
        let col = |i: usize| Expr::ident(tables[i].columns()[0]);
        let p12 = env.cmp(CmpType::Eq, col(0), col(1));
        let p23 = env.cmp(CmpType::Eq, col(1), col(2));
        let gets: Vec<_> = tables
            .iter()
            .map(|t| LogicalExprBuilder::get(t.clone()).build())
            .collect();
        let expr = LogicalExprBuilder::from_expr(gets[0].clone())
            .join(JoinType::Inner, gets[1].clone(), p12.clone())
            .join(JoinType::Inner, gets[2].clone(), p23.clone())
            .build();

        let ctx = env.ctx();
        let result = CollapseInnerJoins.apply(&expr, &ctx).unwrap();
        assert_eq!(nary_join(gets, conjunction([p12, p23])), result);
        assert!(ctx.disabled_xforms().is_empty());
    }

    #[test]
    fn test_arity_limit_disables_reordering() {
        let env = TestEnv::with_config(PreprocessorConfig::new().with_join_arity_limit(2));
        let gets: Vec<_> = ["t1", "t2", "t3"]
            .iter()
            .map(|name| LogicalExprBuilder::get(env.table(name, 1, true)).build())
            .collect();
        let expr = LogicalExprBuilder::from_expr(gets[0].clone())
            .join(JoinType::Inner, gets[1].clone(), Expr::bool_const(true))
            .join(JoinType::Inner, gets[2].clone(), Expr::bool_const(true))
            .build();

        let ctx = env.ctx();
        let result = CollapseInnerJoins.apply(&expr, &ctx).unwrap();
        assert_eq!(4, result.arity());
        assert!(ctx.disabled_xforms().contains(JoinXform::JoinCommutativity));
        assert!(ctx.disabled_xforms().contains(JoinXform::JoinAssociativity));
    }

    #[test]
    fn test_inner_join_predicate_rejects_outer_join_nulls() {
        let env = TestEnv::new();
        let x = env.table("x", 1, true);
        let y = env.table("y", 1, true);
        let z = env.table("z", 1, true);
        let (cx, cy, cz) = (x.columns()[0], y.columns()[0], z.columns()[0]);
        let on = env.cmp(CmpType::Eq, Expr::ident(cx), Expr::ident(cy));
        let yz = env.cmp(CmpType::Eq, Expr::ident(cy), Expr::ident(cz));
        let get_x = LogicalExprBuilder::get(x).build();
        let get_y = LogicalExprBuilder::get(y).build();
        let get_z = LogicalExprBuilder::get(z).build();
        let expr = nary_join(
            vec![
                LogicalExprBuilder::from_expr(get_x.clone())
                    .join(JoinType::LeftOuter, get_y.clone(), on.clone())
                    .build(),
                get_z.clone(),
            ],
            yz.clone(),
        );

        let result = OuterJoinToInnerJoin.apply(&expr, &env.ctx()).unwrap();
        let expected = nary_join(vec![nary_join(vec![get_x, get_y], on), get_z], yz);
        assert_eq!(expected, result);

        let env_off = TestEnv::with_config(
            PreprocessorConfig::new()
                .with_trace_flag(TraceFlag::DisableOuterJoinToInnerJoinRewrite),
        );
        let result = OuterJoinToInnerJoin.apply(&expr, &env_off.ctx()).unwrap();
        assert_eq!(expr, result);
    }
}
