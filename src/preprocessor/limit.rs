use crate::config::TraceFlag;
use crate::error::OptResult;
use crate::expr::{const_datum, ExprRef};
use crate::operator::LogicalOperator;
use crate::preprocessor::{transform_up, PreprocessContext, PreprocessPass};

/// Removes limits that have neither a row count nor an offset.
///
/// A limit directly under a DML statement keeps ordering its input and stays, unless
/// [`TraceFlag::RemoveOrderBelowDml`] is set.
#[derive(Clone, Debug, Default)]
pub struct RemoveSuperfluousLimit;

impl PreprocessPass for RemoveSuperfluousLimit {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        let remove_below_dml = ctx.trace_flag(TraceFlag::RemoveOrderBelowDml);
        transform_up(expr, ctx, &|e| {
            if let Some(LogicalOperator::LogicalLimit(limit)) = e.logical_op() {
                let zero_offset = const_datum(e.child(1)).and_then(|d| d.as_int()) == Some(0);
                let barrier = limit.top_limit_under_dml() && !remove_below_dml;
                if !limit.has_count() && zero_offset && !barrier {
                    return Ok(e.child(0).clone());
                }
            }
            Ok(e.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreprocessorConfig;
    use crate::expr::LogicalExprBuilder;
    use crate::operator::{Limit, OrderKey};
    use crate::preprocessor::testing::TestEnv;

    #[test]
    fn test_stacked_limits_without_count() {
        let env = TestEnv::new();
        let scan = env.table("t", 1, true);
        let a = scan.columns()[0];
        let get = LogicalExprBuilder::get(scan).build();
        let expr = LogicalExprBuilder::from_expr(get.clone())
            .limit(vec![OrderKey::asc(a)], 0, None)
            .limit(vec![], 0, None)
            .build();
        assert_eq!(get, RemoveSuperfluousLimit.apply(&expr, &env.ctx()).unwrap());
    }

    #[test]
    fn test_limit_with_count_or_offset_stays() {
        let env = TestEnv::new();
        let get = LogicalExprBuilder::get(env.table("t", 1, true)).build();
        let counted = LogicalExprBuilder::from_expr(get.clone())
            .limit(vec![], 0, Some(10))
            .build();
        assert_eq!(counted, RemoveSuperfluousLimit.apply(&counted, &env.ctx()).unwrap());
        let offset = LogicalExprBuilder::from_expr(get)
            .limit(vec![], 5, None)
            .build();
        assert_eq!(offset, RemoveSuperfluousLimit.apply(&offset, &env.ctx()).unwrap());
    }

    #[test]
    fn test_limit_under_dml() {
        let get = |env: &TestEnv| LogicalExprBuilder::get(env.table("t", 1, true)).build();
        let env = TestEnv::new();
        let expr = LogicalExprBuilder::from_expr(get(&env))
            .limit_with(Limit::new(vec![], false).under_dml(), 0, None)
            .build();
        assert_eq!(expr, RemoveSuperfluousLimit.apply(&expr, &env.ctx()).unwrap());

        let env = TestEnv::with_config(
            PreprocessorConfig::new().with_trace_flag(TraceFlag::RemoveOrderBelowDml),
        );
        let input = get(&env);
        let expr = LogicalExprBuilder::from_expr(input.clone())
            .limit_with(Limit::new(vec![], false).under_dml(), 0, None)
            .build();
        assert_eq!(input, RemoveSuperfluousLimit.apply(&expr, &env.ctx()).unwrap());
    }
}
