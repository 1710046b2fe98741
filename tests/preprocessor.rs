use rust_orca_core::config::PreprocessorConfig;
use rust_orca_core::datum::DataType;
use rust_orca_core::expr::{conjunction, disjunction, table_scan, Expr, ExprRef, LogicalExprBuilder};
use rust_orca_core::metadata::{InMemoryMetadata, MetadataAccessor};
use rust_orca_core::operator::{CmpType, ColumnFactory, ColumnSet, JoinType, LogicalOperator};
use rust_orca_core::preprocessor::{PreprocessContext, PreprocessPass, Preprocessor, UnnestBoolOps};

struct Fixture {
    config: PreprocessorConfig,
    metadata: InMemoryMetadata,
    factory: ColumnFactory,
}

impl Fixture {
    fn new() -> Self {
        Self {
            config: PreprocessorConfig::new(),
            metadata: InMemoryMetadata::standard(),
            factory: ColumnFactory::new(),
        }
    }

    fn ctx(&self) -> PreprocessContext<'_> {
        PreprocessContext::new(&self.config, &self.metadata, &self.factory)
    }

    fn cmp(&self, cmp_type: CmpType, left: ExprRef, right: ExprRef) -> ExprRef {
        Expr::cmp(self.metadata.comparison(cmp_type).unwrap(), left, right)
    }
}

fn any_node(expr: &ExprRef, f: &dyn Fn(&ExprRef) -> bool) -> bool {
    f(expr) || expr.children().iter().any(|c| any_node(c, f))
}

fn has_outer_join(expr: &ExprRef) -> bool {
    any_node(expr, &|e| e.logical_op().map_or(false, |op| op.is_left_outer_join()))
}

#[test]
fn test_where_clause_turns_outer_join_inner() {
    let f = Fixture::new();
    let t = table_scan(&f.factory, "t", &[(DataType::Int, true)]);
    let s = table_scan(&f.factory, "s", &[(DataType::Int, true), (DataType::Int, true)]);
    let (a, b, c) = (t.columns()[0], s.columns()[0], s.columns()[1]);
    let expr = LogicalExprBuilder::get(t)
        .join(
            JoinType::LeftOuter,
            LogicalExprBuilder::get(s).build(),
            f.cmp(CmpType::Eq, Expr::ident(a), Expr::ident(b)),
        )
        .select(f.cmp(CmpType::G, Expr::ident(c), Expr::int_const(10)))
        .build();
    assert!(has_outer_join(&expr));

    let result = Preprocessor::new().preprocess(&expr, &f.ctx()).unwrap();
    assert!(!has_outer_join(&result));
    assert_eq!(
        expr.relational_props().output_columns(),
        result.relational_props().output_columns()
    );
}

#[test]
fn test_where_clause_on_outer_side_keeps_outer_join() {
    let f = Fixture::new();
    let t = table_scan(&f.factory, "t", &[(DataType::Int, true)]);
    let s = table_scan(&f.factory, "s", &[(DataType::Int, true)]);
    let (a, b) = (t.columns()[0], s.columns()[0]);
    let expr = LogicalExprBuilder::get(t)
        .join(
            JoinType::LeftOuter,
            LogicalExprBuilder::get(s).build(),
            f.cmp(CmpType::Eq, Expr::ident(a), Expr::ident(b)),
        )
        .select(Expr::is_null(Expr::ident(b)))
        .build();
    let result = Preprocessor::new().preprocess(&expr, &f.ctx()).unwrap();
    assert!(has_outer_join(&result));
}

#[test]
fn test_unnesting_is_idempotent() {
    let f = Fixture::new();
    let t = table_scan(&f.factory, "t", &[(DataType::Int, true), (DataType::Int, true)]);
    let (a, b) = (t.columns()[0], t.columns()[1]);
    let a_gt = f.cmp(CmpType::G, Expr::ident(a), Expr::int_const(1));
    let b_lt = f.cmp(CmpType::L, Expr::ident(b), Expr::int_const(2));
    let pred = Expr::not(conjunction([
        conjunction([a_gt.clone(), b_lt.clone()]),
        disjunction([a_gt, b_lt]),
    ]));
    let expr = LogicalExprBuilder::get(t).select(pred).build();

    let ctx = f.ctx();
    let once = UnnestBoolOps.apply(&expr, &ctx).unwrap();
    let twice = UnnestBoolOps.apply(&once, &ctx).unwrap();
    assert_eq!(once, twice);
    assert_ne!(expr, once);
}

#[test]
fn test_constant_reaches_both_join_sides() {
    let f = Fixture::new();
    let t = table_scan(&f.factory, "t", &[(DataType::Int, false)]);
    let s = table_scan(&f.factory, "s", &[(DataType::Int, false)]);
    let (a, b) = (t.columns()[0], s.columns()[0]);
    let expr = LogicalExprBuilder::get(t)
        .join(
            JoinType::Inner,
            LogicalExprBuilder::get(s).build(),
            f.cmp(CmpType::Eq, Expr::ident(a), Expr::ident(b)),
        )
        .select(f.cmp(CmpType::Eq, Expr::ident(a), Expr::int_const(5)))
        .build();

    let result = Preprocessor::new().preprocess(&expr, &f.ctx()).unwrap();
    let inferred = f.cmp(CmpType::Eq, Expr::ident(b), Expr::int_const(5));
    assert!(any_node(&result, &|e| *e == inferred));
}

#[test]
fn test_required_columns_prune_projection() {
    let f = Fixture::new();
    let t = table_scan(&f.factory, "t", &[(DataType::Int, true)]);
    let a = t.columns()[0];
    let x = f.factory.computed_column(DataType::Int);
    let y = f.factory.computed_column(DataType::Int);
    let expr = LogicalExprBuilder::get(t)
        .project(vec![(x, Expr::ident(a)), (y, Expr::int_const(3))])
        .build();

    let required: ColumnSet = [x].into_iter().collect();
    let ctx = f.ctx().with_required_columns(required);
    let result = Preprocessor::new().preprocess(&expr, &ctx).unwrap();
    assert_eq!(Some(&LogicalOperator::LogicalProject), result.logical_op());
    let output = result.relational_props().output_columns().clone();
    assert!(output.contains(&x));
    assert!(!output.contains(&y));
}
