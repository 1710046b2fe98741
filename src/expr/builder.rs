use crate::datum::DataType;
use crate::expr::{Expr, ExprRef};
use crate::operator::{
    Aggregate, ColumnFactory, ColumnRef, ConstTable, CteConsumer, CteId, Insert, Join, JoinType,
    Limit, LogicalOperator, OrderKey, SequenceProject, SetOp, TableScan,
};

/// Creates a table scan with fresh columns of the given types and nullability.
pub fn table_scan<S: Into<String>>(
    factory: &ColumnFactory,
    table_name: S,
    columns: &[(DataType, bool)],
) -> TableScan {
    let source = factory.new_source();
    let columns = columns
        .iter()
        .map(|(data_type, nullable)| factory.table_column(source, *data_type, *nullable))
        .collect();
    TableScan::new(table_name, source, columns)
}

/// Builds a relational expression bottom-up, one operator at a time.
///
/// ```ignore
/// let expr = LogicalExprBuilder::get(scan)
///     .select(predicate)
///     .limit(vec![], 0, Some(10))
///     .build();
/// ```
pub struct LogicalExprBuilder {
    root: ExprRef,
}

impl LogicalExprBuilder {
    pub fn from_expr(root: ExprRef) -> Self {
        Self { root }
    }

    pub fn get(scan: TableScan) -> Self {
        Self::from_expr(Expr::leaf(LogicalOperator::LogicalGet(scan)))
    }

    pub fn const_table(table: ConstTable) -> Self {
        Self::from_expr(Expr::leaf(LogicalOperator::LogicalConstTableGet(table)))
    }

    pub fn cte_consumer(id: CteId, columns: Vec<ColumnRef>) -> Self {
        Self::from_expr(Expr::leaf(LogicalOperator::LogicalCteConsumer(
            CteConsumer::new(id, columns),
        )))
    }

    fn reset_root(mut self, operator: LogicalOperator, others: Vec<ExprRef>) -> Self {
        let mut children = vec![self.root];
        children.extend(others);
        self.root = Expr::new(operator, children);
        self
    }

    pub fn select(self, predicate: ExprRef) -> Self {
        self.reset_root(LogicalOperator::LogicalSelect, vec![predicate])
    }

    pub fn project(self, elements: Vec<(ColumnRef, ExprRef)>) -> Self {
        let project_list = project_list_of(elements);
        self.reset_root(LogicalOperator::LogicalProject, vec![project_list])
    }

    pub fn gb_agg(self, grouping_columns: Vec<ColumnRef>, aggs: Vec<(ColumnRef, ExprRef)>) -> Self {
        let project_list = project_list_of(aggs);
        self.reset_root(
            LogicalOperator::LogicalGbAgg(Aggregate::new(grouping_columns)),
            vec![project_list],
        )
    }

    pub fn limit(self, order: Vec<OrderKey>, offset: i64, count: Option<i64>) -> Self {
        let limit = Limit::new(order, count.is_some());
        self.limit_with(limit, offset, count)
    }

    pub fn limit_with(self, limit: Limit, offset: i64, count: Option<i64>) -> Self {
        let count = match count {
            Some(c) => Expr::int_const(c),
            None => Expr::null_const(DataType::Int),
        };
        self.reset_root(
            LogicalOperator::LogicalLimit(limit),
            vec![Expr::int_const(offset), count],
        )
    }

    pub fn join(self, join_type: JoinType, inner: ExprRef, predicate: ExprRef) -> Self {
        self.reset_root(
            LogicalOperator::LogicalJoin(Join::new(join_type)),
            vec![inner, predicate],
        )
    }

    pub fn window(self, window: SequenceProject, functions: Vec<(ColumnRef, ExprRef)>) -> Self {
        let project_list = project_list_of(functions);
        self.reset_root(
            LogicalOperator::LogicalSequenceProject(window),
            vec![project_list],
        )
    }

    pub fn union_all(self, others: Vec<ExprRef>, set_op: SetOp) -> Self {
        self.reset_root(LogicalOperator::LogicalUnionAll(set_op), others)
    }

    pub fn union(self, others: Vec<ExprRef>, set_op: SetOp) -> Self {
        self.reset_root(LogicalOperator::LogicalUnion(set_op), others)
    }

    pub fn cte_anchor(self, id: CteId) -> Self {
        self.reset_root(LogicalOperator::LogicalCteAnchor(id), vec![])
    }

    pub fn insert(self, insert: Insert) -> Self {
        self.reset_root(LogicalOperator::LogicalInsert(insert), vec![])
    }

    pub fn build(self) -> ExprRef {
        self.root
    }
}

pub fn project_list_of(elements: Vec<(ColumnRef, ExprRef)>) -> ExprRef {
    Expr::project_list(
        elements
            .into_iter()
            .map(|(column, value)| Expr::project_element(column, value)),
    )
}

/// `n`-ary inner join over `inputs` with a single conjunctive predicate.
pub fn nary_join(inputs: Vec<ExprRef>, predicate: ExprRef) -> ExprRef {
    let mut children = inputs;
    children.push(predicate);
    Expr::new(LogicalOperator::LogicalNAryJoin, children)
}

/// Wraps `input` in a Select unless the predicate is constant true.
pub fn safe_select(input: ExprRef, predicate: ExprRef) -> ExprRef {
    if crate::expr::is_const_true(&predicate) {
        input
    } else {
        Expr::new(LogicalOperator::LogicalSelect, [input, predicate])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{CmpType, Comparison, OperatorId};

    #[test]
    fn test_build_chain() {
        let factory = ColumnFactory::new();
        let scan = table_scan(&factory, "t", &[(DataType::Int, false)]);
        let a = scan.columns()[0];
        let eq = Comparison::new(OperatorId::from(1), CmpType::Eq);
        let expr = LogicalExprBuilder::get(scan)
            .select(Expr::cmp(eq, Expr::ident(a), Expr::int_const(1)))
            .limit(vec![], 0, Some(10))
            .build();
        assert_eq!(
            Some(&LogicalOperator::LogicalSelect),
            expr.child(0).logical_op()
        );
        assert_eq!(3, expr.arity());
    }

    #[test]
    fn test_safe_select_skips_true() {
        let factory = ColumnFactory::new();
        let get = LogicalExprBuilder::get(table_scan(&factory, "t", &[(DataType::Int, true)])).build();
        let same = safe_select(get.clone(), Expr::bool_const(true));
        assert!(std::rc::Rc::ptr_eq(&get, &same));
    }
}
