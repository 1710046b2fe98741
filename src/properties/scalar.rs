use crate::expr::Expr;
use crate::operator::{ColumnSet, ScalarOperator};

/// Properties of a scalar expression.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalarProperties {
    /// Columns read by the expression, including outer references of nested subqueries.
    used_columns: ColumnSet,
    /// Columns defined by project elements.
    defined_columns: ColumnSet,
    /// Defined columns whose value comes from a set-returning function.
    set_returning_columns: ColumnSet,
    has_subquery: bool,
    has_volatile_function: bool,
    has_set_returning_function: bool,
    has_window_function: bool,
}

impl ScalarProperties {
    pub fn derive(expr: &Expr) -> Self {
        let mut props = Self::default();
        let op = match expr.scalar_op() {
            Some(op) => op,
            None => return props,
        };

        for child in expr.children() {
            if child.is_logical() {
                props
                    .used_columns
                    .extend(child.relational_props().outer_references().iter().copied());
                continue;
            }
            let child_props = child.scalar_props();
            props.used_columns.extend(child_props.used_columns.iter().copied());
            props
                .defined_columns
                .extend(child_props.defined_columns.iter().copied());
            props
                .set_returning_columns
                .extend(child_props.set_returning_columns.iter().copied());
            props.has_subquery |= child_props.has_subquery;
            props.has_volatile_function |= child_props.has_volatile_function;
            props.has_set_returning_function |= child_props.has_set_returning_function;
            props.has_window_function |= child_props.has_window_function;
        }

        match op {
            ScalarOperator::ScalarIdent(column) => {
                props.used_columns.insert(*column);
            }
            ScalarOperator::ScalarProjectElement(column) => {
                props.defined_columns.insert(*column);
                if props.has_set_returning_function {
                    props.set_returning_columns.insert(*column);
                }
            }
            ScalarOperator::ScalarFunc(func) => {
                props.has_volatile_function |= func.is_volatile();
                props.has_set_returning_function |= func.returns_set();
            }
            ScalarOperator::ScalarWindowFunc(_) => props.has_window_function = true,
            op if op.is_subquery() => props.has_subquery = true,
            _ => {}
        }
        props
    }

    pub fn used_columns(&self) -> &ColumnSet {
        &self.used_columns
    }

    pub fn defined_columns(&self) -> &ColumnSet {
        &self.defined_columns
    }

    pub fn set_returning_columns(&self) -> &ColumnSet {
        &self.set_returning_columns
    }

    pub fn has_subquery(&self) -> bool {
        self.has_subquery
    }

    pub fn has_volatile_function(&self) -> bool {
        self.has_volatile_function
    }

    pub fn has_set_returning_function(&self) -> bool {
        self.has_set_returning_function
    }

    pub fn has_window_function(&self) -> bool {
        self.has_window_function
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DataType;
    use crate::expr::{table_scan, LogicalExprBuilder};
    use crate::operator::{CmpType, ColumnFactory, Comparison, Function, OperatorId, Subquery};

    #[test]
    fn test_project_list_props() {
        let factory = ColumnFactory::new();
        let a = factory.computed_column(DataType::Int);
        let b = factory.computed_column(DataType::Int);
        let c = factory.computed_column(DataType::Int);
        let srf = Expr::new(
            ScalarOperator::ScalarFunc(Function::new("generate_series", DataType::Int).set_returning()),
            [Expr::ident(a)],
        );
        let list = Expr::project_list([
            Expr::project_element(b, srf),
            Expr::project_element(c, Expr::ident(a)),
        ]);
        let props = list.scalar_props();
        assert_eq!(&[a].into_iter().collect::<ColumnSet>(), props.used_columns());
        assert_eq!(&[b, c].into_iter().collect::<ColumnSet>(), props.defined_columns());
        assert_eq!(&[b].into_iter().collect::<ColumnSet>(), props.set_returning_columns());
        assert!(!props.has_subquery());
    }

    #[test]
    fn test_subquery_uses_outer_references() {
        let factory = ColumnFactory::new();
        let outer = factory.computed_column(DataType::Int);
        let scan = table_scan(&factory, "s", &[(DataType::Int, true)]);
        let inner_col = scan.columns()[0];
        let eq = Comparison::new(OperatorId::from(1), CmpType::Eq);
        let inner = LogicalExprBuilder::get(scan)
            .select(Expr::cmp(eq, Expr::ident(inner_col), Expr::ident(outer)))
            .build();
        let subquery = Expr::new(
            ScalarOperator::ScalarSubquery(Subquery::new(inner_col)),
            [inner],
        );
        let props = subquery.scalar_props();
        assert!(props.has_subquery());
        assert_eq!(&[outer].into_iter().collect::<ColumnSet>(), props.used_columns());
    }
}
