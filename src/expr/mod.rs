//! The logical expression tree.
//!
//! Nodes are immutable and shared through [`ExprRef`]. A rewrite never touches a published node:
//! it either hands back the same `Rc` or builds a new node over (possibly shared) children.
//! Derived properties are computed lazily on first access and cached in the node.

use std::cell::OnceCell;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::datum::{DataType, Datum};
use crate::operator::{
    ArrayCmpKind, ArrayComparison, BoolOp, ColumnRef, Comparison, LogicalOperator, Operator,
    ScalarOperator,
};
use crate::properties::{RelationalProperties, ScalarProperties};

mod builder;
pub use builder::*;
mod predicates;
pub use predicates::*;

pub type ExprRef = Rc<Expr>;
pub type ExprVec = SmallVec<[ExprRef; 4]>;

/// One node of the expression tree.
pub struct Expr {
    operator: Operator,
    children: ExprVec,
    relational_props: OnceCell<Rc<RelationalProperties>>,
    scalar_props: OnceCell<Rc<ScalarProperties>>,
}

/// Equality is structural and ignores cached properties.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(a, b)| Rc::ptr_eq(a, b) || a == b)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.operator.hash(state);
        for child in &self.children {
            child.hash(state);
        }
    }
}

impl Expr {
    pub fn new<O, I>(operator: O, children: I) -> ExprRef
    where
        O: Into<Operator>,
        I: IntoIterator<Item = ExprRef>,
    {
        Rc::new(Self {
            operator: operator.into(),
            children: children.into_iter().collect(),
            relational_props: OnceCell::new(),
            scalar_props: OnceCell::new(),
        })
    }

    pub fn leaf<O: Into<Operator>>(operator: O) -> ExprRef {
        Self::new(operator, std::iter::empty())
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn children(&self) -> &[ExprRef] {
        &self.children
    }

    pub fn child(&self, idx: usize) -> &ExprRef {
        &self.children[idx]
    }

    pub fn arity(&self) -> usize {
        self.children.len()
    }

    pub fn is_logical(&self) -> bool {
        self.operator.is_logical()
    }

    pub fn is_scalar(&self) -> bool {
        self.operator.is_scalar()
    }

    pub fn logical_op(&self) -> Option<&LogicalOperator> {
        self.operator.as_logical()
    }

    pub fn scalar_op(&self) -> Option<&ScalarOperator> {
        self.operator.as_scalar()
    }

    /// A node with the same operator over new children.
    pub fn with_children<I>(&self, children: I) -> ExprRef
    where
        I: IntoIterator<Item = ExprRef>,
    {
        Self::new(self.operator.clone(), children)
    }

    /// Relational children, i.e. all children of a logical operator that are logical too.
    pub fn relational_children(&self) -> impl Iterator<Item = &ExprRef> {
        self.children.iter().filter(|c| c.is_logical())
    }

    pub fn relational_props(&self) -> Rc<RelationalProperties> {
        self.relational_props
            .get_or_init(|| Rc::new(RelationalProperties::derive(self)))
            .clone()
    }

    pub fn scalar_props(&self) -> Rc<ScalarProperties> {
        self.scalar_props
            .get_or_init(|| Rc::new(ScalarProperties::derive(self)))
            .clone()
    }

    /// Number of nodes in the tree, counting shared subtrees once per reference.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    // Scalar constructors.

    pub fn ident(column: ColumnRef) -> ExprRef {
        Self::leaf(ScalarOperator::ScalarIdent(column))
    }

    pub fn constant(datum: Datum) -> ExprRef {
        Self::leaf(ScalarOperator::ScalarConst(datum))
    }

    pub fn bool_const(value: bool) -> ExprRef {
        Self::constant(Datum::Bool(value))
    }

    pub fn int_const(value: i64) -> ExprRef {
        Self::constant(Datum::Int(value))
    }

    pub fn null_const(data_type: DataType) -> ExprRef {
        Self::constant(Datum::Null(data_type))
    }

    pub fn cmp(comparison: Comparison, left: ExprRef, right: ExprRef) -> ExprRef {
        Self::new(ScalarOperator::ScalarCmp(comparison), [left, right])
    }

    pub fn is_distinct_from(comparison: Comparison, left: ExprRef, right: ExprRef) -> ExprRef {
        Self::new(ScalarOperator::ScalarIsDistinctFrom(comparison), [left, right])
    }

    pub fn not(child: ExprRef) -> ExprRef {
        Self::new(ScalarOperator::ScalarBoolOp(BoolOp::Not), [child])
    }

    pub fn is_null(child: ExprRef) -> ExprRef {
        Self::new(ScalarOperator::ScalarNullTest, [child])
    }

    pub fn is_not_null(child: ExprRef) -> ExprRef {
        Self::not(Self::is_null(child))
    }

    pub fn project_element(column: ColumnRef, value: ExprRef) -> ExprRef {
        Self::new(ScalarOperator::ScalarProjectElement(column), [value])
    }

    pub fn project_list<I: IntoIterator<Item = ExprRef>>(elements: I) -> ExprRef {
        Self::new(ScalarOperator::ScalarProjectList, elements)
    }

    pub fn array_cmp(
        comparison: Comparison,
        kind: ArrayCmpKind,
        scalar: ExprRef,
        element_type: DataType,
        elements: Vec<ExprRef>,
    ) -> ExprRef {
        let array = Self::new(ScalarOperator::ScalarArray(element_type), elements);
        Self::new(
            ScalarOperator::ScalarArrayCmp(ArrayComparison::new(comparison, kind)),
            [scalar, array],
        )
    }

    fn fmt_operator(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.operator {
            Operator::Logical(op) => match op {
                LogicalOperator::LogicalGet(scan) => write!(
                    f,
                    "Get({}) [{}]",
                    scan.table_name(),
                    format_columns(scan.columns())
                ),
                LogicalOperator::LogicalGbAgg(agg) => {
                    write!(f, "GbAgg [{}]", format_columns(agg.grouping_columns()))
                }
                LogicalOperator::LogicalJoin(join) => write!(f, "Join({})", join.join_type()),
                LogicalOperator::LogicalUnion(set_op) | LogicalOperator::LogicalUnionAll(set_op) => {
                    write!(f, "{} [{}]", op.name(), format_columns(set_op.output_columns()))
                }
                LogicalOperator::LogicalCteAnchor(id) => write!(f, "CteAnchor({})", id),
                LogicalOperator::LogicalCteConsumer(consumer) => {
                    write!(f, "CteConsumer({})", consumer.id())
                }
                LogicalOperator::LogicalConstTableGet(table) => write!(
                    f,
                    "ConstTableGet({} rows) [{}]",
                    table.rows().len(),
                    format_columns(table.columns())
                ),
                other => write!(f, "{}", other.name()),
            },
            Operator::Scalar(op) => match op {
                ScalarOperator::ScalarIdent(col) => write!(f, "Ident({})", col.id()),
                ScalarOperator::ScalarConst(datum) => write!(f, "Const({})", datum),
                ScalarOperator::ScalarCmp(cmp) => write!(f, "Cmp({})", cmp.cmp_type()),
                ScalarOperator::ScalarBoolOp(bool_op) => write!(f, "{}", bool_op),
                ScalarOperator::ScalarFunc(func) => write!(f, "Func({})", func.name()),
                ScalarOperator::ScalarAggFunc(agg) => write!(f, "AggFunc({})", agg.name()),
                ScalarOperator::ScalarProjectElement(col) => {
                    write!(f, "ProjectElement({})", col.id())
                }
                ScalarOperator::ScalarSubquery(subquery) => {
                    write!(f, "Subquery({})", subquery.column().id())
                }
                other => write!(f, "{}", other.name()),
            },
        }
    }

    fn fmt_tree(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        write!(f, "{:indent$}", "", indent = depth * 2)?;
        self.fmt_operator(f)?;
        writeln!(f)?;
        for child in &self.children {
            child.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

fn format_columns(columns: &[ColumnRef]) -> String {
    columns
        .iter()
        .map(|c| c.id().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.fmt_tree(f, 0)
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expr")
            .field("operator", &self.operator)
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::operator::{ColumnFactory, CmpType, OperatorId};

    #[test]
    fn test_structural_equality_ignores_sharing() {
        let factory = ColumnFactory::new();
        let col = factory.computed_column(DataType::Int);
        let eq = Comparison::new(OperatorId::from(1), CmpType::Eq);
        let a = Expr::cmp(eq, Expr::ident(col), Expr::int_const(1));
        let b = Expr::cmp(eq, Expr::ident(col), Expr::int_const(1));
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_ne!(a, Expr::cmp(eq, Expr::ident(col), Expr::int_const(2)));
    }

    #[test]
    fn test_display_tree() {
        let factory = ColumnFactory::new();
        let col = factory.computed_column(DataType::Int);
        let expr = Expr::is_not_null(Expr::ident(col));
        assert_eq!("Not\n  NullTest\n    Ident(c0)\n", expr.to_string());
    }
}
