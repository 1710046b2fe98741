//! Operators of the logical expression tree.
//!
//! Operators are closed enums: relational operators in [`LogicalOperator`], scalar operators in
//! [`ScalarOperator`]. Payload structs carry the operator's parameters; the operator's inputs
//! are the children of the [`Expr`](crate::expr::Expr) node holding it.

use enum_as_inner::EnumAsInner;

mod aggregate;
pub use aggregate::*;
mod column;
pub use column::*;
mod cte;
pub use cte::*;
mod dml;
pub use dml::*;
mod join;
pub use join::*;
mod limit;
pub use limit::*;
mod logical;
pub use logical::*;
mod scalar;
pub use scalar::*;
mod set_op;
pub use set_op::*;
mod table_scan;
pub use table_scan::*;
mod window;
pub use window::*;

#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum Operator {
    Logical(LogicalOperator),
    Scalar(ScalarOperator),
}

impl Operator {
    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::Logical(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Operator::Scalar(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Logical(op) => op.name(),
            Operator::Scalar(op) => op.name(),
        }
    }
}

impl From<LogicalOperator> for Operator {
    fn from(op: LogicalOperator) -> Self {
        Operator::Logical(op)
    }
}

impl From<ScalarOperator> for Operator {
    fn from(op: ScalarOperator) -> Self {
        Operator::Scalar(op)
    }
}
