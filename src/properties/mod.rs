//! Properties derived from expressions.
//!
//! Both kinds are computed bottom-up on first access and cached in the node, see
//! [`Expr::relational_props`](crate::expr::Expr::relational_props).

mod constraint;
pub use constraint::*;
mod logical;
pub use logical::*;
mod scalar;
pub use scalar::*;
