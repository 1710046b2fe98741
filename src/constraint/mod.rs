//! Interval constraints on column values.
//!
//! A [`ColumnConstraint`] describes the values one column can take as a union of ranges plus
//! a NULL flag. Constraints are derived from predicates, combined with set operations and turned
//! back into predicates, which is how the preprocessor infers new filters.

use std::collections::BTreeMap;

use crate::expr::{conjuncts, ExprRef};
use crate::operator::ColumnRef;

mod interval;
pub use interval::*;
mod range;
pub use range::Range;

/// Per-column constraints implied by the conjuncts of `predicate`.
pub fn constraints_from_predicate(predicate: &ExprRef) -> BTreeMap<ColumnRef, ColumnConstraint> {
    let mut result: BTreeMap<ColumnRef, ColumnConstraint> = BTreeMap::new();
    for conjunct in conjuncts(predicate) {
        if let Some(constraint) = ColumnConstraint::from_scalar_expr(&conjunct) {
            let merged = match result.get(&constraint.column()) {
                Some(existing) => existing.intersect(&constraint),
                None => constraint,
            };
            result.insert(merged.column(), merged);
        }
    }
    result
}
