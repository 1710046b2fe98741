use std::cmp::Ordering;
use std::ops::Bound;

use itertools::Itertools;

use crate::constraint::range::{cmp_lower, cmp_upper, meets};
use crate::constraint::Range;
use crate::datum::Datum;
use crate::error::OptResult;
use crate::expr::{const_datum, disjunction, ident_column, Expr, ExprRef};
use crate::metadata::MetadataAccessor;
use crate::operator::{ArrayCmpKind, BoolOp, CmpType, ColumnRef, Comparison, ScalarOperator};

/// The set of values a single column may take: a union of disjoint ranges plus, optionally,
/// NULL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnConstraint {
    column: ColumnRef,
    /// Sorted by lower bound, pairwise disjoint and non-adjacent.
    ranges: Vec<Range>,
    includes_null: bool,
}

impl ColumnConstraint {
    pub fn new(column: ColumnRef, ranges: Vec<Range>, includes_null: bool) -> Self {
        Self {
            column,
            ranges: normalize(ranges),
            includes_null,
        }
    }

    pub fn unbounded(column: ColumnRef, includes_null: bool) -> Self {
        Self::new(column, vec![Range::unbounded()], includes_null)
    }

    pub fn contradiction(column: ColumnRef) -> Self {
        Self::new(column, vec![], false)
    }

    pub fn column(&self) -> ColumnRef {
        self.column
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn includes_null(&self) -> bool {
        self.includes_null
    }

    pub fn is_contradiction(&self) -> bool {
        self.ranges.is_empty() && !self.includes_null
    }

    /// Allows every value including NULL, i.e. carries no information.
    pub fn is_unbounded(&self) -> bool {
        self.includes_null && self.ranges.len() == 1 && self.ranges[0].is_unbounded()
    }

    /// The same constraint on another column.
    pub fn with_column(&self, column: ColumnRef) -> Self {
        Self {
            column,
            ..self.clone()
        }
    }

    pub fn intersect(&self, other: &ColumnConstraint) -> ColumnConstraint {
        let ranges = self
            .ranges
            .iter()
            .cartesian_product(other.ranges.iter())
            .filter_map(|(a, b)| a.intersect(b))
            .collect();
        Self::new(
            self.column,
            ranges,
            self.includes_null && other.includes_null,
        )
    }

    pub fn union(&self, other: &ColumnConstraint) -> ColumnConstraint {
        let ranges = self
            .ranges
            .iter()
            .chain(other.ranges.iter())
            .cloned()
            .collect();
        Self::new(
            self.column,
            ranges,
            self.includes_null || other.includes_null,
        )
    }

    /// Every value, NULL included, that this constraint does not allow.
    pub fn complement(&self) -> ColumnConstraint {
        let mut ranges = Vec::with_capacity(self.ranges.len() + 1);
        let mut lower = Bound::Unbounded;
        let mut open_end = true;
        for range in &self.ranges {
            let upper = match range.lower() {
                Bound::Unbounded => None,
                Bound::Included(d) => Some(Bound::Excluded(d.clone())),
                Bound::Excluded(d) => Some(Bound::Included(d.clone())),
            };
            if let Some(upper) = upper {
                ranges.push(Range::new(lower.clone(), upper));
            }
            match range.upper() {
                Bound::Unbounded => {
                    open_end = false;
                    break;
                }
                Bound::Included(d) => lower = Bound::Excluded(d.clone()),
                Bound::Excluded(d) => lower = Bound::Included(d.clone()),
            }
        }
        if open_end {
            ranges.push(Range::new(lower, Bound::Unbounded));
        }
        Self::new(self.column, ranges, !self.includes_null)
    }

    /// Values allowed by this constraint but not by `other`.
    pub fn difference(&self, other: &ColumnConstraint) -> ColumnConstraint {
        self.intersect(&other.complement())
    }

    /// Allows exactly a finite list of two or more values.
    pub fn converts_to_in(&self) -> bool {
        self.ranges.len() > 1 && self.ranges.iter().all(Range::is_point)
    }

    /// Allows everything but a finite list of values: `(-inf, a), (a, b), ..., (z, inf)`.
    pub fn converts_to_not_in(&self) -> bool {
        if self.ranges.len() <= 1 {
            return false;
        }
        let first_open = matches!(self.ranges[0].lower(), Bound::Unbounded);
        let last_open = matches!(
            self.ranges[self.ranges.len() - 1].upper(),
            Bound::Unbounded
        );
        first_open
            && last_open
            && self.ranges.iter().tuple_windows().all(|(a, b)| {
                matches!((a.upper(), b.lower()), (Bound::Excluded(u), Bound::Excluded(l)) if u == l)
            })
    }

    /// Builds the constraint a predicate places on its single column.
    ///
    /// Returns `None` when the predicate references more or less than one column or has a shape
    /// that cannot be represented by ranges.
    pub fn from_scalar_expr(expr: &ExprRef) -> Option<ColumnConstraint> {
        let used = expr.scalar_props().used_columns().clone();
        if used.len() != 1 {
            return None;
        }
        let column = used.into_iter().next()?;
        if !column.data_type().is_constrainable() {
            return None;
        }
        interval_from_expr(expr, column)
    }

    /// The predicate equivalent to this constraint.
    ///
    /// With `array_in` set, lists of points become `IN`/`NOT IN` array comparisons.
    pub fn to_scalar_expr(
        &self,
        metadata: &dyn MetadataAccessor,
        array_in: bool,
    ) -> OptResult<ExprRef> {
        if self.is_contradiction() {
            return Ok(Expr::bool_const(false));
        }
        if array_in {
            if self.converts_to_in() {
                return self.array_scalar(metadata, CmpType::Eq, ArrayCmpKind::Any);
            }
            if self.converts_to_not_in() {
                return self.array_scalar(metadata, CmpType::NEq, ArrayCmpKind::All);
            }
        }
        if self.ranges.len() == 1 && self.ranges[0].is_unbounded() {
            return Ok(if self.includes_null {
                Expr::bool_const(true)
            } else {
                Expr::is_not_null(Expr::ident(self.column))
            });
        }
        let mut disjuncts = self
            .ranges
            .iter()
            .map(|r| r.to_scalar_expr(self.column, metadata))
            .collect::<OptResult<Vec<_>>>()?;
        if self.includes_null {
            disjuncts.push(Expr::is_null(Expr::ident(self.column)));
        }
        Ok(disjunction(disjuncts))
    }

    fn array_scalar(
        &self,
        metadata: &dyn MetadataAccessor,
        cmp_type: CmpType,
        kind: ArrayCmpKind,
    ) -> OptResult<ExprRef> {
        let values: Vec<Datum> = match kind {
            ArrayCmpKind::Any => self
                .ranges
                .iter()
                .filter_map(|r| r.point_value().cloned())
                .collect(),
            ArrayCmpKind::All => self.ranges[..self.ranges.len() - 1]
                .iter()
                .filter_map(|r| match r.upper() {
                    Bound::Excluded(d) => Some(d.clone()),
                    _ => None,
                })
                .collect(),
        };
        let mut elements = values.into_iter().map(Expr::constant).collect_vec();
        if self.includes_null {
            elements.push(Expr::null_const(self.column.data_type()));
        }
        Ok(Expr::array_cmp(
            metadata.comparison(cmp_type)?,
            kind,
            Expr::ident(self.column),
            self.column.data_type(),
            elements,
        ))
    }
}

fn normalize(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.retain(|r| !r.is_empty());
    ranges.sort_by(|a, b| cmp_lower(a.lower(), b.lower()));
    let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if meets(last.upper(), range.lower()) => {
                if cmp_upper(range.upper(), last.upper()) == Ordering::Greater {
                    *last = Range::new(last.lower().clone(), range.upper().clone());
                }
            }
            _ => merged.push(range),
        }
    }
    merged
}

fn ranges_for_comparison(cmp_type: CmpType, datum: &Datum) -> Option<Vec<Range>> {
    if datum.is_null() {
        // Comparing with NULL is never true.
        return Some(vec![]);
    }
    let d = || datum.clone();
    let ranges = match cmp_type {
        CmpType::Eq => vec![Range::point(d())],
        CmpType::NEq => vec![
            Range::new(Bound::Unbounded, Bound::Excluded(d())),
            Range::new(Bound::Excluded(d()), Bound::Unbounded),
        ],
        CmpType::L => vec![Range::new(Bound::Unbounded, Bound::Excluded(d()))],
        CmpType::LEq => vec![Range::new(Bound::Unbounded, Bound::Included(d()))],
        CmpType::G => vec![Range::new(Bound::Excluded(d()), Bound::Unbounded)],
        CmpType::GEq => vec![Range::new(Bound::Included(d()), Bound::Unbounded)],
        _ => return None,
    };
    Some(ranges)
}

fn comparable(column: ColumnRef, datum: &Datum) -> bool {
    datum.is_null() || column.data_type().stats_comparable_with(datum)
}

fn from_comparison(
    column: ColumnRef,
    comparison: &Comparison,
    left: &Expr,
    right: &Expr,
) -> Option<ColumnConstraint> {
    let (cmp_type, datum) = match (ident_column(left), const_datum(right)) {
        (Some(col), Some(datum)) if col == column => (comparison.cmp_type(), datum),
        _ => match (const_datum(left), ident_column(right)) {
            (Some(datum), Some(col)) if col == column => (comparison.cmp_type().commuted(), datum),
            _ => return None,
        },
    };
    if !comparable(column, datum) {
        return None;
    }
    let ranges = ranges_for_comparison(cmp_type, datum)?;
    Some(ColumnConstraint::new(column, ranges, false))
}

fn interval_from_expr(expr: &Expr, column: ColumnRef) -> Option<ColumnConstraint> {
    match expr.scalar_op()? {
        ScalarOperator::ScalarConst(Datum::Bool(true)) => {
            Some(ColumnConstraint::unbounded(column, true))
        }
        ScalarOperator::ScalarConst(_) => Some(ColumnConstraint::contradiction(column)),
        ScalarOperator::ScalarNullTest => {
            (ident_column(expr.child(0)) == Some(column))
                .then(|| ColumnConstraint::new(column, vec![], true))
        }
        ScalarOperator::ScalarCmp(cmp) => from_comparison(column, cmp, expr.child(0), expr.child(1)),
        ScalarOperator::ScalarBoolOp(BoolOp::Not) => {
            interval_from_expr(expr.child(0), column).map(|c| c.complement())
        }
        ScalarOperator::ScalarBoolOp(BoolOp::Or) => {
            let mut children = expr.children().iter();
            let mut result = interval_from_expr(children.next()?, column)?;
            for child in children {
                result = result.union(&interval_from_expr(child, column)?);
            }
            Some(result)
        }
        ScalarOperator::ScalarBoolOp(BoolOp::And) => expr
            .children()
            .iter()
            .filter_map(|child| interval_from_expr(child, column))
            .reduce(|acc, c| acc.intersect(&c)),
        ScalarOperator::ScalarArrayCmp(array_cmp) => {
            if ident_column(expr.child(0)) != Some(column) {
                return None;
            }
            let mut per_element = Vec::with_capacity(expr.child(1).arity());
            for element in expr.child(1).children() {
                let datum = const_datum(element)?;
                if !comparable(column, datum) {
                    return None;
                }
                let ranges = ranges_for_comparison(array_cmp.comparison().cmp_type(), datum)?;
                per_element.push(ColumnConstraint::new(column, ranges, false));
            }
            let combined = match array_cmp.kind() {
                ArrayCmpKind::Any => per_element.into_iter().reduce(|acc, c| acc.union(&c)),
                ArrayCmpKind::All => per_element.into_iter().reduce(|acc, c| acc.intersect(&c)),
            };
            Some(combined.unwrap_or_else(|| match array_cmp.kind() {
                // ANY over an empty array is false, ALL is true.
                ArrayCmpKind::Any => ColumnConstraint::contradiction(column),
                ArrayCmpKind::All => ColumnConstraint::unbounded(column, true),
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DataType;
    use crate::expr::conjunction;
    use crate::metadata::InMemoryMetadata;
    use crate::operator::ColumnFactory;

    fn setup() -> (InMemoryMetadata, ColumnRef) {
        let factory = ColumnFactory::new();
        let source = factory.new_source();
        (
            InMemoryMetadata::standard(),
            factory.table_column(source, DataType::Int, true),
        )
    }

    fn cmp(md: &InMemoryMetadata, cmp_type: CmpType, col: ColumnRef, v: i64) -> ExprRef {
        Expr::cmp(
            md.comparison(cmp_type).unwrap(),
            Expr::ident(col),
            Expr::int_const(v),
        )
    }

    #[test]
    fn test_disjunction_of_equalities_becomes_in() {
        let (md, x) = setup();
        let pred = disjunction(vec![
            cmp(&md, CmpType::Eq, x, 3),
            cmp(&md, CmpType::Eq, x, 1),
            cmp(&md, CmpType::Eq, x, 2),
            cmp(&md, CmpType::Eq, x, 1),
        ]);
        let constraint = ColumnConstraint::from_scalar_expr(&pred).unwrap();
        assert_eq!(3, constraint.ranges().len());
        assert!(constraint.converts_to_in());

        let expr = constraint.to_scalar_expr(&md, true).unwrap();
        let array_cmp = expr.scalar_op().unwrap().as_scalar_array_cmp().unwrap();
        assert_eq!(ArrayCmpKind::Any, array_cmp.kind());
        let values = expr
            .child(1)
            .children()
            .iter()
            .map(|e| const_datum(e).unwrap().clone())
            .collect_vec();
        assert_eq!(vec![Datum::Int(1), Datum::Int(2), Datum::Int(3)], values);

        let plain = constraint.to_scalar_expr(&md, false).unwrap();
        assert_eq!(3, plain.arity());
    }

    #[test]
    fn test_conjunction_intersects() {
        let (md, x) = setup();
        let pred = conjunction(vec![cmp(&md, CmpType::G, x, 1), cmp(&md, CmpType::LEq, x, 5)]);
        let constraint = ColumnConstraint::from_scalar_expr(&pred).unwrap();
        assert_eq!(
            vec![Range::new(
                Bound::Excluded(Datum::Int(1)),
                Bound::Included(Datum::Int(5))
            )],
            constraint.ranges()
        );
        assert!(!constraint.includes_null());

        let contradiction = conjunction(vec![cmp(&md, CmpType::G, x, 5), cmp(&md, CmpType::L, x, 1)]);
        assert!(ColumnConstraint::from_scalar_expr(&contradiction)
            .unwrap()
            .is_contradiction());
    }

    #[test]
    fn test_not_equal_is_not_in() {
        let (md, x) = setup();
        let c = ColumnConstraint::from_scalar_expr(&cmp(&md, CmpType::NEq, x, 4)).unwrap();
        let d = ColumnConstraint::from_scalar_expr(&cmp(&md, CmpType::NEq, x, 7)).unwrap();
        let both = c.intersect(&d);
        assert!(both.converts_to_not_in());
        let expr = both.to_scalar_expr(&md, true).unwrap();
        assert_eq!(
            ArrayCmpKind::All,
            expr.scalar_op().unwrap().as_scalar_array_cmp().unwrap().kind()
        );
        assert_eq!(2, expr.child(1).arity());
    }

    #[test]
    fn test_complement_round_trip() {
        let (md, x) = setup();
        let c = ColumnConstraint::from_scalar_expr(&cmp(&md, CmpType::GEq, x, 4)).unwrap();
        let complement = c.complement();
        assert!(complement.includes_null());
        assert_eq!(c, complement.complement());
        assert!(c.intersect(&complement).is_contradiction());
        assert!(c.union(&complement).is_unbounded());
    }

    #[test]
    fn test_null_tests() {
        let (md, x) = setup();
        let is_null = ColumnConstraint::from_scalar_expr(&Expr::is_null(Expr::ident(x))).unwrap();
        assert!(is_null.ranges().is_empty() && is_null.includes_null());
        let not_null =
            ColumnConstraint::from_scalar_expr(&Expr::is_not_null(Expr::ident(x))).unwrap();
        let expr = not_null.to_scalar_expr(&md, false).unwrap();
        assert_eq!(Expr::is_not_null(Expr::ident(x)), expr);
    }
}
