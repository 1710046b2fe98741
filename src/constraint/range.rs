use std::cmp::Ordering;
use std::ops::Bound;

use crate::datum::Datum;
use crate::error::OptResult;
use crate::expr::{conjunction, Expr, ExprRef};
use crate::metadata::MetadataAccessor;
use crate::operator::{CmpType, ColumnRef};

/// Orders two datums of one column. Ranges of one constraint always hold datums of the column's
/// type family, so incomparable pairs do not occur there.
pub(crate) fn cmp_datums(a: &Datum, b: &Datum) -> Ordering {
    a.stats_cmp(b).unwrap_or(Ordering::Equal)
}

/// Orders lower bounds: an unbounded start comes first, an open start after a closed one at the
/// same value.
pub(crate) fn cmp_lower(a: &Bound<Datum>, b: &Bound<Datum>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            cmp_datums(x, y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => cmp_datums(x, y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => cmp_datums(x, y).then(Ordering::Greater),
    }
}

/// Orders upper bounds: an unbounded end comes last, an open end before a closed one at the
/// same value.
pub(crate) fn cmp_upper(a: &Bound<Datum>, b: &Bound<Datum>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            cmp_datums(x, y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => cmp_datums(x, y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => cmp_datums(x, y).then(Ordering::Less),
    }
}

/// Whether a range ending at `upper` touches or overlaps a range starting at `lower`.
pub(crate) fn meets(upper: &Bound<Datum>, lower: &Bound<Datum>) -> bool {
    match (upper, lower) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Excluded(u), Bound::Excluded(l)) => cmp_datums(u, l) == Ordering::Greater,
        (Bound::Included(u), Bound::Included(l))
        | (Bound::Included(u), Bound::Excluded(l))
        | (Bound::Excluded(u), Bound::Included(l)) => cmp_datums(u, l) != Ordering::Less,
    }
}

/// A contiguous set of non-null values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    lower: Bound<Datum>,
    upper: Bound<Datum>,
}

impl Range {
    pub fn new(lower: Bound<Datum>, upper: Bound<Datum>) -> Self {
        Self { lower, upper }
    }

    pub fn point(datum: Datum) -> Self {
        Self::new(Bound::Included(datum.clone()), Bound::Included(datum))
    }

    pub fn unbounded() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn lower(&self) -> &Bound<Datum> {
        &self.lower
    }

    pub fn upper(&self) -> &Bound<Datum> {
        &self.upper
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(
            (&self.lower, &self.upper),
            (Bound::Unbounded, Bound::Unbounded)
        )
    }

    pub fn point_value(&self) -> Option<&Datum> {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) if cmp_datums(l, u) == Ordering::Equal => {
                Some(l)
            }
            _ => None,
        }
    }

    pub fn is_point(&self) -> bool {
        self.point_value().is_some()
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(l), Bound::Included(u)) => cmp_datums(l, u) == Ordering::Greater,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => cmp_datums(l, u) != Ordering::Less,
        }
    }

    pub fn intersect(&self, other: &Range) -> Option<Range> {
        let lower = match cmp_lower(&self.lower, &other.lower) {
            Ordering::Less => other.lower.clone(),
            _ => self.lower.clone(),
        };
        let upper = match cmp_upper(&self.upper, &other.upper) {
            Ordering::Greater => other.upper.clone(),
            _ => self.upper.clone(),
        };
        let range = Range::new(lower, upper);
        (!range.is_empty()).then_some(range)
    }

    /// `column` restricted to this range, e.g. `c >= 1 AND c < 5`.
    pub fn to_scalar_expr(
        &self,
        column: ColumnRef,
        metadata: &dyn MetadataAccessor,
    ) -> OptResult<ExprRef> {
        if let Some(datum) = self.point_value() {
            return bound_cmp(column, CmpType::Eq, datum, metadata);
        }
        let mut preds = Vec::with_capacity(2);
        match &self.lower {
            Bound::Included(d) => preds.push(bound_cmp(column, CmpType::GEq, d, metadata)?),
            Bound::Excluded(d) => preds.push(bound_cmp(column, CmpType::G, d, metadata)?),
            Bound::Unbounded => {}
        }
        match &self.upper {
            Bound::Included(d) => preds.push(bound_cmp(column, CmpType::LEq, d, metadata)?),
            Bound::Excluded(d) => preds.push(bound_cmp(column, CmpType::L, d, metadata)?),
            Bound::Unbounded => {}
        }
        Ok(conjunction(preds))
    }
}

fn bound_cmp(
    column: ColumnRef,
    cmp_type: CmpType,
    datum: &Datum,
    metadata: &dyn MetadataAccessor,
) -> OptResult<ExprRef> {
    Ok(Expr::cmp(
        metadata.comparison(cmp_type)?,
        Expr::ident(column),
        Expr::constant(datum.clone()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(l: i64, u: i64) -> Range {
        Range::new(Bound::Included(Datum::Int(l)), Bound::Included(Datum::Int(u)))
    }

    #[test]
    fn test_empty_ranges() {
        assert!(!closed(1, 1).is_empty());
        assert!(closed(2, 1).is_empty());
        let open = Range::new(Bound::Excluded(Datum::Int(1)), Bound::Excluded(Datum::Int(1)));
        assert!(open.is_empty());
        let half = Range::new(Bound::Included(Datum::Int(1)), Bound::Excluded(Datum::Int(1)));
        assert!(half.is_empty());
    }

    #[test]
    fn test_intersect() {
        assert_eq!(Some(closed(3, 5)), closed(1, 5).intersect(&closed(3, 9)));
        assert_eq!(None, closed(1, 2).intersect(&closed(3, 9)));
        let below = Range::new(Bound::Unbounded, Bound::Excluded(Datum::Int(3)));
        assert_eq!(None, below.intersect(&closed(3, 9)));
        assert!(closed(3, 3).intersect(&closed(3, 9)).unwrap().is_point());
    }

    #[test]
    fn test_bound_order() {
        let inc = Bound::Included(Datum::Int(1));
        let exc = Bound::Excluded(Datum::Int(1));
        assert_eq!(Ordering::Less, cmp_lower(&inc, &exc));
        assert_eq!(Ordering::Greater, cmp_upper(&inc, &exc));
        assert_eq!(Ordering::Less, cmp_lower(&Bound::Unbounded, &inc));
        assert!(meets(&inc, &exc));
        assert!(!meets(&exc, &exc));
    }
}
