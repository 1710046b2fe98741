use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use crate::datum::Datum;

/// A histogram bucket boundary.
///
/// Points of one histogram are expected to be mutually comparable; comparisons between
/// incomparable points answer `false` to every ordering question.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    datum: Datum,
}

impl Point {
    pub fn new(datum: Datum) -> Self {
        Self { datum }
    }

    pub fn datum(&self) -> &Datum {
        &self.datum
    }

    pub fn is_null(&self) -> bool {
        self.datum.is_null()
    }

    pub fn is_comparable(&self, other: &Point) -> bool {
        self.datum.stats_cmp(&other.datum).is_some()
    }

    fn cmp_to(&self, other: &Point) -> Option<Ordering> {
        self.datum.stats_cmp(&other.datum)
    }

    pub fn equals(&self, other: &Point) -> bool {
        self.cmp_to(other) == Some(Ordering::Equal)
    }

    pub fn less(&self, other: &Point) -> bool {
        self.cmp_to(other) == Some(Ordering::Less)
    }

    pub fn less_eq(&self, other: &Point) -> bool {
        matches!(self.cmp_to(other), Some(Ordering::Less | Ordering::Equal))
    }

    pub fn greater(&self, other: &Point) -> bool {
        self.cmp_to(other) == Some(Ordering::Greater)
    }

    pub fn greater_eq(&self, other: &Point) -> bool {
        matches!(self.cmp_to(other), Some(Ordering::Greater | Ordering::Equal))
    }

    /// `self - other` in the mapped double domain, `0.0` when either side has no mapping.
    pub fn distance(&self, other: &Point) -> f64 {
        self.datum.distance(&other.datum).unwrap_or(0.0)
    }

    pub fn has_stats_mapping(&self) -> bool {
        self.datum.has_stats_mapping()
    }

    pub fn stats_mapping(&self) -> Option<f64> {
        self.datum.stats_mapping()
    }

    /// Whether the mapped domain is integral, so open bounds exclude a whole unit.
    pub fn is_discrete(&self) -> bool {
        matches!(self.datum, Datum::Int(_) | Datum::Date(_))
    }

    /// The successor point for discrete domains.
    pub fn next(&self) -> Option<Point> {
        self.datum.next().map(Point::new)
    }

    pub fn min<'a>(&'a self, other: &'a Point) -> &'a Point {
        if other.less(self) {
            other
        } else {
            self
        }
    }

    pub fn max<'a>(&'a self, other: &'a Point) -> &'a Point {
        if other.greater(self) {
            other
        } else {
            self
        }
    }
}

impl From<Datum> for Point {
    fn from(datum: Datum) -> Self {
        Point::new(datum)
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.datum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let a = Point::new(Datum::Int(1));
        let b = Point::new(Datum::Double(2.5));
        assert!(a.less(&b));
        assert!(b.greater_eq(&a));
        assert!(!a.equals(&b));
        assert_eq!(1.5, b.distance(&a));
        assert_eq!(&a, a.min(&b));
        assert_eq!(&b, a.max(&b));
    }

    #[test]
    fn test_incomparable_points() {
        let a = Point::new(Datum::Int(1));
        let t = Point::new(Datum::Text("x".into()));
        assert!(!a.less(&t));
        assert!(!a.greater(&t));
        assert!(!a.equals(&t));
        assert!(!a.is_comparable(&t));
    }
}
