use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use rand::Rng;

use crate::stat::Point;

/// An interval of a column's value domain with the fraction of rows and the number of distinct
/// values falling into it.
#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
    lower: Point,
    upper: Point,
    lower_closed: bool,
    upper_closed: bool,
    frequency: f64,
    distinct: f64,
}

/// `part / whole`, treating degenerate widths as full coverage.
fn width_ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        1.0
    }
}

impl Bucket {
    pub fn new(
        lower: Point,
        upper: Point,
        lower_closed: bool,
        upper_closed: bool,
        frequency: f64,
        distinct: f64,
    ) -> Self {
        Self {
            lower,
            upper,
            lower_closed,
            upper_closed,
            frequency,
            distinct,
        }
    }

    /// A bucket holding exactly one value.
    pub fn singleton_of(point: Point, frequency: f64) -> Self {
        Self::new(point.clone(), point, true, true, frequency, 1.0)
    }

    pub fn lower(&self) -> &Point {
        &self.lower
    }

    pub fn upper(&self) -> &Point {
        &self.upper
    }

    pub fn is_lower_closed(&self) -> bool {
        self.lower_closed
    }

    pub fn is_upper_closed(&self) -> bool {
        self.upper_closed
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn distinct(&self) -> f64 {
        self.distinct
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_distinct(mut self, distinct: f64) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn is_singleton(&self) -> bool {
        self.lower.equals(&self.upper)
    }

    pub fn contains(&self, point: &Point) -> bool {
        if self.is_singleton() {
            return self.lower.equals(point);
        }
        if self.lower_closed && self.lower.equals(point) {
            return true;
        }
        if self.upper_closed && self.upper.equals(point) {
            return true;
        }
        self.lower.less(point) && self.upper.greater(point)
    }

    /// The whole bucket lies above `point`.
    pub fn is_before(&self, point: &Point) -> bool {
        (self.lower_closed && self.lower.greater(point))
            || (!self.lower_closed && self.lower.greater_eq(point))
    }

    /// The whole bucket lies below `point`.
    pub fn is_after(&self, point: &Point) -> bool {
        (self.upper_closed && self.upper.less(point))
            || (!self.upper_closed && self.upper.less_eq(point))
    }

    /// Fraction of the bucket lying in `[lower, point]`.
    pub fn overlap(&self, point: &Point) -> f64 {
        if self.upper.less_eq(point) {
            return 1.0;
        }
        if !self.contains(point) {
            return 0.0;
        }
        if self.is_singleton() {
            return 1.0;
        }
        let width = self.upper.distance(&self.lower);
        if width <= 0.0 {
            return 1.0;
        }
        let middle = point.distance(&self.lower);
        let res = if middle > 0.0 { middle / width } else { 1.0 / width };
        res.min(1.0)
    }

    pub fn width(&self) -> f64 {
        if self.is_singleton() {
            1.0
        } else {
            self.upper.distance(&self.lower)
        }
    }

    /// The part of the bucket in `[lower, new_upper]`, `None` when it would be empty.
    pub fn scale_upper(&self, new_upper: &Point, include_upper: bool) -> Option<Bucket> {
        if self.lower.equals(new_upper) {
            return if include_upper {
                Some(self.singleton(new_upper))
            } else {
                None
            };
        }
        let (mut frequency, mut distinct) = (self.frequency, self.distinct);
        if !self.upper.equals(new_upper) {
            let overlap = self.overlap(new_upper);
            frequency *= overlap;
            distinct *= overlap;
        }
        Some(Bucket::new(
            self.lower.clone(),
            new_upper.clone(),
            self.lower_closed,
            include_upper,
            frequency,
            distinct,
        ))
    }

    /// The part of the bucket in `[new_lower, upper]`.
    pub fn scale_lower(&self, new_lower: &Point, include_lower: bool) -> Option<Bucket> {
        if self.upper.equals(new_lower) {
            return if include_lower || self.is_singleton() {
                Some(self.singleton(new_lower))
            } else {
                None
            };
        }
        let (mut frequency, mut distinct) = (self.frequency, self.distinct);
        if !self.lower.equals(new_lower) {
            let overlap = 1.0 - self.overlap(new_lower);
            frequency *= overlap;
            distinct *= overlap;
        }
        Some(Bucket::new(
            new_lower.clone(),
            self.upper.clone(),
            include_lower,
            self.upper_closed,
            frequency,
            distinct,
        ))
    }

    /// The part of the bucket strictly above `point`.
    ///
    /// Discrete domains continue from the successor of `point` with a closed bound.
    pub fn greater_than(&self, point: &Point) -> Option<Bucket> {
        if self.is_singleton() || self.upper.equals(point) {
            return None;
        }
        match point.next() {
            Some(next) if self.contains(&next) => self.scale_lower(&next, true),
            Some(_) => None,
            None => self.scale_lower(point, false),
        }
    }

    /// A bucket for the single value `point`, assuming values are uniformly frequent.
    pub fn singleton(&self, point: &Point) -> Bucket {
        let frequency = if self.distinct > 0.0 {
            (self.frequency / self.distinct).min(1.0)
        } else {
            self.frequency.min(1.0)
        };
        Bucket::singleton_of(point.clone(), frequency)
    }

    /// Rescales the frequency from a relation of `rows_old` rows to one of `rows_new` rows.
    pub fn update_frequency(&self, rows_old: f64, rows_new: f64) -> Bucket {
        self.clone()
            .with_frequency(self.frequency * rows_old / rows_new)
    }

    /// Orders buckets by lower bound; a closed bound starts before an open one at the same point.
    pub fn compare_lower_bounds(b1: &Bucket, b2: &Bucket) -> Ordering {
        if b1.lower.equals(&b2.lower) {
            return match (b1.lower_closed, b2.lower_closed) {
                (x, y) if x == y => Ordering::Equal,
                (true, _) => Ordering::Less,
                _ => Ordering::Greater,
            };
        }
        if b1.lower.less(&b2.lower) {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }

    /// Orders buckets by upper bound; a closed bound ends after an open one at the same point.
    pub fn compare_upper_bounds(b1: &Bucket, b2: &Bucket) -> Ordering {
        if b1.upper.equals(&b2.upper) {
            return match (b1.upper_closed, b2.upper_closed) {
                (x, y) if x == y => Ordering::Equal,
                (true, _) => Ordering::Greater,
                _ => Ordering::Less,
            };
        }
        if b1.upper.less(&b2.upper) {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }

    /// Compares the lower bound of `b1` with the upper bound of `b2`.
    pub fn compare_lower_to_upper(b1: &Bucket, b2: &Bucket) -> Ordering {
        if b1.lower.greater(&b2.upper) {
            return Ordering::Greater;
        }
        if b1.lower.less(&b2.upper) {
            return Ordering::Less;
        }
        if b1.lower_closed && b2.upper_closed {
            Ordering::Equal
        } else {
            Ordering::Greater
        }
    }

    /// Whether `other`'s range lies entirely inside this bucket.
    pub fn subsumes(&self, other: &Bucket) -> bool {
        if self.is_singleton() && other.is_singleton() {
            return self.lower.equals(&other.lower);
        }
        if other.is_singleton() {
            return self.contains(&other.lower);
        }
        Self::compare_lower_bounds(self, other) != Ordering::Greater
            && Self::compare_upper_bounds(self, other) != Ordering::Less
    }

    pub fn intersects(&self, other: &Bucket) -> bool {
        if self.is_singleton() && other.is_singleton() {
            return self.lower.equals(&other.lower);
        }
        if self.is_singleton() {
            return other.contains(&self.lower);
        }
        if other.is_singleton() {
            return self.contains(&other.lower);
        }
        if self.subsumes(other) || other.subsumes(self) {
            return true;
        }
        if Self::compare_lower_bounds(self, other) != Ordering::Greater {
            Self::compare_lower_to_upper(other, self) != Ordering::Greater
        } else {
            Self::compare_lower_to_upper(self, other) != Ordering::Greater
        }
    }

    /// The whole bucket lies below `other`.
    pub fn is_before_bucket(&self, other: &Bucket) -> bool {
        !self.intersects(other) && self.upper.less_eq(&other.lower)
    }

    /// The whole bucket lies above `other`.
    pub fn is_after_bucket(&self, other: &Bucket) -> bool {
        !self.intersects(other) && self.lower.greater_eq(&other.upper)
    }

    /// The overlapping part of two intersecting buckets, together with the frequency each
    /// operand contributes to it.
    ///
    /// The operand with more distinct values in the overlap acts as the dimension of the join.
    pub fn intersect(&self, other: &Bucket) -> (Bucket, f64, f64) {
        let new_lower = self.lower.max(&other.lower).clone();
        let new_upper = self.upper.min(&other.upper).clone();

        let (mut lower_closed, mut upper_closed) = (true, true);
        let mut new_width = 1.0;
        if !new_lower.equals(&new_upper) {
            lower_closed = self.lower_closed;
            upper_closed = self.upper_closed;
            if new_lower.equals(&other.lower) {
                lower_closed = other.lower_closed;
                if new_lower.equals(&self.lower) {
                    lower_closed = self.lower_closed && other.lower_closed;
                }
            }
            if new_upper.equals(&other.upper) {
                upper_closed = other.upper_closed;
                if new_upper.equals(&self.upper) {
                    upper_closed = self.upper_closed && other.upper_closed;
                }
            }
            new_width = new_upper.distance(&new_lower);
        }

        let (ratio1, ratio2) = if self.is_singleton() && other.is_singleton() {
            (1.0, 1.0)
        } else {
            (
                width_ratio(new_width, self.width()),
                width_ratio(new_width, other.width()),
            )
        };
        let distinct1 = ratio1 * self.distinct;
        let distinct2 = ratio2 * other.distinct;
        let freq1 = ratio1 * self.frequency;
        let freq2 = ratio2 * other.frequency;
        let dimension = distinct1.max(distinct2);
        let frequency = if dimension > 0.0 {
            freq1 * freq2 / dimension
        } else {
            0.0
        };

        (
            Bucket::new(
                new_lower,
                new_upper,
                lower_closed,
                upper_closed,
                frequency,
                distinct1.min(distinct2),
            ),
            freq1,
            freq2,
        )
    }

    /// The parts of this bucket below and above `other`.
    pub fn difference(&self, other: &Bucket) -> (Option<Bucket>, Option<Bucket>) {
        if other.subsumes(self) {
            return (None, None);
        }
        if self.is_before_bucket(other) {
            return (Some(self.clone()), None);
        }
        if other.is_before_bucket(self) {
            return (None, Some(self.clone()));
        }
        let lower = if self.lower.less(&other.lower) {
            self.scale_upper(&other.lower, !other.lower_closed)
        } else {
            None
        };
        let upper = if other.upper.less(&self.upper) {
            self.scale_lower(&other.upper, !other.upper_closed)
        } else {
            None
        };
        (lower, upper)
    }

    /// Combines the overlapping lower portion of two buckets, returning the leftover upper
    /// portions of each input.
    ///
    /// Union all adds up both sides weighted by their row counts; a plain union keeps the
    /// larger side of the overlap.
    pub fn merge(
        &self,
        other: &Bucket,
        rows: f64,
        rows_other: f64,
        union_all: bool,
    ) -> (Bucket, Option<Bucket>, Option<Bucket>) {
        let new_lower = self.lower.min(&other.lower).clone();
        let new_upper = self.upper.min(&other.upper).clone();

        let overlap = self.overlap(&new_upper);
        let overlap_other = other.overlap(&new_upper);
        let rows_self_part = rows * self.frequency * overlap;
        let rows_other_part = rows_other * other.frequency * overlap_other;
        let (frequency, distinct) = if union_all {
            let total = rows + rows_other;
            (
                width_ratio(rows_self_part + rows_other_part, total),
                self.distinct * overlap + other.distinct * overlap_other,
            )
        } else {
            (
                width_ratio(rows_self_part.max(rows_other_part), rows),
                (self.distinct * overlap).max(other.distinct * overlap_other),
            )
        };

        let upper_closed = new_lower.equals(&new_upper);
        let rest_self = if new_upper.less(&self.upper) {
            self.scale_lower(&new_upper, !upper_closed)
        } else {
            None
        };
        let rest_other = if new_upper.less(&other.upper) {
            other.scale_lower(&new_upper, !upper_closed)
        } else {
            None
        };

        (
            Bucket::new(new_lower, new_upper, true, upper_closed, frequency, distinct),
            rest_self,
            rest_other,
        )
    }

    /// A value drawn uniformly from the bucket in the mapped double domain.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<f64> {
        let lower = self.lower.stats_mapping()?;
        if self.is_singleton() {
            return Some(lower);
        }
        let upper = self.upper.stats_mapping()?;
        Some(lower + rng.gen::<f64>() * (upper - lower))
    }
}

impl Display for Bucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}, {}{} {:.4}, {:.2}",
            if self.lower_closed { "[" } else { "(" },
            self.lower,
            self.upper,
            if self.upper_closed { "]" } else { ")" },
            self.frequency,
            self.distinct
        )
    }
}
