use std::fmt::{Display, Formatter};

use itertools::Itertools;
use prettytable::Table;
use rand::Rng;

use crate::datum::{DataType, Datum};
use crate::operator::CmpType;
use crate::stat::{
    Bucket, Point, DEFAULT_INEQUALITY_JOIN_SCALE_FACTOR, DEFAULT_SCALE_FACTOR,
    DEFAULT_SELECTIVITY, EPSILON, MIN_DISTINCT, MIN_ROWS, NEUTRAL_SCALE_FACTOR, SKEW_SAMPLE_SIZE,
};

/// Distribution of one column's values.
///
/// Frequencies are fractions of the relation's rows. Values not covered by any bucket are
/// summarized by `distinct_remain` distinct values with a total frequency of `freq_remain`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    buckets: Vec<Bucket>,
    /// Whether anything at all is known about the column.
    well_defined: bool,
    null_freq: f64,
    distinct_remain: f64,
    freq_remain: f64,
    ndv_scaled: bool,
    col_stats_missing: bool,
}

fn sum_frequency(buckets: &[Bucket]) -> f64 {
    buckets.iter().map(Bucket::frequency).sum()
}

fn sum_distinct(buckets: &[Bucket]) -> f64 {
    buckets.iter().map(Bucket::distinct).sum()
}

impl Histogram {
    pub fn new(buckets: Vec<Bucket>) -> Self {
        Self::with_remainders(buckets, true, 0.0, 0.0, 0.0)
    }

    pub fn with_remainders(
        buckets: Vec<Bucket>,
        well_defined: bool,
        null_freq: f64,
        distinct_remain: f64,
        freq_remain: f64,
    ) -> Self {
        Self {
            buckets,
            well_defined,
            null_freq,
            distinct_remain,
            freq_remain,
            ndv_scaled: false,
            col_stats_missing: false,
        }
    }

    /// A histogram of a column nothing is known about.
    pub fn undefined() -> Self {
        Self::with_remainders(vec![], false, 0.0, 0.0, 0.0)
    }

    /// A boolean column has at most three values: true, false and null.
    pub fn default_bool() -> Self {
        Self::with_remainders(vec![], true, 0.0, 3.0, 1.0).with_col_stats_missing(true)
    }

    pub fn default_for(data_type: DataType, empty: bool) -> Self {
        if data_type == DataType::Bool && !empty {
            Self::default_bool()
        } else {
            Self::undefined()
        }
    }

    pub fn with_null_freq(mut self, null_freq: f64) -> Self {
        self.null_freq = null_freq;
        self
    }

    pub fn with_ndv_scaled(mut self, ndv_scaled: bool) -> Self {
        self.ndv_scaled = ndv_scaled;
        self
    }

    pub fn with_col_stats_missing(mut self, missing: bool) -> Self {
        self.col_stats_missing = missing;
        self
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn is_well_defined(&self) -> bool {
        self.well_defined
    }

    pub fn null_freq(&self) -> f64 {
        self.null_freq
    }

    pub fn distinct_remain(&self) -> f64 {
        self.distinct_remain
    }

    pub fn freq_remain(&self) -> f64 {
        self.freq_remain
    }

    pub fn is_ndv_scaled(&self) -> bool {
        self.ndv_scaled
    }

    pub fn is_col_stats_missing(&self) -> bool {
        self.col_stats_missing
    }

    /// No row at all can have a value for the column.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty() && self.null_freq < EPSILON && self.distinct_remain < EPSILON
    }

    pub fn frequency(&self) -> f64 {
        let nulls = if self.null_freq > EPSILON {
            self.null_freq
        } else {
            0.0
        };
        sum_frequency(&self.buckets) + nulls + self.freq_remain
    }

    /// Distinct values including null as one value.
    pub fn distinct(&self) -> f64 {
        let nulls = if self.null_freq > EPSILON { 1.0 } else { 0.0 };
        sum_distinct(&self.buckets) + nulls + self.distinct_remain
    }

    pub fn is_normalized(&self) -> bool {
        (self.frequency() - 1.0).abs() < EPSILON
    }

    /// Frequencies add up to at most one and buckets are sorted without overlap.
    pub fn is_valid(&self) -> bool {
        if self.frequency() > 1.0 + EPSILON {
            return false;
        }
        self.buckets
            .iter()
            .tuple_windows()
            .all(|(prev, next)| !next.lower().less(prev.upper()))
    }

    pub fn supports_filter(cmp: CmpType) -> bool {
        matches!(
            cmp,
            CmpType::Eq
                | CmpType::NEq
                | CmpType::L
                | CmpType::LEq
                | CmpType::G
                | CmpType::GEq
                | CmpType::IDF
                | CmpType::INDF
        )
    }

    pub fn supports_join(cmp: CmpType) -> bool {
        cmp != CmpType::Other
    }

    /// Scales frequencies so they add up to one, returning the applied scale factor.
    ///
    /// Only used on histograms that have not been shared yet.
    pub(crate) fn normalize(&mut self) -> f64 {
        if self.buckets.is_empty() && self.null_freq < EPSILON && self.distinct_remain < EPSILON
        {
            return f64::MAX;
        }
        let frequency = self.frequency();
        if frequency <= 0.0 {
            return f64::MAX;
        }
        let scale_factor = (1.0 / frequency).max(1.0);
        for bucket in &mut self.buckets {
            *bucket = bucket
                .clone()
                .with_frequency(bucket.frequency() * scale_factor);
        }
        self.null_freq *= scale_factor;
        self.freq_remain = if self.distinct_remain < EPSILON {
            0.0
        } else {
            (self.freq_remain * scale_factor).min(1.0)
        };
        scale_factor
    }

    /// Caps the distinct values so they do not exceed `rows`.
    pub fn cap_ndvs(&self, rows: f64) -> Histogram {
        let distinct = self.distinct();
        if rows >= distinct {
            return self.clone();
        }
        let ratio = rows / distinct;
        let buckets = self
            .buckets
            .iter()
            .map(|b| {
                let capped = (b.distinct() * ratio).max(MIN_DISTINCT);
                b.clone().with_distinct(capped)
            })
            .collect();
        Histogram {
            buckets,
            distinct_remain: self.distinct_remain * ratio,
            ndv_scaled: true,
            ..self.clone()
        }
    }

    fn filter_less(&self, cmp: CmpType, point: &Point) -> Histogram {
        let mut buckets = vec![];
        for bucket in &self.buckets {
            if bucket.is_before(point) {
                break;
            }
            if bucket.is_after(point) {
                buckets.push(bucket.clone());
            } else {
                buckets.extend(bucket.scale_upper(point, cmp == CmpType::LEq));
                break;
            }
        }
        let (distinct_remain, freq_remain) = self.remainders_after_range();
        Histogram::with_remainders(buckets, true, 0.0, distinct_remain, freq_remain)
    }

    fn filter_greater(&self, cmp: CmpType, point: &Point) -> Histogram {
        let mut buckets = vec![];
        let mut idx = 0;
        while idx < self.buckets.len() {
            let bucket = &self.buckets[idx];
            if bucket.is_before(point) {
                break;
            }
            idx += 1;
            if bucket.contains(point) {
                if cmp == CmpType::GEq {
                    buckets.extend(bucket.scale_lower(point, true));
                } else {
                    buckets.extend(bucket.greater_than(point));
                }
                break;
            }
        }
        buckets.extend(self.buckets[idx..].iter().cloned());
        let (distinct_remain, freq_remain) = self.remainders_after_range();
        Histogram::with_remainders(buckets, true, 0.0, distinct_remain, freq_remain)
    }

    /// Range predicates keep the default selectivity of the values not covered by buckets.
    fn remainders_after_range(&self) -> (f64, f64) {
        if self.distinct_remain * DEFAULT_SELECTIVITY > EPSILON {
            (
                self.distinct_remain * DEFAULT_SELECTIVITY,
                self.freq_remain * DEFAULT_SELECTIVITY,
            )
        } else {
            (0.0, 0.0)
        }
    }

    fn not_equal_buckets(&self, point: &Point) -> Vec<Bucket> {
        let mut buckets = vec![];
        for bucket in &self.buckets {
            if bucket.contains(point) && !point.is_null() {
                buckets.extend(bucket.scale_upper(point, false));
                buckets.extend(bucket.greater_than(point));
            } else {
                buckets.push(bucket.clone());
            }
        }
        buckets
    }

    fn equal_buckets(&self, point: &Point) -> Vec<Bucket> {
        if point.is_null() {
            return vec![];
        }
        self.buckets
            .iter()
            .find(|b| b.contains(point))
            .map(|b| {
                if b.is_singleton() {
                    b.clone()
                } else {
                    b.singleton(point)
                }
            })
            .into_iter()
            .collect()
    }

    /// When no bucket holds the point it is assumed to be one of the remaining distinct values.
    fn matched_remainder(&self) -> Option<Histogram> {
        if self.distinct_remain > EPSILON {
            let freq_remain = (self.freq_remain / self.distinct_remain).min(1.0);
            Some(Histogram::with_remainders(vec![], true, 0.0, 1.0, freq_remain))
        } else {
            None
        }
    }

    fn filter_equal(&self, point: &Point) -> Histogram {
        if point.is_null() {
            return Histogram::with_remainders(vec![], true, self.null_freq, 0.0, 0.0);
        }
        let buckets = self.equal_buckets(point);
        if buckets.is_empty() {
            if let Some(hist) = self.matched_remainder() {
                return hist;
            }
        }
        Histogram::new(buckets)
    }

    fn filter_indf(&self, point: &Point) -> Histogram {
        let buckets = self.equal_buckets(point);
        if point.is_null() {
            return Histogram::with_remainders(buckets, true, self.null_freq, 0.0, 0.0);
        }
        if buckets.is_empty() {
            if let Some(hist) = self.matched_remainder() {
                return hist;
            }
        }
        Histogram::with_remainders(buckets, true, 0.0, 0.0, 0.0)
    }

    /// Applies `column <cmp> point` to the buckets without normalizing.
    pub fn filter(&self, cmp: CmpType, point: &Point) -> Histogram {
        match cmp {
            CmpType::Eq => self.filter_equal(point),
            CmpType::INDF => self.filter_indf(point),
            CmpType::L | CmpType::LEq => self.filter_less(cmp, point),
            CmpType::G | CmpType::GEq => self.filter_greater(cmp, point),
            CmpType::NEq => Histogram::with_remainders(
                self.not_equal_buckets(point),
                true,
                0.0,
                self.distinct_remain,
                self.freq_remain,
            ),
            CmpType::IDF => {
                let null_freq = if point.is_null() { 0.0 } else { self.null_freq };
                Histogram::with_remainders(
                    self.not_equal_buckets(point),
                    true,
                    null_freq,
                    self.distinct_remain,
                    self.freq_remain,
                )
            }
            CmpType::Like | CmpType::Other => self.clone(),
        }
    }

    /// Applies `column <cmp> point` and returns the normalized result with its scale factor.
    pub fn filter_normalized(&self, cmp: CmpType, point: &Point) -> (Histogram, f64) {
        if !self.well_defined {
            return (Histogram::undefined(), DEFAULT_SCALE_FACTOR);
        }
        let mut result = self.filter(cmp, point);
        let scale_factor = result.normalize();
        (result, scale_factor)
    }

    /// Joins with `other` on `self <cmp> other`, returning the normalized join histogram and
    /// the scale factor of the join predicate.
    pub fn join_normalized(
        &self,
        cmp: CmpType,
        rows: f64,
        other: &Histogram,
        rows_other: f64,
    ) -> (Histogram, f64) {
        if !matches!(cmp, CmpType::Eq | CmpType::INDF) {
            let scale_factor = if matches!(cmp, CmpType::NEq | CmpType::IDF) {
                self.inequality_join_scale_factor(rows, other, rows_other)
            } else {
                DEFAULT_INEQUALITY_JOIN_SCALE_FACTOR
            };
            return (Histogram::undefined(), scale_factor);
        }
        if !self.well_defined || !other.well_defined {
            return (Histogram::undefined(), rows.min(rows_other));
        }

        let mut join = self.join(cmp, other);
        join.normalize();
        // the scale factor of an equality join is the larger number of distinct values
        let mut scale_factor = self
            .distinct()
            .max(MIN_DISTINCT)
            .max(other.distinct().max(MIN_DISTINCT));
        let cartesian = rows * rows_other;
        if join.is_empty() {
            scale_factor = cartesian;
        }
        if cmp == CmpType::INDF {
            let expected =
                cartesian / scale_factor + rows * self.null_freq * rows_other * other.null_freq;
            if expected > 0.0 {
                scale_factor = cartesian / expected;
            }
        }
        (join, scale_factor.min(cartesian))
    }

    /// `<>` keeps everything an equality join drops.
    fn inequality_join_scale_factor(&self, rows: f64, other: &Histogram, rows_other: f64) -> f64 {
        let (_, eq_scale_factor) = self.join_normalized(CmpType::Eq, rows, other, rows_other);
        let selectivity = 1.0 - 1.0 / eq_scale_factor;
        if selectivity > EPSILON {
            1.0 / selectivity
        } else {
            rows * rows_other
        }
    }

    fn join(&self, cmp: CmpType, other: &Histogram) -> Histogram {
        match cmp {
            CmpType::Eq => self.join_equality(other),
            CmpType::INDF => {
                let dimension = self.distinct().max(other.distinct());
                let null_freq = if dimension > 0.0 {
                    self.null_freq * other.null_freq / dimension
                } else {
                    0.0
                };
                self.join_equality(other).with_null_freq(null_freq)
            }
            _ => Histogram::undefined(),
        }
    }

    fn join_equality(&self, other: &Histogram) -> Histogram {
        let mut buckets = vec![];
        let (mut i1, mut i2) = (0, 0);
        let (mut join_freq1, mut join_freq2) = (0.0, 0.0);
        while i1 < self.buckets.len() && i2 < other.buckets.len() {
            let b1 = &self.buckets[i1];
            let b2 = &other.buckets[i2];
            if b1.intersects(b2) {
                let (bucket, freq1, freq2) = b1.intersect(b2);
                buckets.push(bucket);
                join_freq1 += freq1;
                join_freq2 += freq2;
                match Bucket::compare_upper_bounds(b1, b2) {
                    std::cmp::Ordering::Equal => {
                        i1 += 1;
                        i2 += 1;
                    }
                    std::cmp::Ordering::Less => i1 += 1,
                    std::cmp::Ordering::Greater => i2 += 1,
                }
            } else if b1.is_before_bucket(b2) {
                i1 += 1;
            } else {
                i2 += 1;
            }
        }
        let (distinct_remain, freq_remain) =
            Self::join_ndv_remain(self, other, &buckets, join_freq1, join_freq2);
        Histogram::with_remainders(buckets, true, 0.0, distinct_remain, freq_remain)
    }

    fn can_compute_join_ndv_remain(h1: &Histogram, h2: &Histogram) -> bool {
        let remain1 = h1.distinct_remain > EPSILON;
        let remain2 = h2.distinct_remain > EPSILON;
        if !remain1 && !remain2 {
            return false;
        }
        (remain1 || !h1.buckets.is_empty()) && (remain2 || !h2.buckets.is_empty())
    }

    /// Distinct values and frequency of the join result not covered by joined buckets.
    fn join_ndv_remain(
        h1: &Histogram,
        h2: &Histogram,
        join_buckets: &[Bucket],
        join_freq1: f64,
        join_freq2: f64,
    ) -> (f64, f64) {
        if !Self::can_compute_join_ndv_remain(h1, h2) {
            return (0.0, 0.0);
        }
        let join_ndv = sum_distinct(join_buckets);
        if 1.0 - sum_frequency(join_buckets) <= EPSILON {
            return (0.0, 0.0);
        }

        let non_null_distinct = |h: &Histogram| {
            if h.null_freq > EPSILON {
                h.distinct() - 1.0
            } else {
                h.distinct()
            }
        };
        let distinct1 = non_null_distinct(h1);
        let distinct2 = non_null_distinct(h2);
        let ndv_remain = distinct1.min(distinct2) - join_ndv;

        let non_join_freq1 = (sum_frequency(&h1.buckets) - join_freq1).max(0.0);
        let non_join_freq2 = (sum_frequency(&h2.buckets) - join_freq2).max(0.0);
        let non_join_ndv1 = sum_distinct(&h1.buckets) - join_ndv;
        let non_join_ndv2 = sum_distinct(&h2.buckets) - join_ndv;

        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };
        let freq_remain = ratio(
            h1.freq_remain * h2.freq_remain,
            h1.distinct_remain.max(h2.distinct_remain),
        ) + ratio(
            h1.freq_remain * non_join_freq2,
            distinct1.max(non_join_ndv2),
        ) + ratio(
            h2.freq_remain * non_join_freq1,
            distinct2.max(non_join_ndv1),
        );
        (ndv_remain, freq_remain)
    }

    /// The rows of `self` without a partner in `other`, with the scale factor of the anti join.
    ///
    /// With `ignore_histogram` the histogram shape is not computed and the default selectivity
    /// applies.
    pub fn lasj_normalized(
        &self,
        cmp: CmpType,
        rows: f64,
        other: &Histogram,
        ignore_histogram: bool,
    ) -> (Histogram, f64) {
        if !self.well_defined || !other.well_defined {
            return (Histogram::undefined(), NEUTRAL_SCALE_FACTOR);
        }
        if ignore_histogram {
            return (self.clone(), DEFAULT_SCALE_FACTOR);
        }
        let mut result = self.lasj(cmp, other);
        let mut scale_factor = result.normalize();
        if !matches!(cmp, CmpType::Eq | CmpType::INDF) {
            scale_factor = DEFAULT_SCALE_FACTOR;
        }
        (result, scale_factor.min(rows))
    }

    fn lasj(&self, cmp: CmpType, other: &Histogram) -> Histogram {
        if !matches!(cmp, CmpType::Eq | CmpType::INDF) {
            return self.clone();
        }
        let mut buckets = vec![];
        let mut remaining = self.buckets.iter();
        let mut candidate = remaining.next().cloned();
        let mut i2 = 0;
        while let Some(current) = candidate.take() {
            let Some(b2) = other.buckets.get(i2) else {
                candidate = Some(current);
                break;
            };
            if current.is_before_bucket(b2) {
                buckets.push(current);
                candidate = remaining.next().cloned();
                continue;
            }
            if b2.is_before_bucket(&current) {
                i2 += 1;
                candidate = Some(current);
                continue;
            }
            let (lower, upper) = current.difference(b2);
            buckets.extend(lower);
            match upper {
                Some(upper) => {
                    i2 += 1;
                    candidate = Some(upper);
                }
                None => candidate = remaining.next().cloned(),
            }
        }
        buckets.extend(candidate);
        buckets.extend(remaining.cloned());

        let null_freq = match cmp {
            CmpType::INDF if other.null_freq > EPSILON => 0.0,
            _ => self.null_freq,
        };
        Histogram::with_remainders(
            buckets,
            true,
            null_freq,
            self.distinct_remain,
            self.freq_remain,
        )
    }

    /// The histogram of the column after grouping on it, with the number of groups.
    pub fn group_by_normalized(&self) -> (Histogram, f64) {
        if !self.well_defined {
            return (Histogram::undefined(), MIN_DISTINCT / DEFAULT_SELECTIVITY);
        }
        let distinct = self.distinct();
        let buckets = self
            .buckets
            .iter()
            .map(|b| {
                Bucket::new(
                    b.lower().clone(),
                    b.upper().clone(),
                    true,
                    b.is_singleton(),
                    b.distinct() / distinct,
                    b.distinct(),
                )
            })
            .collect();
        let null_freq = if self.null_freq > EPSILON {
            (1.0 / distinct).min(1.0)
        } else {
            0.0
        };
        let freq_remain = if self.distinct_remain > EPSILON {
            (self.distinct_remain / distinct).min(1.0)
        } else {
            0.0
        };
        let result = Histogram::with_remainders(
            buckets,
            true,
            null_freq,
            self.distinct_remain,
            freq_remain,
        );
        let groups = result.distinct();
        (result, groups)
    }

    /// Histogram of `UNION ALL` of a relation with `rows` rows and one with `rows_other` rows.
    pub fn union_all_normalized(&self, rows: f64, other: &Histogram, rows_other: f64) -> Histogram {
        let total = rows + rows_other;
        let mut buckets = vec![];
        let mut union_walk = UnionWalk::new(&self.buckets, &other.buckets);
        while let Some(step) = union_walk.step(rows, rows_other, true) {
            match step {
                UnionStep::First(b) => buckets.push(b.update_frequency(rows, total)),
                UnionStep::Second(b) => buckets.push(b.update_frequency(rows_other, total)),
                UnionStep::Merged(b) => buckets.push(b),
            }
        }
        let (rest1, rest2) = union_walk.rest();
        buckets.extend(rest1.into_iter().map(|b| b.update_frequency(rows, total)));
        buckets.extend(rest2.into_iter().map(|b| b.update_frequency(rows_other, total)));
        buckets.sort_by(Bucket::compare_lower_bounds);

        let mut result = Histogram::with_remainders(
            buckets,
            true,
            (self.null_freq * rows + other.null_freq * rows_other) / total,
            self.distinct_remain.max(other.distinct_remain),
            (self.freq_remain * rows + other.freq_remain * rows_other) / total,
        );
        result.normalize();
        result
    }

    /// Histogram of the union of two relations, with the estimated rows of the union.
    pub fn union_normalized(
        &self,
        rows: f64,
        other: &Histogram,
        rows_other: f64,
    ) -> (Histogram, f64) {
        let mut pieces: Vec<(Bucket, f64)> = vec![];
        let mut union_walk = UnionWalk::new(&self.buckets, &other.buckets);
        while let Some(step) = union_walk.step(rows, rows_other, false) {
            match step {
                UnionStep::First(b) => {
                    let r = b.frequency() * rows;
                    pieces.push((b, r));
                }
                UnionStep::Second(b) => {
                    let r = b.frequency() * rows_other;
                    pieces.push((b, r));
                }
                UnionStep::Merged(b) => {
                    let r = b.frequency() * rows;
                    pieces.push((b, r));
                }
            }
        }
        let (rest1, rest2) = union_walk.rest();
        pieces.extend(rest1.into_iter().map(|b| {
            let r = b.frequency() * rows;
            (b, r)
        }));
        pieces.extend(rest2.into_iter().map(|b| {
            let r = b.frequency() * rows_other;
            (b, r)
        }));
        pieces.sort_by(|(b1, _), (b2, _)| Bucket::compare_lower_bounds(b1, b2));

        let null_rows = (self.null_freq * rows).max(other.null_freq * rows_other);
        let distinct_remain = self.distinct_remain.max(other.distinct_remain);
        let remain_rows = (self.freq_remain * rows).max(other.freq_remain * rows_other);
        let total_rows = (null_rows + remain_rows + pieces.iter().map(|(_, r)| r).sum::<f64>())
            .max(MIN_ROWS);

        let buckets = pieces
            .into_iter()
            .map(|(b, r)| b.with_frequency(r / total_rows))
            .collect();
        (
            Histogram::with_remainders(
                buckets,
                true,
                null_rows / total_rows,
                distinct_remain,
                remain_rows / total_rows,
            ),
            total_rows,
        )
    }

    /// Picks a bucket index with probability proportional to the bucket frequency.
    pub fn random_bucket_index<R: Rng>(&self, rng: &mut R) -> usize {
        let value: f64 = rng.gen();
        let mut accumulated = 0.0;
        let last = self.buckets.len().saturating_sub(1);
        for (idx, bucket) in self.buckets.iter().enumerate().take(last) {
            accumulated += bucket.frequency();
            if value <= accumulated {
                return idx;
            }
        }
        last
    }

    /// Estimates skew from the third moment of a sample drawn from the buckets.
    ///
    /// Returns `1.0` for no skew or when the histogram cannot be sampled.
    pub fn estimate_skew<R: Rng>(&self, rng: &mut R) -> f64 {
        let sampleable = self
            .buckets
            .first()
            .map_or(false, |b| b.lower().has_stats_mapping());
        if !self.is_normalized() || !sampleable {
            return 1.0;
        }
        let samples: Vec<f64> = (0..SKEW_SAMPLE_SIZE)
            .filter_map(|_| {
                let idx = self.random_bucket_index(rng);
                self.buckets[idx].sample(rng)
            })
            .collect();
        if samples.is_empty() {
            return 1.0;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let m2 = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let m3 = samples.iter().map(|s| (s - mean).powi(3)).sum::<f64>() / n;
        if m2 <= 0.0 {
            return 1.0;
        }
        1.0 + (m3 / m2.powf(1.5)).abs()
    }

    /// Builds a histogram of singleton buckets from most common values and their frequencies.
    pub fn from_mcvs(mcvs: Vec<(Datum, f64)>) -> Histogram {
        let buckets = mcvs
            .into_iter()
            .map(|(datum, freq)| Bucket::singleton_of(Point::new(datum), freq))
            .sorted_by(Bucket::compare_lower_bounds)
            .collect();
        Histogram::new(buckets)
    }

    /// Merges most-common-value singletons into an equi-depth histogram, splitting every range
    /// bucket around the values it contains.
    pub fn merge_mcv_hist(mcv: &Histogram, hist: &Histogram) -> Histogram {
        let comparable = mcv
            .buckets
            .first()
            .map_or(false, |b| b.lower().is_comparable(b.lower()));
        if !comparable {
            return if mcv.frequency() > 0.5 {
                mcv.clone()
            } else {
                hist.clone()
            };
        }

        let mut merged = vec![];
        let (mut mi, mut hi) = (0, 0);
        while mi < mcv.buckets.len() && hi < hist.buckets.len() {
            let mcv_bucket = &mcv.buckets[mi];
            let hist_bucket = &hist.buckets[hi];
            if mcv_bucket.is_before_bucket(hist_bucket) {
                merged.push(mcv_bucket.clone());
                mi += 1;
            } else if mcv_bucket.is_after_bucket(hist_bucket) {
                merged.push(hist_bucket.clone());
                hi += 1;
            } else {
                let contained: Vec<Bucket> = mcv.buckets[mi..]
                    .iter()
                    .take_while(|b| hist_bucket.subsumes(b))
                    .cloned()
                    .collect();
                mi += contained.len().max(1);
                merged.extend(split_hist_bucket(hist_bucket, &contained));
                hi += 1;
            }
        }
        merged.extend(mcv.buckets[mi..].iter().cloned());
        merged.extend(hist.buckets[hi..].iter().cloned());
        Histogram::new(merged)
    }
}

/// Whether the bounds can form a non-empty bucket.
fn is_valid_bucket(lower: &Point, upper: &Point, lower_closed: bool, upper_closed: bool) -> bool {
    if lower.greater(upper) {
        return false;
    }
    if lower.equals(upper) && (!lower_closed || !upper_closed) {
        return false;
    }
    if lower.is_discrete() {
        let mut width = upper.distance(lower);
        if !lower_closed {
            width -= 1.0;
        }
        if !upper_closed {
            width -= 1.0;
        }
        if width < 0.0 {
            return false;
        }
    }
    true
}

/// Splits a range bucket at the given singletons, spreading what the singletons do not account
/// for over the new range buckets proportionally to their width.
fn split_hist_bucket(hist: &Bucket, mcvs: &[Bucket]) -> Vec<Bucket> {
    let (Some(first), Some(last)) = (mcvs.first(), mcvs.last()) else {
        return vec![hist.clone()];
    };
    let mut pieces = vec![];
    let push_range = |pieces: &mut Vec<Bucket>, lower: &Point, upper: &Point, lc, uc| {
        if is_valid_bucket(lower, upper, lc, uc) {
            pieces.push(Bucket::new(lower.clone(), upper.clone(), lc, uc, 0.0, 0.0));
        }
    };
    push_range(
        &mut pieces,
        hist.lower(),
        first.lower(),
        hist.is_lower_closed(),
        false,
    );
    for (this, next) in mcvs.iter().tuple_windows() {
        pieces.push(this.clone());
        push_range(&mut pieces, this.lower(), next.lower(), false, false);
    }
    pieces.push(last.clone());
    push_range(
        &mut pieces,
        last.lower(),
        hist.upper(),
        false,
        hist.is_upper_closed(),
    );

    let distinct_total = (hist.distinct() - mcvs.len() as f64).max(1.0);
    let width_total: f64 = pieces
        .iter()
        .filter(|b| !b.is_singleton())
        .map(Bucket::width)
        .sum();
    pieces
        .into_iter()
        .map(|b| {
            if b.is_singleton() || width_total <= 0.0 {
                return b;
            }
            let share = b.width() / width_total;
            b.clone()
                .with_frequency(hist.frequency() * share)
                .with_distinct(distinct_total * share)
        })
        .collect()
}

enum UnionStep {
    First(Bucket),
    Second(Bucket),
    Merged(Bucket),
}

/// Walks two sorted bucket arrays, merging overlapping buckets and carrying the leftover upper
/// parts forward.
struct UnionWalk<'a> {
    first: &'a [Bucket],
    second: &'a [Bucket],
    i1: usize,
    i2: usize,
    current1: Option<Bucket>,
    current2: Option<Bucket>,
}

impl<'a> UnionWalk<'a> {
    fn new(first: &'a [Bucket], second: &'a [Bucket]) -> Self {
        Self {
            first,
            second,
            i1: 0,
            i2: 0,
            current1: first.first().cloned(),
            current2: second.first().cloned(),
        }
    }

    fn advance1(&mut self) {
        self.i1 += 1;
        self.current1 = self.first.get(self.i1).cloned();
    }

    fn advance2(&mut self) {
        self.i2 += 1;
        self.current2 = self.second.get(self.i2).cloned();
    }

    fn step(&mut self, rows1: f64, rows2: f64, union_all: bool) -> Option<UnionStep> {
        let (b1, b2) = match (&self.current1, &self.current2) {
            (Some(b1), Some(b2)) => (b1.clone(), b2.clone()),
            _ => return None,
        };
        if b1.is_before_bucket(&b2) {
            self.advance1();
            return Some(UnionStep::First(b1));
        }
        if b2.is_before_bucket(&b1) {
            self.advance2();
            return Some(UnionStep::Second(b2));
        }
        let (merged, rest1, rest2) = b1.merge(&b2, rows1, rows2, union_all);
        match rest1 {
            Some(rest) => self.current1 = Some(rest),
            None => self.advance1(),
        }
        match rest2 {
            Some(rest) => self.current2 = Some(rest),
            None => self.advance2(),
        }
        Some(UnionStep::Merged(merged))
    }

    /// Whatever is left of both sides once one of them is exhausted.
    fn rest(self) -> (Vec<Bucket>, Vec<Bucket>) {
        let rest1 = self
            .current1
            .into_iter()
            .chain(self.first.iter().skip(self.i1 + 1).cloned())
            .collect();
        let rest2 = self
            .current2
            .into_iter()
            .chain(self.second.iter().skip(self.i2 + 1).cloned())
            .collect();
        (rest1, rest2)
    }
}

impl Display for Histogram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table.add_row(row!["bucket", "frequency", "distinct"]);
        for b in &self.buckets {
            table.add_row(row![
                format!(
                    "{}{}, {}{}",
                    if b.is_lower_closed() { "[" } else { "(" },
                    b.lower(),
                    b.upper(),
                    if b.is_upper_closed() { "]" } else { ")" }
                ),
                format!("{:.4}", b.frequency()),
                format!("{:.2}", b.distinct())
            ]);
        }
        table.add_row(row![
            "null",
            format!("{:.4}", self.null_freq),
            ""
        ]);
        table.add_row(row![
            "remain",
            format!("{:.4}", self.freq_remain),
            format!("{:.2}", self.distinct_remain)
        ]);
        write!(f, "{}", table)?;
        if !self.well_defined {
            writeln!(f, "(not well defined)")?;
        }
        Ok(())
    }
}
