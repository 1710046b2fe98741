//! Histogram based cardinality estimation.
//!
//! Every column of a relational node is summarized by a [`Histogram`]: sorted, non overlapping
//! [`Bucket`]s carrying the fraction of rows and the number of distinct values inside each value
//! range, plus the fraction of nulls and whatever distinct values are not covered by buckets.
//! A [`Statistics`] object collects the histograms of one node together with its estimated row
//! count and derives the statistics of filters, joins, group-bys and unions from its inputs.
//!
//! Selectivities are expressed as *scale factors*, the inverse of the selectivity: a predicate
//! keeping half of the rows has a scale factor of 2. Scale factors of several predicates are
//! combined by the damped products in [`scale_factor`], which soften the independence
//! assumption as more predicates pile up.
//!
//! Everything here is functional: operations build new buckets, histograms and statistics and
//! never mutate published ones.

mod bucket;
pub use bucket::*;
mod histogram;
pub use histogram::*;
mod like;
pub use like::*;
mod point;
pub use point::*;
mod pred_builder;
pub use pred_builder::*;
mod predicate;
pub use predicate::*;
pub mod scale_factor;
mod filter;
mod statistics;
pub use statistics::*;

/// Tolerance of all frequency comparisons.
pub const EPSILON: f64 = 0.001;
/// Estimated row counts never drop below this.
pub const MIN_ROWS: f64 = 1.0;
/// Buckets never claim fewer distinct values than this after capping.
pub const MIN_DISTINCT: f64 = 1.0;
pub const DEFAULT_COLUMN_WIDTH: f64 = 8.0;
pub const DEFAULT_DISTINCT_VALUES: f64 = 1000.0;
pub const DEFAULT_RELATION_ROWS: f64 = 1000.0;
/// Selectivity assumed for predicates nothing is known about.
pub const DEFAULT_SELECTIVITY: f64 = 0.4;
/// Scale factor of a predicate that does not filter at all.
pub const NEUTRAL_SCALE_FACTOR: f64 = 1.0;
/// Scale factor of a predicate nothing is known about.
pub const DEFAULT_SCALE_FACTOR: f64 = 1.0 / DEFAULT_SELECTIVITY;
pub const DEFAULT_JOIN_SCALE_FACTOR: f64 = 100.0;
pub const DEFAULT_INEQUALITY_JOIN_SCALE_FACTOR: f64 = 3.0;
/// Samples drawn when estimating the skew of a histogram.
pub const SKEW_SAMPLE_SIZE: usize = 1000;

/// Distinct values assumed for a column without statistics in a relation of `rows` rows.
pub fn default_distinct_values(rows: f64) -> f64 {
    DEFAULT_DISTINCT_VALUES.min(rows)
}
