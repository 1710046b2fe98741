use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use log::trace;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::StatisticsConfig;
use crate::datum::Datum;
use crate::operator::{CmpType, ColumnRef, ColumnSet};
use crate::stat::filter::{FilterEstimator, HistogramMap};
use crate::stat::scale_factor::{combined_distinct_values, cumulative_join_scale_factor};
use crate::stat::{
    default_distinct_values, Bucket, Histogram, JoinPred, JoinPredicates, Point, StatsPred,
    DEFAULT_COLUMN_WIDTH, DEFAULT_DISTINCT_VALUES, DEFAULT_JOIN_SCALE_FACTOR, EPSILON, MIN_ROWS,
    NEUTRAL_SCALE_FACTOR,
};

/// How the upper bounds of the input carry over to the output of an operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CardBoundingMethod {
    /// The estimated output cardinality becomes the bound.
    OutputCard,
    /// The input's bound is kept.
    InputSourceMaxCard,
    /// The smaller of both.
    Min,
}

/// Upper bound on the number of distinct values of columns coming from one source, e.g. the
/// columns of a table scan or those computed by a projection.
#[derive(Clone, Debug, PartialEq)]
pub struct UpperBoundNdvs {
    columns: ColumnSet,
    upper_bound: f64,
}

impl UpperBoundNdvs {
    pub fn new(columns: ColumnSet, upper_bound: f64) -> Self {
        Self {
            columns,
            upper_bound,
        }
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    fn bounded(&self, output_rows: f64, method: CardBoundingMethod) -> UpperBoundNdvs {
        let upper_bound = match method {
            CardBoundingMethod::OutputCard => output_rows,
            CardBoundingMethod::InputSourceMaxCard => self.upper_bound,
            CardBoundingMethod::Min => self.upper_bound.min(output_rows),
        };
        UpperBoundNdvs::new(self.columns.clone(), upper_bound)
    }

    fn remapped(&self, mapping: &BTreeMap<ColumnRef, ColumnRef>, must_exist: bool) -> Self {
        let columns = self
            .columns
            .iter()
            .filter_map(|c| match mapping.get(c) {
                Some(mapped) => Some(*mapped),
                None if must_exist => None,
                None => Some(*c),
            })
            .collect();
        UpperBoundNdvs::new(columns, self.upper_bound)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum JoinKind {
    Inner,
    LeftSemi,
    LeftAntiSemi { ignore_histogram: bool },
}

impl JoinKind {
    fn is_semi(&self) -> bool {
        !matches!(self, JoinKind::Inner)
    }
}

/// Derived statistics of one relational node.
///
/// Every operation returns a fresh object; nothing is modified once built.
#[derive(Clone, Debug)]
pub struct Statistics {
    histograms: HistogramMap,
    widths: BTreeMap<ColumnRef, f64>,
    rows: f64,
    rebinds: f64,
    estimation_risk: usize,
    num_predicates: usize,
    empty: bool,
    config: Arc<StatisticsConfig>,
    upper_bounds: Vec<UpperBoundNdvs>,
}

impl Statistics {
    /// Statistics of a base relation. All its columns share the relation's row count as upper
    /// bound.
    pub fn new(
        histograms: BTreeMap<ColumnRef, Histogram>,
        widths: BTreeMap<ColumnRef, f64>,
        rows: f64,
        config: Arc<StatisticsConfig>,
    ) -> Self {
        let columns: ColumnSet = histograms.keys().chain(widths.keys()).copied().collect();
        let mut stats = Self::derived(histograms, widths, rows, false, 0, config);
        stats
            .upper_bounds
            .push(UpperBoundNdvs::new(columns, rows.max(MIN_ROWS)));
        stats
    }

    fn derived(
        histograms: HistogramMap,
        widths: BTreeMap<ColumnRef, f64>,
        rows: f64,
        empty: bool,
        num_predicates: usize,
        config: Arc<StatisticsConfig>,
    ) -> Self {
        Self {
            histograms,
            widths,
            rows,
            rebinds: 1.0,
            estimation_risk: 1,
            num_predicates,
            empty,
            config,
            upper_bounds: vec![],
        }
    }

    /// Statistics of a relation nothing is known about except its columns.
    pub fn dummy(columns: &[ColumnRef], rows: f64, config: Arc<StatisticsConfig>) -> Self {
        let empty = rows <= EPSILON;
        let histograms = columns
            .iter()
            .map(|c| (*c, Histogram::default_for(c.data_type(), empty)))
            .collect();
        let widths = columns.iter().map(|c| (*c, DEFAULT_COLUMN_WIDTH)).collect();
        let mut stats = Self::derived(histograms, widths, rows.max(MIN_ROWS), empty, 0, config);
        stats.upper_bounds.push(UpperBoundNdvs::new(
            columns.iter().copied().collect(),
            rows.max(MIN_ROWS),
        ));
        stats
    }

    /// An empty relation with the given columns.
    pub fn empty(columns: &[ColumnRef], config: Arc<StatisticsConfig>) -> Self {
        Self::dummy(columns, 0.0, config)
    }

    pub fn rows(&self) -> f64 {
        self.rows
    }

    pub fn rebinds(&self) -> f64 {
        self.rebinds
    }

    pub fn with_rebinds(mut self, rebinds: f64) -> Self {
        self.rebinds = rebinds;
        self
    }

    pub fn estimation_risk(&self) -> usize {
        self.estimation_risk
    }

    pub fn num_predicates(&self) -> usize {
        self.num_predicates
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn config(&self) -> &Arc<StatisticsConfig> {
        &self.config
    }

    pub fn histogram(&self, column: ColumnRef) -> Option<&Histogram> {
        self.histograms.get(&column)
    }

    pub fn histograms(&self) -> &BTreeMap<ColumnRef, Histogram> {
        &self.histograms
    }

    pub fn upper_bounds(&self) -> &[UpperBoundNdvs] {
        &self.upper_bounds
    }

    /// Sum of the widths of `columns`.
    pub fn width(&self, columns: &ColumnSet) -> f64 {
        columns
            .iter()
            .map(|c| self.widths.get(c).copied().unwrap_or(DEFAULT_COLUMN_WIDTH))
            .sum()
    }

    fn upper_bound_index(&self, column: ColumnRef) -> Option<usize> {
        self.upper_bounds
            .iter()
            .position(|ub| ub.columns().contains(&column))
    }

    /// Upper bound on the distinct values of `column`.
    pub fn upper_bound(&self, column: ColumnRef) -> f64 {
        self.upper_bound_index(column)
            .map(|idx| self.upper_bounds[idx].upper_bound())
            .unwrap_or(DEFAULT_DISTINCT_VALUES)
    }

    /// Distinct values of `column`, never above its upper bound.
    pub fn ndv(&self, column: ColumnRef) -> f64 {
        let upper_bound = self.upper_bound(column);
        match self.histograms.get(&column) {
            Some(h) if h.is_well_defined() && !h.is_empty() => h.distinct().min(upper_bound),
            _ => default_distinct_values(self.rows).min(upper_bound),
        }
    }

    /// Skew of the column's value distribution; `1.0` means uniform.
    pub fn skew(&self, column: ColumnRef) -> f64 {
        let mut rng = StdRng::seed_from_u64(u64::from(u32::from(column.id())));
        self.histograms
            .get(&column)
            .map_or(1.0, |h| h.estimate_skew(&mut rng))
    }

    /// Limits every histogram's distinct values to `rows`.
    pub fn cap_ndvs(&self, rows: f64) -> Statistics {
        let mut result = self.clone();
        cap_histogram_ndvs(&mut result.histograms, rows);
        result
    }

    fn with_upper_bounds_from(
        mut self,
        input: &Statistics,
        method: CardBoundingMethod,
    ) -> Statistics {
        let rows = self.rows;
        self.upper_bounds
            .extend(input.upper_bounds.iter().map(|ub| ub.bounded(rows, method)));
        self
    }

    fn empty_histograms(&self) -> HistogramMap {
        self.histograms
            .iter()
            .map(|(c, h)| {
                let empty = Histogram::default_for(c.data_type(), true)
                    .with_col_stats_missing(h.is_col_stats_missing());
                (*c, empty)
            })
            .collect()
    }

    /// Applies a filter, optionally capping the distinct values at the new row count.
    pub fn filter(&self, pred: &StatsPred, cap_ndvs: bool) -> Statistics {
        let input_rows = self.rows.max(MIN_ROWS);
        let mut num_predicates = 1;
        let (mut histograms, rows) = if self.empty {
            (self.empty_histograms(), MIN_ROWS)
        } else {
            if let StatsPred::Conj(children) = pred {
                num_predicates = children.len();
            }
            let (histograms, scale_factor) =
                FilterEstimator::new(&self.config).estimate(&self.histograms, input_rows, pred);
            (histograms, (input_rows / scale_factor).max(MIN_ROWS))
        };
        if cap_ndvs {
            cap_histogram_ndvs(&mut histograms, rows);
        }
        trace!("filter {} on {} rows: {} rows", pred, input_rows, rows);

        let mut result = Self::derived(
            histograms,
            self.widths.clone(),
            rows,
            self.empty,
            self.num_predicates + num_predicates,
            self.config.clone(),
        );
        result.rebinds = self.rebinds;
        result.estimation_risk = self.estimation_risk + usize::from(!pred.is_empty());
        result.with_upper_bounds_from(self, CardBoundingMethod::Min)
    }

    pub fn inner_join(&self, other: &Statistics, preds: &JoinPredicates) -> Statistics {
        self.join(other, preds, JoinKind::Inner)
    }

    /// Rows of `self` without partner in `other`.
    ///
    /// Unless `ignore_histogram` is off the histogram difference is skipped and the default
    /// selectivity applies.
    pub fn left_anti_semi_join(
        &self,
        other: &Statistics,
        preds: &JoinPredicates,
        ignore_histogram: bool,
    ) -> Statistics {
        self.join(other, preds, JoinKind::LeftAntiSemi { ignore_histogram })
    }

    /// Anti semi join with the configured treatment of histograms.
    pub fn left_anti_semi_join_default(
        &self,
        other: &Statistics,
        preds: &JoinPredicates,
    ) -> Statistics {
        let ignore = self.config.ignore_lasj_histogram();
        self.left_anti_semi_join(other, preds, ignore)
    }

    /// Rows of `self` with at least one partner in `other`. Duplicates of the inner join
    /// columns do not multiply outer rows, so the inner side is grouped on them first.
    pub fn left_semi_join(&self, other: &Statistics, preds: &JoinPredicates) -> Statistics {
        let inner_columns: ColumnSet = preds.preds.iter().map(JoinPred::right).collect();
        let grouped = other.group_by(&inner_columns, &ColumnSet::new(), None);
        self.join(&grouped, preds, JoinKind::LeftSemi)
    }

    /// Inner join rows plus the null extended rows of the anti semi join.
    pub fn left_outer_join(&self, other: &Statistics, preds: &JoinPredicates) -> Statistics {
        let inner = self.inner_join(other, preds);
        let lasj = self.left_anti_semi_join(other, preds, false);
        let rows_inner = inner.rows;
        let rows_lasj = if lasj.empty { 0.0 } else { lasj.rows };

        let outer_join_columns: ColumnSet = preds.preds.iter().map(JoinPred::left).collect();
        let null_histogram = Histogram::with_remainders(vec![], true, 1.0, 0.0, 0.0);
        let mut histograms = HistogramMap::new();
        for column in self.histograms.keys() {
            let Some(inner_hist) = inner.histograms.get(column) else {
                continue;
            };
            let histogram = match lasj.histograms.get(column) {
                Some(lasj_hist)
                    if outer_join_columns.contains(column)
                        && lasj_hist.is_well_defined()
                        && !lasj_hist.is_empty()
                        && rows_lasj + rows_inner > 0.0 =>
                {
                    lasj_hist.union_all_normalized(rows_lasj, inner_hist, rows_inner)
                }
                _ => inner_hist.clone(),
            };
            histograms.insert(*column, histogram);
        }
        for column in other.histograms.keys() {
            let Some(inner_hist) = inner.histograms.get(column) else {
                continue;
            };
            let histogram = if inner_hist.is_well_defined() && rows_lasj > 0.0 {
                inner_hist.union_all_normalized(rows_inner, &null_histogram, rows_lasj)
            } else {
                inner_hist.clone()
            };
            histograms.insert(*column, histogram);
        }

        let rows = self.rows.max(rows_inner + rows_lasj);
        trace!(
            "left outer join: {} inner rows, {} null extended rows, {} rows",
            rows_inner,
            rows_lasj,
            rows
        );
        let mut result = Self::derived(
            histograms,
            inner.widths.clone(),
            rows,
            inner.empty && lasj.empty,
            inner.num_predicates,
            self.config.clone(),
        );
        result.estimation_risk = inner.estimation_risk;
        result
            .with_upper_bounds_from(self, CardBoundingMethod::Min)
            .with_upper_bounds_from(other, CardBoundingMethod::Min)
    }

    /// Histograms of both join columns after an inner join on `pred`, with the predicate's
    /// scale factor.
    fn inner_join_histograms(
        &self,
        other: &Statistics,
        pred: &JoinPred,
        input_empty: bool,
    ) -> (Histogram, Histogram, f64) {
        let h1 = histogram_or_undefined(&self.histograms, pred.left());
        let h2 = histogram_or_undefined(&other.histograms, pred.right());
        let (rows1, rows2) = (self.rows, other.rows);
        if input_empty {
            return (
                Histogram::new(vec![]),
                Histogram::new(vec![]),
                (rows1 * rows2).max(MIN_ROWS),
            );
        }
        if h1.is_empty() || h2.is_empty() {
            return (h1, h2, rows1.min(rows2).max(MIN_ROWS));
        }
        if !Histogram::supports_join(pred.cmp()) {
            return (h1, h2, DEFAULT_JOIN_SCALE_FACTOR);
        }
        let (join, scale_factor) = h1.join_normalized(pred.cmp(), rows1, &h2, rows2);
        if matches!(pred.cmp(), CmpType::Eq | CmpType::INDF) {
            let left = join.clone().with_ndv_scaled(h1.is_ndv_scaled());
            let right = join.with_ndv_scaled(h2.is_ndv_scaled());
            (left, right, scale_factor)
        } else {
            (h1, h2, scale_factor)
        }
    }

    fn lasj_histogram(
        &self,
        other: &Statistics,
        pred: &JoinPred,
        input_empty: bool,
        ignore_histogram: bool,
    ) -> (Histogram, f64) {
        let h1 = histogram_or_undefined(&self.histograms, pred.left());
        let h2 = histogram_or_undefined(&other.histograms, pred.right());
        if input_empty {
            return (h1, NEUTRAL_SCALE_FACTOR);
        }
        if !h1.is_empty() && !h2.is_empty() && Histogram::supports_join(pred.cmp()) {
            let (result, scale_factor) =
                h1.lasj_normalized(pred.cmp(), self.rows, &h2, ignore_histogram);
            let scale_factor = if result.is_empty() {
                self.rows.max(MIN_ROWS)
            } else {
                scale_factor
            };
            return (result, scale_factor);
        }
        (h1, DEFAULT_JOIN_SCALE_FACTOR)
    }

    fn join_cardinality(&self, other: &Statistics, scale_factors: &[f64], kind: JoinKind) -> f64 {
        let scale_factor = cumulative_join_scale_factor(&self.config, scale_factors);
        let cartesian = self.rows * other.rows;
        match kind {
            JoinKind::LeftAntiSemi { .. } => (self.rows / scale_factor).max(MIN_ROWS),
            JoinKind::LeftSemi => (cartesian / scale_factor).min(self.rows).max(MIN_ROWS),
            JoinKind::Inner => (cartesian / scale_factor).max(MIN_ROWS),
        }
    }

    fn join(&self, other: &Statistics, preds: &JoinPredicates, kind: JoinKind) -> Statistics {
        let semi = kind.is_semi();
        let lasj = matches!(kind, JoinKind::LeftAntiSemi { .. });
        let left_columns: ColumnSet = preds.preds.iter().map(JoinPred::left).collect();
        let right_columns: ColumnSet = preds.preds.iter().map(JoinPred::right).collect();

        let mut histograms: HistogramMap = self
            .histograms
            .iter()
            .filter(|(c, _)| !left_columns.contains(*c))
            .map(|(c, h)| (*c, h.clone()))
            .collect();
        if !semi {
            histograms.extend(
                other
                    .histograms
                    .iter()
                    .filter(|(c, _)| !right_columns.contains(*c))
                    .map(|(c, h)| (*c, h.clone())),
            );
        }

        let input_empty = if lasj {
            self.empty
        } else {
            self.empty || other.empty
        };
        let mut output_empty = false;
        let mut scale_factors = Vec::with_capacity(preds.preds.len());
        for pred in &preds.preds {
            let h1 = histogram_or_undefined(&self.histograms, pred.left());
            let h2 = histogram_or_undefined(&other.histograms, pred.right());
            let left_after = match kind {
                JoinKind::LeftAntiSemi { ignore_histogram } => {
                    let (left_after, scale_factor) =
                        self.lasj_histogram(other, pred, input_empty, ignore_histogram);
                    scale_factors.push(scale_factor);
                    left_after
                }
                JoinKind::Inner | JoinKind::LeftSemi => {
                    let (left_after, right_after, scale_factor) =
                        self.inner_join_histograms(other, pred, input_empty);
                    scale_factors.push(scale_factor);
                    if !semi {
                        histograms.insert(pred.right(), right_after);
                    }
                    left_after
                }
            };
            output_empty = output_empty
                || (!lasj && self.empty)
                || (!h1.is_empty() && !h2.is_empty() && left_after.is_empty());
            histograms.insert(pred.left(), left_after);
        }

        let rows = if output_empty || input_empty {
            MIN_ROWS
        } else {
            self.join_cardinality(other, &scale_factors, kind)
        };
        trace!(
            "{:?} join with scale factors {:?}: {} x {} rows -> {} rows",
            kind,
            scale_factors,
            self.rows,
            other.rows,
            rows
        );

        let mut widths = self.widths.clone();
        if !semi {
            widths.extend(other.widths.iter().map(|(c, w)| (*c, *w)));
        }
        let mut result = Self::derived(
            histograms,
            widths,
            rows,
            output_empty || input_empty,
            self.num_predicates + other.num_predicates + preds.preds.len(),
            self.config.clone(),
        );
        result.estimation_risk = self.estimation_risk.max(other.estimation_risk);
        let mut result = result.with_upper_bounds_from(self, CardBoundingMethod::Min);
        if !semi {
            result = result.with_upper_bounds_from(other, CardBoundingMethod::Min);
        }

        // conjuncts the histograms cannot join on still filter the result
        match &preds.unsupported {
            Some(pred) if !pred.is_empty() => result.filter(pred, false),
            _ => result,
        }
    }

    /// Estimated number of groups of `grouping` columns.
    ///
    /// Columns of one source are combined first and bounded by the source's cardinality, then
    /// the sources are combined. With `keys` only the key columns are considered.
    pub fn groups(&self, grouping: &ColumnSet, keys: Option<&ColumnSet>) -> f64 {
        let ndv_of = |column: &ColumnRef| match self.histograms.get(column) {
            Some(h) if !h.is_empty() && h.is_well_defined() => h.distinct(),
            _ => default_distinct_values(self.rows),
        };

        let by_source = grouping
            .iter()
            .filter(|c| keys.map_or(true, |keys| keys.contains(*c)))
            .into_group_map_by(|c| self.upper_bound_index(**c));

        let mut ndvs = vec![];
        for (source, columns) in by_source.into_iter().sorted_by_key(|(source, _)| *source) {
            let source_ndvs: Vec<f64> = columns.iter().map(|c| ndv_of(*c)).collect();
            match source {
                None => ndvs.extend(source_ndvs),
                Some(idx) => {
                    let bound = self.rows.min(self.upper_bounds[idx].upper_bound());
                    let groups = combined_distinct_values(&self.config, &source_ndvs)
                        .max(MIN_ROWS)
                        .min(bound);
                    ndvs.push(groups);
                }
            }
        }
        combined_distinct_values(&self.config, &ndvs)
            .max(MIN_ROWS)
            .min(self.rows)
    }

    /// Statistics of a group-by on `grouping` computing the `aggregates` columns.
    pub fn group_by(
        &self,
        grouping: &ColumnSet,
        aggregates: &ColumnSet,
        keys: Option<&ColumnSet>,
    ) -> Statistics {
        let mut histograms = HistogramMap::new();
        let mut widths = BTreeMap::new();
        for column in aggregates {
            histograms.insert(*column, Histogram::default_for(column.data_type(), self.empty));
            widths.insert(*column, DEFAULT_COLUMN_WIDTH);
        }

        let rows = if self.empty {
            for column in grouping {
                histograms.insert(*column, Histogram::default_for(column.data_type(), true));
            }
            MIN_ROWS
        } else {
            for column in grouping {
                let histogram = match self.histograms.get(column) {
                    Some(h) => {
                        let (grouped, _) = h.group_by_normalized();
                        grouped.with_ndv_scaled(h.is_ndv_scaled())
                    }
                    None => Histogram::undefined(),
                };
                histograms.insert(*column, histogram);
            }
            self.groups(grouping, keys)
        };
        for column in grouping {
            let width = self
                .widths
                .get(column)
                .copied()
                .unwrap_or(DEFAULT_COLUMN_WIDTH);
            widths.insert(*column, width);
        }
        trace!(
            "group by {} columns on {} rows: {} groups",
            grouping.len(),
            self.rows,
            rows
        );

        let mut result = Self::derived(
            histograms,
            widths,
            rows,
            self.empty,
            self.num_predicates,
            self.config.clone(),
        );
        result.estimation_risk = self.estimation_risk;
        result.with_upper_bounds_from(self, CardBoundingMethod::Min)
    }

    /// Statistics of a projection onto `columns`. Columns unknown to the input are computed by
    /// the projection; those in `constants` always hold the given value.
    pub fn project(
        &self,
        columns: &[ColumnRef],
        constants: &BTreeMap<ColumnRef, Datum>,
    ) -> Statistics {
        let mut histograms = HistogramMap::new();
        let mut widths = BTreeMap::new();
        let mut computed = ColumnSet::new();
        for column in columns {
            let histogram = match (self.histograms.get(column), constants.get(column)) {
                (Some(h), _) => h.clone(),
                (None, Some(datum)) if datum.is_null() => {
                    Histogram::with_remainders(vec![], true, 1.0, 0.0, 0.0)
                }
                (None, Some(datum)) => {
                    Histogram::new(vec![Bucket::singleton_of(Point::new(datum.clone()), 1.0)])
                }
                (None, None) => Histogram::default_for(column.data_type(), self.empty),
            };
            if !self.histograms.contains_key(column) {
                computed.insert(*column);
            }
            histograms.insert(*column, histogram);
            let width = self
                .widths
                .get(column)
                .copied()
                .unwrap_or(DEFAULT_COLUMN_WIDTH);
            widths.insert(*column, width);
        }

        let mut result = Self::derived(
            histograms,
            widths,
            self.rows,
            self.empty,
            self.num_predicates,
            self.config.clone(),
        );
        result.rebinds = self.rebinds;
        result.estimation_risk = self.estimation_risk;
        let mut result = result.with_upper_bounds_from(self, CardBoundingMethod::InputSourceMaxCard);
        if !computed.is_empty() {
            result
                .upper_bounds
                .push(UpperBoundNdvs::new(computed, self.rows));
        }
        result
    }

    /// `UNION ALL` of `self` and `other`, whose columns `left` and `right` feed `output`
    /// position by position.
    pub fn union_all(
        &self,
        other: &Statistics,
        output: &[ColumnRef],
        left: &[ColumnRef],
        right: &[ColumnRef],
    ) -> Statistics {
        if self.empty && other.empty {
            return Self::empty(output, self.config.clone());
        }
        let (rows1, rows2) = (self.rows, other.rows);
        let mut histograms = HistogramMap::new();
        let mut widths = BTreeMap::new();
        for ((out, l), r) in output.iter().zip(left).zip(right) {
            let h1 = histogram_or_undefined(&self.histograms, *l);
            let h2 = histogram_or_undefined(&other.histograms, *r);
            let histogram = if h1.is_well_defined() || h2.is_well_defined() {
                h1.union_all_normalized(rows1, &h2, rows2)
            } else {
                Histogram::default_for(out.data_type(), false)
            };
            histograms.insert(*out, histogram);
            let width = self.widths.get(l).copied().unwrap_or(DEFAULT_COLUMN_WIDTH);
            widths.insert(*out, width);
        }
        let rows = rows1 + rows2;
        let mut result = Self::derived(histograms, widths, rows, false, 0, self.config.clone());
        result.estimation_risk = self.estimation_risk.max(other.estimation_risk);
        result.upper_bounds.push(UpperBoundNdvs::new(
            output.iter().copied().collect(),
            rows,
        ));
        result
    }

    /// At most `count` rows of the input.
    pub fn limit(&self, count: f64) -> Statistics {
        let histograms = if self.empty {
            self.empty_histograms()
        } else {
            self.histograms.clone()
        };
        let rows = self.rows.min(count).max(MIN_ROWS);
        let mut result = Self::derived(
            histograms,
            self.widths.clone(),
            rows,
            self.empty,
            self.num_predicates,
            self.config.clone(),
        );
        result.rebinds = self.rebinds;
        result.estimation_risk = self.estimation_risk;
        result.with_upper_bounds_from(self, CardBoundingMethod::Min)
    }

    /// The same relation with `factor` times the rows.
    pub fn scale(&self, factor: f64) -> Statistics {
        let mut result = Self::derived(
            self.histograms.clone(),
            self.widths.clone(),
            self.rows * factor,
            self.empty,
            self.num_predicates,
            self.config.clone(),
        );
        result.rebinds = self.rebinds;
        result.estimation_risk = self.estimation_risk;
        result.with_upper_bounds_from(self, CardBoundingMethod::Min)
    }

    /// Renames columns according to `mapping`. Columns without a mapping are kept unless
    /// `must_exist` is set, in which case they are dropped.
    pub fn copy_with_remap(
        &self,
        mapping: &BTreeMap<ColumnRef, ColumnRef>,
        must_exist: bool,
    ) -> Statistics {
        let remap = |column: &ColumnRef| match mapping.get(column) {
            Some(mapped) => Some(*mapped),
            None if must_exist => None,
            None => Some(*column),
        };
        let histograms = self
            .histograms
            .iter()
            .filter_map(|(c, h)| remap(c).map(|c| (c, h.clone())))
            .collect();
        let widths = self
            .widths
            .iter()
            .filter_map(|(c, w)| remap(c).map(|c| (c, *w)))
            .collect();
        let mut result = Self::derived(
            histograms,
            widths,
            self.rows,
            self.empty,
            self.num_predicates,
            self.config.clone(),
        );
        result.rebinds = self.rebinds;
        result.estimation_risk = self.estimation_risk;
        result.upper_bounds = self
            .upper_bounds
            .iter()
            .map(|ub| ub.remapped(mapping, must_exist))
            .collect();
        result
    }
}

fn histogram_or_undefined(histograms: &HistogramMap, column: ColumnRef) -> Histogram {
    histograms
        .get(&column)
        .cloned()
        .unwrap_or_else(Histogram::undefined)
}

fn cap_histogram_ndvs(histograms: &mut HistogramMap, rows: f64) {
    for histogram in histograms.values_mut() {
        *histogram = histogram.cap_ndvs(rows);
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "rows: {:.2}, rebinds: {:.2}, empty: {}",
            self.rows, self.rebinds, self.empty
        )?;
        for (column, histogram) in &self.histograms {
            writeln!(f, "{} ({}):", column.id(), column.data_type())?;
            writeln!(f, "{}", histogram)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DataType;
    use crate::operator::ColumnFactory;

    fn int(v: i64) -> Point {
        Point::new(Datum::Int(v))
    }

    /// One closed bucket `[0, 9]` holding ten distinct values.
    fn ten_values() -> Histogram {
        Histogram::new(vec![Bucket::new(int(0), int(9), true, true, 1.0, 10.0)])
    }

    fn table(factory: &ColumnFactory, rows: f64) -> (ColumnRef, Statistics) {
        let source = factory.new_source();
        let column = factory.table_column(source, DataType::Int, false);
        let histograms = [(column, ten_values())].into_iter().collect();
        let widths = [(column, 8.0)].into_iter().collect();
        let stats = Statistics::new(
            histograms,
            widths,
            rows,
            StatisticsConfig::shared_default(),
        );
        (column, stats)
    }

    fn equi_join(left: ColumnRef, right: ColumnRef) -> JoinPredicates {
        JoinPredicates {
            preds: vec![JoinPred::new(left, CmpType::Eq, right)],
            unsupported: None,
        }
    }

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 1e-6,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_equi_join_cardinality() {
        let factory = ColumnFactory::new();
        let (a, left) = table(&factory, 100.0);
        let (b, right) = table(&factory, 100.0);
        let joined = left.inner_join(&right, &equi_join(a, b));
        assert_close(1000.0, joined.rows());
        assert!(joined.histogram(a).is_some());
        assert!(joined.histogram(b).is_some());
        assert_eq!(1, joined.num_predicates());
    }

    #[test]
    fn test_join_is_symmetric() {
        let factory = ColumnFactory::new();
        let (a, left) = table(&factory, 100.0);
        let (b, right) = table(&factory, 300.0);
        let pred = equi_join(a, b);
        let swapped = JoinPredicates {
            preds: pred.preds.iter().map(JoinPred::swapped).collect(),
            unsupported: None,
        };
        assert_close(
            left.inner_join(&right, &pred).rows(),
            right.inner_join(&left, &swapped).rows(),
        );
    }

    #[test]
    fn test_semi_and_anti_semi_joins() {
        let factory = ColumnFactory::new();
        let (a, left) = table(&factory, 100.0);
        let (b, right) = table(&factory, 100.0);
        let preds = equi_join(a, b);

        let semi = left.left_semi_join(&right, &preds);
        assert!(semi.rows() <= left.rows());
        assert!(semi.histogram(b).is_none());

        let anti = left.left_anti_semi_join_default(&right, &preds);
        assert!(anti.rows() < left.rows());

        let outer = left.left_outer_join(&right, &preds);
        assert!(outer.rows() >= left.rows());
    }

    #[test]
    fn test_filter_never_increases_rows() {
        let factory = ColumnFactory::new();
        let (a, stats) = table(&factory, 100.0);
        for pred in [
            StatsPred::point(a, CmpType::L, int(5)),
            StatsPred::point(a, CmpType::Eq, int(100)),
            StatsPred::point(a, CmpType::NEq, int(3)),
            StatsPred::always_true(),
        ] {
            let filtered = stats.filter(&pred, true);
            assert!(filtered.rows() <= stats.rows());
            assert!(filtered.rows() >= MIN_ROWS);
        }
    }

    #[test]
    fn test_group_by_bounded_by_rows() {
        let factory = ColumnFactory::new();
        let (a, stats) = table(&factory, 100.0);
        let grouped = stats.group_by(&[a].into_iter().collect(), &ColumnSet::new(), None);
        assert_close(10.0, grouped.rows());

        let (b, small) = table(&factory, 4.0);
        let grouped = small.group_by(&[b].into_iter().collect(), &ColumnSet::new(), None);
        assert_close(4.0, grouped.rows());
    }

    #[test]
    fn test_project_constant_and_remap() {
        let factory = ColumnFactory::new();
        let (a, stats) = table(&factory, 100.0);
        let constant = factory.computed_column(DataType::Int);
        let flag = factory.computed_column(DataType::Bool);
        let constants = [(constant, Datum::Int(7))].into_iter().collect();
        let projected = stats.project(&[a, constant, flag], &constants);
        assert_close(1.0, projected.histogram(constant).unwrap().distinct());
        assert!(projected.histogram(flag).unwrap().is_well_defined());
        assert_close(100.0, projected.upper_bound(constant));

        let renamed = factory.computed_column(DataType::Int);
        let remapped = stats.copy_with_remap(&[(a, renamed)].into_iter().collect(), true);
        assert!(remapped.histogram(a).is_none());
        assert_eq!(stats.histogram(a), remapped.histogram(renamed));
        assert_close(stats.upper_bound(a), remapped.upper_bound(renamed));
    }

    #[test]
    fn test_union_all_limit_and_scale() {
        let factory = ColumnFactory::new();
        let (a, left) = table(&factory, 100.0);
        let (b, right) = table(&factory, 50.0);
        let out = factory.computed_column(DataType::Int);
        let union = left.union_all(&right, &[out], &[a], &[b]);
        assert_close(150.0, union.rows());
        assert!(union.histogram(out).unwrap().is_well_defined());

        assert_close(10.0, left.limit(10.0).rows());
        assert_close(100.0, left.limit(1000.0).rows());
        assert_close(250.0, left.scale(2.5).rows());
        assert_close(10.0, left.ndv(a));
    }
}
