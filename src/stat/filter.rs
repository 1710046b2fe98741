//! Histogram maps after conjunctive and disjunctive filters.

use std::collections::BTreeMap;

use log::trace;

use crate::config::StatisticsConfig;
use crate::operator::{ColumnRef, ColumnSet};
use crate::stat::scale_factor::{cumulative_conj_scale_factor, cumulative_disj_scale_factor};
use crate::stat::{Histogram, StatsPred, DEFAULT_SCALE_FACTOR, EPSILON, MIN_ROWS};

pub(crate) type HistogramMap = BTreeMap<ColumnRef, Histogram>;

/// Filters histograms of one relation; produces new histograms and the combined scale factor.
pub(crate) struct FilterEstimator<'a> {
    config: &'a StatisticsConfig,
}

fn histogram_of(histograms: &HistogramMap, column: ColumnRef) -> Histogram {
    histograms
        .get(&column)
        .cloned()
        .unwrap_or_else(Histogram::undefined)
}

impl<'a> FilterEstimator<'a> {
    pub(crate) fn new(config: &'a StatisticsConfig) -> Self {
        Self { config }
    }

    /// Dispatches on the shape of `pred`; anything that is not a disjunction is treated as a
    /// conjunction of one.
    pub(crate) fn estimate(
        &self,
        input: &HistogramMap,
        input_rows: f64,
        pred: &StatsPred,
    ) -> (HistogramMap, f64) {
        match pred {
            StatsPred::Disj(children) => self.disjunction(input, input_rows, pred, children),
            StatsPred::Conj(children) => self.conjunction(input, input_rows, children),
            other => self.conjunction(input, input_rows, std::slice::from_ref(other)),
        }
    }

    /// Applies a non-compound predicate on one column.
    fn simple(&self, pred: &StatsPred, before: &Histogram) -> (Histogram, f64) {
        let (after, scale_factor) = match pred {
            StatsPred::Point(p) => before.filter_normalized(p.cmp(), p.point()),
            StatsPred::Like(p) => (before.clone(), p.scale_factor()),
            StatsPred::Unsupported(p) => (before.clone(), p.scale_factor()),
            StatsPred::Conj(_) | StatsPred::Disj(_) => (before.clone(), 1.0),
        };
        // scaling an empty column means nothing
        if before.is_empty() {
            (after, DEFAULT_SCALE_FACTOR)
        } else {
            (after, scale_factor)
        }
    }

    fn conjunction(
        &self,
        input: &HistogramMap,
        input_rows: f64,
        children: &[StatsPred],
    ) -> (HistogramMap, f64) {
        let mut result = input.clone();
        let mut scale_factors = vec![];
        let mut last_scale_factor = 1.0;
        let mut last_column: Option<ColumnRef> = None;
        let mut started = false;

        for child in StatsPred::sorted_children(children) {
            if child.is_unsupported_on_expression() {
                scale_factors.extend(child.as_unsupported().map(|p| p.scale_factor()));
                continue;
            }
            let column = child.column();
            if started && (column.is_none() || column != last_column) {
                scale_factors.push(last_scale_factor);
                last_scale_factor = 1.0;
            }
            started = true;

            match (child.is_conj_or_disj(), column) {
                (false, Some(column)) => {
                    let (after, scale_factor) = self.simple(child, &histogram_of(&result, column));
                    if histogram_of(input, column).is_empty() {
                        last_scale_factor = DEFAULT_SCALE_FACTOR;
                    } else {
                        last_scale_factor *= scale_factor;
                    }
                    result.insert(column, after);
                }
                (true, Some(column)) => {
                    // the rows entering a single column disjunction are what the column's
                    // earlier predicates left over
                    let rows = (input_rows / last_scale_factor).max(MIN_ROWS);
                    let (after, scale_factor) = self.estimate(&result, rows, child);
                    result.insert(column, histogram_of(&after, column));
                    last_scale_factor *= scale_factor;
                }
                (_, None) => {
                    let (after, scale_factor) = self.estimate(&result, input_rows, child);
                    result = after;
                    last_scale_factor = scale_factor;
                }
            }
            last_column = column;
        }
        scale_factors.push(last_scale_factor);

        let scale_factor = cumulative_conj_scale_factor(self.config, &scale_factors);
        trace!(
            "conjunction of {} predicates over {} rows: scale factor {}",
            children.len(),
            input_rows,
            scale_factor
        );
        (result, scale_factor)
    }

    /// Columns whose histograms a multi-column disjunction must leave alone because some
    /// disjunct does not restrict them.
    fn non_updatable_columns(disjunction: &StatsPred, children: &[StatsPred]) -> ColumnSet {
        if disjunction.column().is_some() {
            return ColumnSet::new();
        }
        let all = disjunction.used_columns();
        let mut result = ColumnSet::new();
        for child in children {
            let used = child.used_columns();
            if used.len() < all.len() {
                result.extend(all.difference(&used).copied());
            }
        }
        result
    }

    fn disjunction(
        &self,
        input: &HistogramMap,
        input_rows: f64,
        disjunction: &StatsPred,
        children: &[StatsPred],
    ) -> (HistogramMap, f64) {
        let non_updatable = Self::non_updatable_columns(disjunction, children);
        let mut result = HistogramMap::new();
        let mut scale_factors = vec![];

        let mut previous: Option<(ColumnRef, Histogram)> = None;
        let mut previous_column: Option<ColumnRef> = None;
        let mut previous_scale_factor = input_rows;
        let mut cumulative_rows = MIN_ROWS;
        let mut started = false;

        for child in StatsPred::sorted_children(children) {
            if child.is_unsupported_on_expression() {
                scale_factors.extend(child.as_unsupported().map(|p| p.scale_factor()));
                continue;
            }
            let column = child.column();
            if started && (column.is_none() || column != previous_column) {
                scale_factors.push(previous_scale_factor);
                Self::update_disjunction(
                    &mut result,
                    &non_updatable,
                    input_rows,
                    cumulative_rows,
                    previous.take(),
                );
            }
            started = true;

            let (child_histogram, child_histograms, child_scale_factor) =
                match (child.is_conj_or_disj(), column) {
                    (false, Some(column)) => {
                        let (after, scale_factor) =
                            self.simple(child, &histogram_of(input, column));
                        (Some(after), None, scale_factor)
                    }
                    _ => {
                        let (after, scale_factor) = self.estimate(input, input_rows, child);
                        let histogram = column.map(|c| histogram_of(&after, c));
                        (histogram, Some(after), scale_factor)
                    }
                };

            let child_rows = input_rows / child_scale_factor;
            match (column, child_histogram) {
                (Some(column), Some(child_histogram)) => {
                    let merged = match previous.take() {
                        None => {
                            cumulative_rows = child_rows;
                            child_histogram
                        }
                        Some((_, histogram)) => {
                            let (merged, rows) = histogram.union_normalized(
                                cumulative_rows,
                                &child_histogram,
                                child_rows,
                            );
                            cumulative_rows = rows;
                            merged
                        }
                    };
                    previous = Some((column, merged));
                    previous_scale_factor = input_rows / cumulative_rows.max(MIN_ROWS);
                }
                _ => {
                    let current_rows = input_rows
                        / cumulative_disj_scale_factor(self.config, &scale_factors, input_rows);
                    if let Some(child_histograms) = child_histograms {
                        result = Self::merge_disjunct(
                            &non_updatable,
                            &result,
                            &child_histograms,
                            current_rows,
                            child_rows,
                        );
                    }
                    previous = None;
                    previous_scale_factor = child_scale_factor;
                }
            }
            previous_column = column;
        }

        Self::update_disjunction(
            &mut result,
            &non_updatable,
            input_rows,
            cumulative_rows,
            previous.take(),
        );
        scale_factors.push(previous_scale_factor.max(MIN_ROWS));
        let scale_factor = cumulative_disj_scale_factor(self.config, &scale_factors, input_rows);

        for (column, histogram) in input {
            result.entry(*column).or_insert_with(|| histogram.clone());
        }
        trace!(
            "disjunction of {} predicates over {} rows: scale factor {}",
            children.len(),
            input_rows,
            scale_factor
        );
        (result, scale_factor)
    }

    /// Folds the histogram built for the previous column into the disjunction's result.
    fn update_disjunction(
        result: &mut HistogramMap,
        non_updatable: &ColumnSet,
        input_rows: f64,
        local_rows: f64,
        previous: Option<(ColumnRef, Histogram)>,
    ) {
        let Some((column, histogram)) = previous else {
            return;
        };
        if non_updatable.contains(&column) {
            return;
        }
        let histogram = match result.get(&column) {
            Some(existing) => histogram.union_normalized(input_rows, existing, local_rows).0,
            None => histogram,
        };
        result.insert(column, histogram);
    }

    /// Unions the histograms of a multi-column disjunct into the disjunction's result.
    fn merge_disjunct(
        non_updatable: &ColumnSet,
        result: &HistogramMap,
        child: &HistogramMap,
        cumulative_rows: f64,
        child_rows: f64,
    ) -> HistogramMap {
        let empty = child_rows <= EPSILON;
        let mut merged = HistogramMap::new();
        for (column, histogram) in child {
            if non_updatable.contains(column) {
                continue;
            }
            if empty {
                merged.insert(*column, Histogram::undefined());
            } else {
                merged.insert(*column, histogram.clone());
            }
        }
        for (column, histogram) in result {
            if non_updatable.contains(column) {
                continue;
            }
            match child.get(column) {
                Some(child_histogram) if !empty => {
                    let (union, _) =
                        histogram.union_normalized(cumulative_rows, child_histogram, child_rows);
                    merged.insert(*column, union);
                }
                _ => {
                    merged.insert(*column, histogram.clone());
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{DataType, Datum};
    use crate::operator::{CmpType, ColumnFactory};
    use crate::stat::{Bucket, Point, UnsupportedPred};

    fn point(v: i64) -> Point {
        Point::new(Datum::Int(v))
    }

    /// Ten buckets `[0,10) .. [90,100]` with ten distinct values each.
    fn uniform() -> Histogram {
        let buckets = (0..10)
            .map(|i| {
                Bucket::new(
                    point(i * 10),
                    point(i * 10 + 10),
                    true,
                    i == 9,
                    0.1,
                    10.0,
                )
            })
            .collect();
        Histogram::new(buckets)
    }

    fn fixture() -> (ColumnRef, ColumnRef, HistogramMap) {
        let factory = ColumnFactory::new();
        let source = factory.new_source();
        let a = factory.table_column(source, DataType::Int, true);
        let b = factory.table_column(source, DataType::Int, true);
        let histograms = [(a, uniform()), (b, uniform())].into_iter().collect();
        (a, b, histograms)
    }

    fn assert_close(expected: f64, actual: f64, tolerance: f64) {
        assert!(
            (expected - actual).abs() < tolerance,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_range_on_one_column() {
        let config = StatisticsConfig::new();
        let (a, b, histograms) = fixture();
        let pred = StatsPred::Conj(vec![
            StatsPred::point(a, CmpType::GEq, point(20)),
            StatsPred::point(a, CmpType::L, point(40)),
        ]);
        let (result, sf) = FilterEstimator::new(&config).estimate(&histograms, 1000.0, &pred);
        // both bounds narrow the same histogram so no damping applies
        assert_close(5.0, sf, 0.2);
        assert!(result[&a].frequency() > 0.99);
        assert_eq!(histograms[&b], result[&b]);
    }

    #[test]
    fn test_independent_columns_are_damped() {
        let config = StatisticsConfig::new();
        let (a, b, histograms) = fixture();
        let pred = StatsPred::Conj(vec![
            StatsPred::point(a, CmpType::L, point(50)),
            StatsPred::point(b, CmpType::L, point(50)),
        ]);
        let (_, sf) = FilterEstimator::new(&config).estimate(&histograms, 1000.0, &pred);
        assert!(sf > 2.0 && sf < 4.0, "scale factor {}", sf);
    }

    #[test]
    fn test_single_column_disjunction() {
        let config = StatisticsConfig::new();
        let (a, _, histograms) = fixture();
        let pred = StatsPred::Disj(vec![
            StatsPred::point(a, CmpType::L, point(10)),
            StatsPred::point(a, CmpType::GEq, point(90)),
        ]);
        let (result, sf) = FilterEstimator::new(&config).estimate(&histograms, 1000.0, &pred);
        assert_close(5.0, sf, 0.5);
        assert_eq!(2, result[&a].buckets().len());
    }

    #[test]
    fn test_multi_column_disjunction_keeps_histograms() {
        let config = StatisticsConfig::new();
        let (a, b, histograms) = fixture();
        let pred = StatsPred::Disj(vec![
            StatsPred::point(a, CmpType::L, point(10)),
            StatsPred::point(b, CmpType::L, point(10)),
        ]);
        let (result, sf) = FilterEstimator::new(&config).estimate(&histograms, 1000.0, &pred);
        assert!(sf > 1.0 && sf < 10.0, "scale factor {}", sf);
        assert_eq!(histograms[&a], result[&a]);
        assert_eq!(histograms[&b], result[&b]);
    }

    #[test]
    fn test_unsupported_expression() {
        let config = StatisticsConfig::new();
        let (_, _, histograms) = fixture();
        let pred = StatsPred::Conj(vec![StatsPred::Unsupported(UnsupportedPred::new(
            None,
            CmpType::Other,
        ))]);
        let (result, sf) = FilterEstimator::new(&config).estimate(&histograms, 1000.0, &pred);
        assert_close(DEFAULT_SCALE_FACTOR, sf, 1e-9);
        assert_eq!(histograms, result);
    }
}
