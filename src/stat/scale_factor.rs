//! Combination of per-predicate scale factors.
//!
//! Multiplying the scale factors of independent predicates overestimates selectivity when the
//! predicates are correlated, so every additional factor is damped by `damping^rank`.

use itertools::Itertools;
use log::trace;

use crate::config::StatisticsConfig;
use crate::stat::MIN_ROWS;

/// `damping^rank`, with the first factor applied undamped.
pub fn damped(damping: f64, rank: usize) -> f64 {
    if rank <= 1 {
        1.0
    } else {
        damping.powi(rank as i32)
    }
}

pub fn damped_filter(config: &StatisticsConfig, rank: usize) -> f64 {
    damped(config.damping_factor_filter(), rank)
}

pub fn damped_join(config: &StatisticsConfig, rank: usize) -> f64 {
    damped(config.damping_factor_join(), rank)
}

pub fn damped_group_by(config: &StatisticsConfig, rank: usize) -> f64 {
    damped(config.damping_factor_group_by(), rank)
}

/// Most selective first, each damped by its rank and floored at [`MIN_ROWS`].
fn cumulative_product(scale_factors: &[f64], damp: impl Fn(usize) -> f64) -> f64 {
    scale_factors
        .iter()
        .copied()
        .sorted_by(|a, b| b.total_cmp(a))
        .enumerate()
        .map(|(idx, sf)| (sf * damp(idx + 1)).max(MIN_ROWS))
        .product()
}

pub fn cumulative_join_scale_factor(config: &StatisticsConfig, scale_factors: &[f64]) -> f64 {
    let result = cumulative_product(scale_factors, |rank| damped_join(config, rank));
    trace!("join scale factors {:?} combined to {}", scale_factors, result);
    result
}

pub fn cumulative_conj_scale_factor(config: &StatisticsConfig, scale_factors: &[f64]) -> f64 {
    let result = cumulative_product(scale_factors, |rank| damped_filter(config, rank));
    trace!(
        "conjunction scale factors {:?} combined to {}",
        scale_factors,
        result
    );
    result
}

/// Adds up the rows each disjunct keeps, least selective first, and converts the damped sum
/// back into a scale factor of `total_rows`.
pub fn cumulative_disj_scale_factor(
    config: &StatisticsConfig,
    scale_factors: &[f64],
    total_rows: f64,
) -> f64 {
    if scale_factors.len() == 1 {
        return scale_factors[0];
    }
    let sorted: Vec<f64> = scale_factors
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect();
    let Some((first, rest)) = sorted.split_first() else {
        return 1.0;
    };
    let mut rows = total_rows / first;
    for (idx, sf) in rest.iter().enumerate() {
        rows += (total_rows / sf) * damped_filter(config, idx + 2);
    }
    let rows = rows.min(total_rows);
    let result = total_rows / rows.max(1.0);
    trace!(
        "disjunction scale factors {:?} over {} rows combined to {}",
        scale_factors,
        total_rows,
        result
    );
    result
}

/// Number of distinct combinations of columns with the given distinct counts.
pub fn combined_distinct_values(config: &StatisticsConfig, ndvs: &[f64]) -> f64 {
    let sorted: Vec<f64> = ndvs
        .iter()
        .copied()
        .sorted_by(|a, b| b.total_cmp(a))
        .collect();
    let Some((first, rest)) = sorted.split_first() else {
        return 1.0;
    };
    rest.iter().enumerate().fold(*first, |acc, (idx, ndv)| {
        acc * (ndv * damped_group_by(config, idx + 1)).max(1.0)
    })
}
