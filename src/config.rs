//! Immutable configuration threaded through preprocessing and statistics derivation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use enumset::{EnumSet, EnumSetType};
use strum_macros::{Display, EnumIter};

use crate::error::{OptError, OptResult};

lazy_static! {
    static ref DEFAULT_STATISTICS_CONFIG: Arc<StatisticsConfig> =
        Arc::new(StatisticsConfig::new());
}

/// Numeric knobs of the cardinality estimator.
#[derive(Clone, Debug, PartialEq)]
pub struct StatisticsConfig {
    damping_factor_filter: f64,
    damping_factor_join: f64,
    damping_factor_group_by: f64,
    max_stats_buckets: usize,
    like: LikeSelectivityConfig,
    /// Anti semi joins skip the detailed histogram difference unless this is off.
    ignore_lasj_histogram: bool,
}

/// Empirically tuned constants of the LIKE pattern selectivity estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct LikeSelectivityConfig {
    pub fixed_char_selectivity: f64,
    pub fixed_char_rolloff: f64,
    pub any_char_selectivity: f64,
    pub anchor_selectivity: f64,
    pub max_scale_factor: f64,
}

impl Default for LikeSelectivityConfig {
    fn default() -> Self {
        Self {
            fixed_char_selectivity: 0.20,
            fixed_char_rolloff: 0.14,
            any_char_selectivity: 0.99,
            anchor_selectivity: 0.95,
            max_scale_factor: 150.0,
        }
    }
}

impl StatisticsConfig {
    pub fn new() -> Self {
        Self {
            damping_factor_filter: 0.75,
            damping_factor_join: 0.01,
            damping_factor_group_by: 0.75,
            max_stats_buckets: 100,
            like: LikeSelectivityConfig::default(),
            ignore_lasj_histogram: true,
        }
    }

    /// Shared process-wide default.
    pub fn shared_default() -> Arc<StatisticsConfig> {
        DEFAULT_STATISTICS_CONFIG.clone()
    }

    pub fn with_damping_factors(mut self, filter: f64, join: f64, group_by: f64) -> Self {
        self.damping_factor_filter = filter;
        self.damping_factor_join = join;
        self.damping_factor_group_by = group_by;
        self
    }

    pub fn with_like_config(mut self, like: LikeSelectivityConfig) -> Self {
        self.like = like;
        self
    }

    pub fn with_ignore_lasj_histogram(mut self, ignore: bool) -> Self {
        self.ignore_lasj_histogram = ignore;
        self
    }

    pub fn with_max_stats_buckets(mut self, buckets: usize) -> Self {
        self.max_stats_buckets = buckets;
        self
    }

    pub fn damping_factor_filter(&self) -> f64 {
        self.damping_factor_filter
    }

    pub fn damping_factor_join(&self) -> f64 {
        self.damping_factor_join
    }

    pub fn damping_factor_group_by(&self) -> f64 {
        self.damping_factor_group_by
    }

    pub fn max_stats_buckets(&self) -> usize {
        self.max_stats_buckets
    }

    pub fn like(&self) -> &LikeSelectivityConfig {
        &self.like
    }

    pub fn ignore_lasj_histogram(&self) -> bool {
        self.ignore_lasj_histogram
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Feature switches consulted by individual preprocessing passes.
#[derive(EnumSetType, Debug, Display, EnumIter)]
pub enum TraceFlag {
    /// Rewrite OR-chains of equalities on one column into `IN` lists.
    ArrayInConversion,
    DisablePruneUnusedComputedColumns,
    DisableOuterJoinToInnerJoinRewrite,
    /// Also drop superfluous limits sitting directly under a DML statement.
    RemoveOrderBelowDml,
    PrintOptimizationStatistics,
}

#[derive(Clone, Debug)]
pub struct PreprocessorConfig {
    trace_flags: EnumSet<TraceFlag>,
    /// Above this many join inputs, commutativity and associativity are disabled.
    join_arity_for_associativity_commutativity: usize,
    max_recursion_depth: usize,
    max_derived_predicates: usize,
}

impl PreprocessorConfig {
    pub fn new() -> Self {
        Self {
            trace_flags: EnumSet::empty(),
            join_arity_for_associativity_commutativity: 18,
            max_recursion_depth: 1000,
            max_derived_predicates: 50,
        }
    }

    pub fn with_trace_flag(mut self, flag: TraceFlag) -> Self {
        self.trace_flags.insert(flag);
        self
    }

    pub fn with_join_arity_limit(mut self, limit: usize) -> Self {
        self.join_arity_for_associativity_commutativity = limit;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn trace_flag(&self, flag: TraceFlag) -> bool {
        self.trace_flags.contains(flag)
    }

    pub fn trace_flags(&self) -> EnumSet<TraceFlag> {
        self.trace_flags
    }

    pub fn join_arity_limit(&self) -> usize {
        self.join_arity_for_associativity_commutativity
    }

    pub fn max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    pub fn max_derived_predicates(&self) -> usize {
        self.max_derived_predicates
    }
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative cancellation flag shared between the optimizing thread and whoever may abort it.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> OptResult<()> {
        if self.is_cancelled() {
            Err(OptError::Cancelled.into())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_trace_flags() {
        let config = PreprocessorConfig::new().with_trace_flag(TraceFlag::ArrayInConversion);
        assert!(config.trace_flag(TraceFlag::ArrayInConversion));
        for flag in TraceFlag::iter().filter(|f| *f != TraceFlag::ArrayInConversion) {
            assert!(!config.trace_flag(flag), "{} should be off", flag);
        }
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        let err = token.check().unwrap_err();
        assert_eq!(Some(&OptError::Cancelled), err.downcast_ref::<OptError>());
    }

    #[test]
    fn test_shared_default() {
        let config = StatisticsConfig::shared_default();
        assert_eq!(0.75, config.damping_factor_filter());
        assert_eq!(0.01, config.damping_factor_join());
        assert!(config.ignore_lasj_histogram());
    }
}
