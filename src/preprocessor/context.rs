use std::cell::Cell;

use enumset::{EnumSet, EnumSetType};
use strum_macros::Display;

use crate::config::{CancellationToken, PreprocessorConfig, TraceFlag};
use crate::error::{OptError, OptResult};
use crate::metadata::MetadataAccessor;
use crate::operator::{ColumnFactory, ColumnSet, CteInfo};

/// Exploration transforms the preprocessor may switch off for the search that follows it.
#[derive(EnumSetType, Debug, Display)]
pub enum JoinXform {
    JoinCommutativity,
    JoinAssociativity,
}

/// Everything a preprocessing pass may consult besides the tree it rewrites.
///
/// The context is shared by all passes of one run. Interior state (the recursion depth and the
/// disabled transforms) lives in `Cell`s so passes only ever need `&PreprocessContext`.
pub struct PreprocessContext<'a> {
    config: &'a PreprocessorConfig,
    metadata: &'a dyn MetadataAccessor,
    column_factory: &'a ColumnFactory,
    cte_info: Option<&'a CteInfo>,
    cancellation: CancellationToken,
    /// Query output columns and the columns used by its order spec.
    required_columns: Option<ColumnSet>,
    depth: Cell<usize>,
    disabled_xforms: Cell<EnumSet<JoinXform>>,
}

impl<'a> PreprocessContext<'a> {
    pub fn new(
        config: &'a PreprocessorConfig,
        metadata: &'a dyn MetadataAccessor,
        column_factory: &'a ColumnFactory,
    ) -> Self {
        Self {
            config,
            metadata,
            column_factory,
            cte_info: None,
            cancellation: CancellationToken::new(),
            required_columns: None,
            depth: Cell::new(0),
            disabled_xforms: Cell::new(EnumSet::empty()),
        }
    }

    pub fn with_cte_info(mut self, cte_info: &'a CteInfo) -> Self {
        self.cte_info = Some(cte_info);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_required_columns(mut self, columns: ColumnSet) -> Self {
        self.required_columns = Some(columns);
        self
    }

    pub fn config(&self) -> &PreprocessorConfig {
        self.config
    }

    pub fn trace_flag(&self, flag: TraceFlag) -> bool {
        self.config.trace_flag(flag)
    }

    pub fn metadata(&self) -> &dyn MetadataAccessor {
        self.metadata
    }

    pub fn column_factory(&self) -> &ColumnFactory {
        self.column_factory
    }

    pub fn cte_info(&self) -> Option<&CteInfo> {
        self.cte_info
    }

    pub fn required_columns(&self) -> Option<&ColumnSet> {
        self.required_columns.as_ref()
    }

    pub fn check_cancelled(&self) -> OptResult<()> {
        self.cancellation.check()
    }

    /// Enters one level of recursion.
    ///
    /// Fails when the run was cancelled or the configured depth limit is exceeded. The returned
    /// guard leaves the level again when dropped.
    pub fn enter(&self) -> OptResult<DepthGuard<'_>> {
        self.cancellation.check()?;
        let depth = self.depth.get() + 1;
        let limit = self.config.max_recursion_depth();
        if depth > limit {
            return Err(OptError::RecursionLimitExceeded { depth, limit }.into());
        }
        self.depth.set(depth);
        Ok(DepthGuard { depth: &self.depth })
    }

    pub fn disable_xform(&self, xform: JoinXform) {
        let mut disabled = self.disabled_xforms.get();
        disabled.insert(xform);
        self.disabled_xforms.set(disabled);
    }

    pub fn disabled_xforms(&self) -> EnumSet<JoinXform> {
        self.disabled_xforms.get()
    }
}

pub struct DepthGuard<'c> {
    depth: &'c Cell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InMemoryMetadata;

    #[test]
    fn test_depth_guard() {
        let config = PreprocessorConfig::new().with_max_recursion_depth(2);
        let metadata = InMemoryMetadata::standard();
        let factory = ColumnFactory::new();
        let ctx = PreprocessContext::new(&config, &metadata, &factory);
        {
            let _first = ctx.enter().unwrap();
            let _second = ctx.enter().unwrap();
            let err = ctx.enter().err().unwrap();
            assert_eq!(
                Some(&OptError::RecursionLimitExceeded { depth: 3, limit: 2 }),
                err.downcast_ref::<OptError>()
            );
        }
        assert!(ctx.enter().is_ok());
    }

    #[test]
    fn test_cancelled_run_stops_at_next_level() {
        let config = PreprocessorConfig::new();
        let metadata = InMemoryMetadata::standard();
        let factory = ColumnFactory::new();
        let token = CancellationToken::new();
        let ctx = PreprocessContext::new(&config, &metadata, &factory).with_cancellation(token.clone());
        assert!(ctx.enter().is_ok());
        token.cancel();
        let err = ctx.enter().err().unwrap();
        assert_eq!(Some(&OptError::Cancelled), err.downcast_ref::<OptError>());
    }
}
