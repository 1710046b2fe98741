//! Expression preprocessing.
//!
//! Before exploration starts, the logical expression is run through a fixed sequence of
//! whole-tree rewrites. Each rewrite is a [`PreprocessPass`]; the [`Preprocessor`] applies them in
//! the order given by [`default_passes`], polling for cancellation between passes. Passes are
//! pure functions from tree to tree: unchanged subtrees are shared with the input.
//!
//! Some passes are switched by [`TraceFlag`](crate::config::TraceFlag)s of the
//! [`PreprocessorConfig`](crate::config::PreprocessorConfig), see each pass for details.

use std::time::Instant;

use log::{debug, info, trace};

use crate::config::TraceFlag;
use crate::error::OptResult;
use crate::expr::ExprRef;

mod boolean;
pub use boolean::*;
mod context;
pub use context::*;
mod cte;
pub use cte::*;
mod factorize;
pub use factorize::*;
mod infer;
pub use infer::*;
mod join;
pub use join::*;
mod limit;
pub use limit::*;
mod normalizer;
pub use normalizer::*;
mod outer_refs;
pub use outer_refs::*;
mod pass;
pub use pass::*;
mod project;
pub use project::*;
mod prune;
pub use prune::*;
mod subquery;
pub use subquery::*;
#[cfg(test)]
mod testing;
mod union;
pub use union::*;
mod window;
pub use window::*;

/// Runs a sequence of preprocessing passes over an expression.
pub struct Preprocessor {
    passes: Vec<PassImpl>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::with_passes(default_passes())
    }

    pub fn with_passes(passes: Vec<PassImpl>) -> Self {
        Self { passes }
    }

    pub fn passes(&self) -> &[PassImpl] {
        &self.passes
    }

    /// Applies all passes in order.
    ///
    /// Fails without a partial result when the run is cancelled or the tree is nested deeper
    /// than the configured recursion limit.
    pub fn preprocess(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        let print_stats = ctx.trace_flag(TraceFlag::PrintOptimizationStatistics);
        let total = Instant::now();
        let mut current = expr.clone();
        for pass in &self.passes {
            ctx.check_cancelled()?;
            debug!("Applying preprocessing pass {}", pass);
            let start = Instant::now();
            current = pass.apply(&current, ctx)?;
            if print_stats {
                info!("Preprocessing pass {} took {:?}", pass, start.elapsed());
            }
            trace!("Expression after {}:\n{}", pass, current);
        }
        if print_stats {
            info!(
                "Preprocessing took {:?}, {} nodes in result",
                total.elapsed(),
                current.node_count()
            );
        }
        Ok(current)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
