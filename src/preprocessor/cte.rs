use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::error::OptResult;
use crate::expr::ExprRef;
use crate::operator::{CteId, LogicalOperator};
use crate::preprocessor::{transform_up, PreprocessContext, PreprocessPass};

/// Splices out the anchors of CTEs that nothing consumes.
///
/// A CTE counts as consumed when the query, or the producer of another consumed CTE, reads it.
#[derive(Clone, Debug, Default)]
pub struct RemoveUnusedCteAnchors;

impl PreprocessPass for RemoveUnusedCteAnchors {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        let consumers = consumer_counts(expr, ctx)?;
        transform_up(expr, ctx, &|e| match e.logical_op() {
            Some(LogicalOperator::LogicalCteAnchor(id)) if !consumers.contains_key(id) => {
                debug!("Removing anchor of unused {}", id);
                Ok(e.child(0).clone())
            }
            _ => Ok(e.clone()),
        })
    }
}

/// Number of consumers of each CTE, following consumers inside producers.
pub fn consumer_counts(expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<BTreeMap<CteId, usize>> {
    let mut counts = BTreeMap::new();
    count_consumers(expr, ctx, &mut counts)?;

    if let Some(cte_info) = ctx.cte_info() {
        let mut worklist: Vec<CteId> = counts.keys().copied().collect();
        let mut visited = BTreeSet::new();
        while let Some(id) = worklist.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(producer) = cte_info.producer(id) {
                let mut nested = BTreeMap::new();
                count_consumers(producer, ctx, &mut nested)?;
                for (nested_id, count) in nested {
                    *counts.entry(nested_id).or_insert(0) += count;
                    worklist.push(nested_id);
                }
            }
        }
    }
    Ok(counts)
}

fn count_consumers(
    expr: &ExprRef,
    ctx: &PreprocessContext,
    counts: &mut BTreeMap<CteId, usize>,
) -> OptResult<()> {
    let _guard = ctx.enter()?;
    if let Some(LogicalOperator::LogicalCteConsumer(consumer)) = expr.logical_op() {
        *counts.entry(consumer.id()).or_insert(0) += 1;
    }
    for child in expr.children() {
        count_consumers(child, ctx, counts)?;
    }
    Ok(())
}
