use std::collections::BTreeMap;

use itertools::Itertools;
use log::debug;

use crate::error::OptResult;
use crate::expr::{Expr, ExprRef};
use crate::operator::{
    ColumnSet, LogicalOperator, OrderKey, ScalarOperator, SequenceProject, WindowSpec,
};
use crate::preprocessor::{map_children, transform_up, PreprocessContext, PreprocessPass};

/// Canonicalizes window operators.
///
/// Partition columns are deduplicated. Order keys on partition columns are constant within a
/// partition and go away, as do repeated keys. A frame equal to the default frame is
/// dropped. Specs that no window function refers to are removed and identical specs merged,
/// renumbering the references of the window functions.
#[derive(Clone, Debug, Default)]
pub struct PreprocessWindows;

impl PreprocessPass for PreprocessWindows {
    fn apply(&self, expr: &ExprRef, ctx: &PreprocessContext) -> OptResult<ExprRef> {
        transform_up(expr, ctx, &|e| match e.logical_op() {
            Some(LogicalOperator::LogicalSequenceProject(window)) => {
                preprocess_window(e, window, ctx)
            }
            _ => Ok(e.clone()),
        })
    }
}

fn preprocess_window(
    expr: &ExprRef,
    window: &SequenceProject,
    ctx: &PreprocessContext,
) -> OptResult<ExprRef> {
    let partition = window.partition_columns().iter().copied().unique().collect_vec();
    let partition_set: ColumnSet = partition.iter().copied().collect();

    let mut referenced = vec![false; window.specs().len()];
    collect_spec_references(expr.child(1), &mut referenced);

    let mut specs: Vec<WindowSpec> = Vec::new();
    let mut new_index = BTreeMap::new();
    for (index, spec) in window.specs().iter().enumerate() {
        if !referenced[index] {
            continue;
        }
        let spec = canonical_spec(spec, &partition_set);
        let position = match specs.iter().position(|s| *s == spec) {
            Some(position) => position,
            None => {
                specs.push(spec);
                specs.len() - 1
            }
        };
        new_index.insert(index, position);
    }

    let new_window = SequenceProject::new(partition, specs);
    if &new_window == window && new_index.iter().all(|(old, new)| old == new) {
        return Ok(expr.clone());
    }
    debug!(
        "Window specs {} -> {}",
        window.specs().len(),
        new_window.specs().len()
    );
    let functions = renumber_specs(expr.child(1), &new_index, ctx)?;
    Ok(Expr::new(
        LogicalOperator::LogicalSequenceProject(new_window),
        [expr.child(0).clone(), functions],
    ))
}

fn canonical_spec(spec: &WindowSpec, partition: &ColumnSet) -> WindowSpec {
    let order: Vec<OrderKey> = spec
        .order()
        .iter()
        .filter(|k| !partition.contains(&k.column()))
        .unique_by(|k| k.column())
        .copied()
        .collect();
    let frame = spec.frame().filter(|f| !f.is_default()).copied();
    WindowSpec::new(order, frame)
}

/// Window functions of this operator, skipping relational subtrees.
fn collect_spec_references(expr: &ExprRef, referenced: &mut [bool]) {
    if let Some(ScalarOperator::ScalarWindowFunc(function)) = expr.scalar_op() {
        if let Some(slot) = referenced.get_mut(function.spec_index()) {
            *slot = true;
        }
    }
    for child in expr.children().iter().filter(|c| c.is_scalar()) {
        collect_spec_references(child, referenced);
    }
}

fn renumber_specs(
    expr: &ExprRef,
    new_index: &BTreeMap<usize, usize>,
    ctx: &PreprocessContext,
) -> OptResult<ExprRef> {
    let _guard = ctx.enter()?;
    if !expr.is_scalar() {
        return Ok(expr.clone());
    }
    let rewritten = map_children(expr, |child| renumber_specs(child, new_index, ctx))?;
    match rewritten.scalar_op() {
        Some(ScalarOperator::ScalarWindowFunc(function)) => {
            match new_index.get(&function.spec_index()) {
                Some(&index) if index != function.spec_index() => Ok(Expr::new(
                    ScalarOperator::ScalarWindowFunc(function.with_spec_index(index)),
                    rewritten.children().iter().cloned(),
                )),
                _ => Ok(rewritten),
            }
        }
        _ => Ok(rewritten),
    }
}
