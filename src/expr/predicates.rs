//! Helpers over boolean scalar expressions: conjunct/disjunct splitting, canonical AND/OR
//! construction, and null-rejection analysis.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use itertools::Itertools;

use crate::datum::Datum;
use crate::expr::{Expr, ExprRef};
use crate::operator::{BoolOp, CmpType, ColumnRef, ColumnSet, ScalarOperator};

pub fn bool_op_of(expr: &Expr) -> Option<BoolOp> {
    match expr.scalar_op() {
        Some(ScalarOperator::ScalarBoolOp(op)) => Some(*op),
        _ => None,
    }
}

pub fn is_and(expr: &Expr) -> bool {
    bool_op_of(expr) == Some(BoolOp::And)
}

pub fn is_or(expr: &Expr) -> bool {
    bool_op_of(expr) == Some(BoolOp::Or)
}

pub fn is_not(expr: &Expr) -> bool {
    bool_op_of(expr) == Some(BoolOp::Not)
}

pub fn const_datum(expr: &Expr) -> Option<&Datum> {
    expr.scalar_op().and_then(|op| op.as_scalar_const())
}

pub fn ident_column(expr: &Expr) -> Option<ColumnRef> {
    expr.scalar_op().and_then(|op| op.as_scalar_ident()).copied()
}

pub fn is_const_true(expr: &Expr) -> bool {
    matches!(const_datum(expr), Some(Datum::Bool(true)))
}

pub fn is_const_false(expr: &Expr) -> bool {
    matches!(const_datum(expr), Some(Datum::Bool(false)))
}

pub fn is_const_null(expr: &Expr) -> bool {
    const_datum(expr).map_or(false, |d| d.is_null())
}

/// Comparison type of a `ScalarCmp` or `ScalarIsDistinctFrom` node.
pub fn cmp_type_of(expr: &Expr) -> Option<CmpType> {
    match expr.scalar_op()? {
        ScalarOperator::ScalarCmp(cmp) => Some(cmp.cmp_type()),
        ScalarOperator::ScalarIsDistinctFrom(_) => Some(CmpType::IDF),
        _ => None,
    }
}

/// `a = b` over two column references.
pub fn equality_on_idents(expr: &Expr) -> Option<(ColumnRef, ColumnRef)> {
    match expr.scalar_op()? {
        ScalarOperator::ScalarCmp(cmp) if cmp.cmp_type() == CmpType::Eq => {
            Some((ident_column(expr.child(0))?, ident_column(expr.child(1))?))
        }
        _ => None,
    }
}

/// Splits a predicate into its top-level conjuncts; `TRUE` has none.
pub fn conjuncts(expr: &ExprRef) -> Vec<ExprRef> {
    let mut result = Vec::new();
    collect_operands(expr, BoolOp::And, &mut result);
    result.retain(|e| !is_const_true(e));
    result
}

/// Splits a predicate into its top-level disjuncts; `FALSE` has none.
pub fn disjuncts(expr: &ExprRef) -> Vec<ExprRef> {
    let mut result = Vec::new();
    collect_operands(expr, BoolOp::Or, &mut result);
    result.retain(|e| !is_const_false(e));
    result
}

fn collect_operands(expr: &ExprRef, op: BoolOp, result: &mut Vec<ExprRef>) {
    if bool_op_of(expr) == Some(op) {
        for child in expr.children() {
            collect_operands(child, op, result);
        }
    } else {
        result.push(expr.clone());
    }
}

/// AND of the given predicates, flattened; `TRUE` operands vanish and a `FALSE` operand wins.
pub fn conjunction<I: IntoIterator<Item = ExprRef>>(exprs: I) -> ExprRef {
    combine(exprs, BoolOp::And)
}

/// OR of the given predicates, flattened; `FALSE` operands vanish and a `TRUE` operand wins.
pub fn disjunction<I: IntoIterator<Item = ExprRef>>(exprs: I) -> ExprRef {
    combine(exprs, BoolOp::Or)
}

fn combine<I: IntoIterator<Item = ExprRef>>(exprs: I, op: BoolOp) -> ExprRef {
    let (identity, absorbing) = match op {
        BoolOp::And => (true, false),
        _ => (false, true),
    };
    let mut operands = Vec::new();
    for expr in exprs {
        collect_operands(&expr, op, &mut operands);
    }
    let mut kept = Vec::with_capacity(operands.len());
    for operand in operands {
        match const_datum(&operand).and_then(|d| d.as_bool()) {
            Some(v) if v == identity => continue,
            Some(v) if v == absorbing => return Expr::bool_const(absorbing),
            _ => kept.push(operand),
        }
    }
    match kept.len() {
        0 => Expr::bool_const(identity),
        1 => kept.remove(0),
        _ => Expr::new(ScalarOperator::ScalarBoolOp(op), kept),
    }
}

/// Removes structurally equal duplicates, keeping first occurrences.
pub fn dedup_exprs(exprs: Vec<ExprRef>) -> Vec<ExprRef> {
    let mut seen = HashSet::new();
    exprs
        .into_iter()
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

/// Whether `expr` occurs among `exprs`.
pub fn contains_expr(exprs: &[ExprRef], expr: &ExprRef) -> bool {
    exprs.iter().any(|e| e == expr)
}

/// `expr` with column references renamed by `mapping`; unmapped references are kept.
pub fn remap_columns(expr: &ExprRef, mapping: &BTreeMap<ColumnRef, ColumnRef>) -> ExprRef {
    if let Some(column) = ident_column(expr) {
        return match mapping.get(&column) {
            Some(mapped) => Expr::ident(*mapped),
            None => expr.clone(),
        };
    }
    let children = expr
        .children()
        .iter()
        .map(|c| remap_columns(c, mapping))
        .collect_vec();
    if children
        .iter()
        .zip(expr.children())
        .all(|(new, old)| Rc::ptr_eq(new, old))
    {
        expr.clone()
    } else {
        expr.with_children(children)
    }
}

/// Truth value of a scalar expression when some columns are known to be NULL.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NullEval {
    True,
    False,
    Null,
    /// Either `FALSE` or `NULL`.
    NotTrue,
    Any,
}

impl NullEval {
    fn not(self) -> NullEval {
        match self {
            NullEval::True => NullEval::False,
            NullEval::False => NullEval::True,
            NullEval::Null => NullEval::Null,
            _ => NullEval::Any,
        }
    }

    fn rejects(self) -> bool {
        matches!(self, NullEval::False | NullEval::Null | NullEval::NotTrue)
    }
}

fn eval_with_nulls(expr: &Expr, null_columns: &ColumnSet) -> NullEval {
    let op = match expr.scalar_op() {
        Some(op) => op,
        None => return NullEval::Any,
    };
    let children = || {
        expr.children()
            .iter()
            .map(|c| eval_with_nulls(c, null_columns))
    };
    match op {
        ScalarOperator::ScalarIdent(col) if null_columns.contains(col) => NullEval::Null,
        ScalarOperator::ScalarConst(Datum::Null(_)) => NullEval::Null,
        ScalarOperator::ScalarConst(Datum::Bool(true)) => NullEval::True,
        ScalarOperator::ScalarConst(Datum::Bool(false)) => NullEval::False,
        ScalarOperator::ScalarCmp(_) | ScalarOperator::ScalarCast(_) => {
            if children().any(|e| e == NullEval::Null) {
                NullEval::Null
            } else {
                NullEval::Any
            }
        }
        ScalarOperator::ScalarFunc(func) if func.is_strict() => {
            if children().any(|e| e == NullEval::Null) {
                NullEval::Null
            } else {
                NullEval::Any
            }
        }
        ScalarOperator::ScalarNullTest => match eval_with_nulls(expr.child(0), null_columns) {
            NullEval::Null => NullEval::True,
            NullEval::True | NullEval::False => NullEval::False,
            _ => NullEval::Any,
        },
        ScalarOperator::ScalarBoolOp(BoolOp::Not) => {
            eval_with_nulls(expr.child(0), null_columns).not()
        }
        ScalarOperator::ScalarBoolOp(BoolOp::And) => {
            let evals = children().collect_vec();
            if evals.contains(&NullEval::False) {
                NullEval::False
            } else if evals.iter().all(|e| *e == NullEval::True) {
                NullEval::True
            } else if evals.iter().all(|e| *e == NullEval::Null || *e == NullEval::True) {
                NullEval::Null
            } else if evals.iter().any(|e| e.rejects()) {
                NullEval::NotTrue
            } else {
                NullEval::Any
            }
        }
        ScalarOperator::ScalarBoolOp(BoolOp::Or) => {
            let evals = children().collect_vec();
            if evals.contains(&NullEval::True) {
                NullEval::True
            } else if evals.iter().all(|e| *e == NullEval::False) {
                NullEval::False
            } else if evals.iter().all(|e| *e == NullEval::Null || *e == NullEval::False) {
                NullEval::Null
            } else if evals.iter().all(|e| e.rejects()) {
                NullEval::NotTrue
            } else {
                NullEval::Any
            }
        }
        _ => NullEval::Any,
    }
}

/// Whether `predicate` can never be true for a row in which every column of `columns` is NULL.
///
/// Predicates with volatile functions or subqueries are never considered null-rejecting.
pub fn is_null_rejecting(predicate: &Expr, columns: &ColumnSet) -> bool {
    let props = predicate.scalar_props();
    if props.has_volatile_function() || props.has_subquery() {
        return false;
    }
    eval_with_nulls(predicate, columns).rejects()
}
