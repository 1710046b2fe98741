use std::cmp::{max, min};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::constraint::ColumnConstraint;
use crate::expr::{
    conjuncts, const_datum, equality_on_idents, ident_column, is_const_false, is_const_null, Expr,
};
use crate::operator::{ColumnRef, ColumnSet, JoinType, LogicalOperator, ScalarOperator};
use crate::properties::ConstraintProperty;

/// Static upper bound on the number of rows of a relation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaxCard {
    Bounded(u64),
    Unbounded,
}

impl MaxCard {
    pub fn zero() -> Self {
        MaxCard::Bounded(0)
    }

    pub fn one() -> Self {
        MaxCard::Bounded(1)
    }

    pub fn is_zero(&self) -> bool {
        *self == MaxCard::Bounded(0)
    }

    pub fn at_most_one(&self) -> bool {
        *self <= MaxCard::Bounded(1)
    }

    pub fn multiply(self, other: MaxCard) -> MaxCard {
        match (self, other) {
            (MaxCard::Bounded(0), _) | (_, MaxCard::Bounded(0)) => MaxCard::zero(),
            (MaxCard::Bounded(a), MaxCard::Bounded(b)) => {
                a.checked_mul(b).map_or(MaxCard::Unbounded, MaxCard::Bounded)
            }
            _ => MaxCard::Unbounded,
        }
    }

    pub fn plus(self, other: MaxCard) -> MaxCard {
        match (self, other) {
            (MaxCard::Bounded(a), MaxCard::Bounded(b)) => {
                a.checked_add(b).map_or(MaxCard::Unbounded, MaxCard::Bounded)
            }
            _ => MaxCard::Unbounded,
        }
    }
}

impl Default for MaxCard {
    fn default() -> Self {
        MaxCard::Unbounded
    }
}

/// Properties of a relational expression.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationalProperties {
    output_columns: ColumnSet,
    /// Columns used by this subtree but produced outside of it.
    outer_references: ColumnSet,
    not_null_columns: ColumnSet,
    max_card: MaxCard,
    constraints: ConstraintProperty,
    /// Columns read by this node's own scalar children and operator parameters.
    used_columns: ColumnSet,
    defined_columns: ColumnSet,
}

impl RelationalProperties {
    pub fn derive(expr: &Expr) -> Self {
        let op = match expr.logical_op() {
            Some(op) => op,
            None => return Self::default(),
        };
        let children: Vec<Rc<RelationalProperties>> = expr
            .relational_children()
            .map(|c| c.relational_props())
            .collect();

        let mut used_columns = local_used_columns(op);
        let mut defined_columns = ColumnSet::new();
        for child in expr.children().iter().filter(|c| c.is_scalar()) {
            let scalar = child.scalar_props();
            used_columns.extend(scalar.used_columns().iter().copied());
            defined_columns.extend(scalar.defined_columns().iter().copied());
        }

        let output_columns = derive_output_columns(op, &children, &defined_columns);

        let mut outer_references = used_columns.clone();
        for child in &children {
            outer_references.extend(child.outer_references.iter().copied());
        }
        for child in &children {
            for column in &child.output_columns {
                outer_references.remove(column);
            }
        }
        for column in defined_columns.iter().chain(output_columns.iter()) {
            outer_references.remove(column);
        }

        Self {
            not_null_columns: derive_not_null_columns(op, expr, &children, &output_columns),
            max_card: derive_max_card(op, expr, &children),
            constraints: derive_constraints(op, expr, &children, &output_columns),
            output_columns,
            outer_references,
            used_columns,
            defined_columns,
        }
    }

    pub fn output_columns(&self) -> &ColumnSet {
        &self.output_columns
    }

    pub fn outer_references(&self) -> &ColumnSet {
        &self.outer_references
    }

    pub fn has_outer_references(&self) -> bool {
        !self.outer_references.is_empty()
    }

    pub fn not_null_columns(&self) -> &ColumnSet {
        &self.not_null_columns
    }

    pub fn max_card(&self) -> MaxCard {
        self.max_card
    }

    pub fn constraints(&self) -> &ConstraintProperty {
        &self.constraints
    }

    pub fn used_columns(&self) -> &ColumnSet {
        &self.used_columns
    }

    pub fn defined_columns(&self) -> &ColumnSet {
        &self.defined_columns
    }
}

fn local_used_columns(op: &LogicalOperator) -> ColumnSet {
    match op {
        LogicalOperator::LogicalGbAgg(agg) => agg.grouping_columns().iter().copied().collect(),
        LogicalOperator::LogicalLimit(limit) => limit.order().iter().map(|k| k.column()).collect(),
        LogicalOperator::LogicalSequenceProject(window) => {
            window.local_columns().into_iter().collect()
        }
        LogicalOperator::LogicalInsert(insert) => insert.source_columns().iter().copied().collect(),
        LogicalOperator::LogicalUnion(set_op) | LogicalOperator::LogicalUnionAll(set_op) => {
            set_op.input_columns().iter().flatten().copied().collect()
        }
        _ => ColumnSet::new(),
    }
}

fn union_of<'a, I: IntoIterator<Item = &'a ColumnSet>>(sets: I) -> ColumnSet {
    sets.into_iter().flatten().copied().collect()
}

fn derive_output_columns(
    op: &LogicalOperator,
    children: &[Rc<RelationalProperties>],
    defined: &ColumnSet,
) -> ColumnSet {
    let first_child = || {
        children
            .first()
            .map(|c| c.output_columns.clone())
            .unwrap_or_default()
    };
    match op {
        LogicalOperator::LogicalGet(scan) => scan.columns().iter().copied().collect(),
        LogicalOperator::LogicalConstTableGet(table) => table.columns().iter().copied().collect(),
        LogicalOperator::LogicalCteConsumer(consumer) => {
            consumer.columns().iter().copied().collect()
        }
        LogicalOperator::LogicalSelect
        | LogicalOperator::LogicalLimit(_)
        | LogicalOperator::LogicalCteAnchor(_)
        | LogicalOperator::LogicalCteProducer(_) => first_child(),
        LogicalOperator::LogicalProject | LogicalOperator::LogicalSequenceProject(_) => {
            let mut columns = first_child();
            columns.extend(defined.iter().copied());
            columns
        }
        LogicalOperator::LogicalGbAgg(agg) => agg
            .grouping_columns()
            .iter()
            .chain(defined.iter())
            .copied()
            .collect(),
        LogicalOperator::LogicalJoin(join) if !join.outputs_inner_columns() => first_child(),
        LogicalOperator::LogicalJoin(_) | LogicalOperator::LogicalNAryJoin => {
            union_of(children.iter().map(|c| &c.output_columns))
        }
        LogicalOperator::LogicalUnion(set_op) | LogicalOperator::LogicalUnionAll(set_op) => {
            set_op.output_columns().iter().copied().collect()
        }
        LogicalOperator::LogicalInsert(_) => ColumnSet::new(),
    }
}

fn derive_not_null_columns(
    op: &LogicalOperator,
    expr: &Expr,
    children: &[Rc<RelationalProperties>],
    output: &ColumnSet,
) -> ColumnSet {
    let first_child = || {
        children
            .first()
            .map(|c| c.not_null_columns.clone())
            .unwrap_or_default()
    };
    match op {
        LogicalOperator::LogicalGet(_) | LogicalOperator::LogicalCteConsumer(_) => {
            output.iter().filter(|c| !c.nullable()).copied().collect()
        }
        LogicalOperator::LogicalConstTableGet(table) => table
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                table
                    .rows()
                    .iter()
                    .all(|row| row.get(*i).map_or(false, |d| !d.is_null()))
            })
            .map(|(_, c)| *c)
            .collect(),
        LogicalOperator::LogicalProject | LogicalOperator::LogicalSequenceProject(_) => {
            let mut not_null = first_child();
            let elements = expr
                .children()
                .iter()
                .filter(|c| c.is_scalar())
                .flat_map(|list| list.children());
            for element in elements {
                let column = match element.scalar_op() {
                    Some(ScalarOperator::ScalarProjectElement(column)) => *column,
                    _ => continue,
                };
                let value = element.child(0);
                let non_null = match (ident_column(value), const_datum(value)) {
                    (Some(source), _) => not_null.contains(&source),
                    (_, Some(datum)) => !datum.is_null(),
                    _ => false,
                };
                if non_null {
                    not_null.insert(column);
                }
            }
            not_null
        }
        LogicalOperator::LogicalGbAgg(agg) => {
            let child = first_child();
            agg.grouping_columns()
                .iter()
                .filter(|c| child.contains(c))
                .copied()
                .collect()
        }
        LogicalOperator::LogicalJoin(join) if join.join_type() != JoinType::Inner => first_child(),
        LogicalOperator::LogicalJoin(_) | LogicalOperator::LogicalNAryJoin => {
            union_of(children.iter().map(|c| &c.not_null_columns))
        }
        LogicalOperator::LogicalUnion(set_op) | LogicalOperator::LogicalUnionAll(set_op) => set_op
            .output_columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                set_op.input_columns().iter().zip(children).all(|(inputs, child)| {
                    inputs
                        .get(*i)
                        .map_or(false, |c| child.not_null_columns.contains(c))
                })
            })
            .map(|(_, c)| *c)
            .collect(),
        LogicalOperator::LogicalInsert(_) => ColumnSet::new(),
        _ => first_child(),
    }
}

fn predicate_of(expr: &Expr) -> Option<&Rc<Expr>> {
    expr.children().iter().rev().find(|c| c.is_scalar())
}

fn derive_max_card(
    op: &LogicalOperator,
    expr: &Expr,
    children: &[Rc<RelationalProperties>],
) -> MaxCard {
    let child_card = |i: usize| children.get(i).map_or(MaxCard::Unbounded, |c| c.max_card);
    let false_predicate =
        || predicate_of(expr).map_or(false, |p| is_const_false(p) || is_const_null(p));
    match op {
        LogicalOperator::LogicalGet(_) | LogicalOperator::LogicalCteConsumer(_) => {
            MaxCard::Unbounded
        }
        LogicalOperator::LogicalConstTableGet(table) => MaxCard::Bounded(table.rows().len() as u64),
        LogicalOperator::LogicalSelect => {
            if false_predicate() {
                MaxCard::zero()
            } else {
                child_card(0)
            }
        }
        LogicalOperator::LogicalGbAgg(agg) => {
            if agg.is_scalar() {
                MaxCard::one()
            } else {
                child_card(0)
            }
        }
        LogicalOperator::LogicalLimit(limit) => {
            let count = expr
                .children()
                .get(2)
                .and_then(|c| const_datum(c))
                .and_then(|d| d.as_int());
            match count {
                Some(count) if limit.has_count() => {
                    min(child_card(0), MaxCard::Bounded(count.max(0) as u64))
                }
                _ => child_card(0),
            }
        }
        LogicalOperator::LogicalJoin(join) => match join.join_type() {
            JoinType::Inner if false_predicate() => MaxCard::zero(),
            JoinType::Inner => child_card(0).multiply(child_card(1)),
            JoinType::LeftOuter => child_card(0).multiply(max(child_card(1), MaxCard::one())),
            JoinType::LeftSemi if false_predicate() => MaxCard::zero(),
            JoinType::LeftSemi | JoinType::LeftAntiSemi => child_card(0),
        },
        LogicalOperator::LogicalNAryJoin => {
            if false_predicate() {
                MaxCard::zero()
            } else {
                children
                    .iter()
                    .fold(MaxCard::one(), |acc, c| acc.multiply(c.max_card))
            }
        }
        LogicalOperator::LogicalUnion(_) | LogicalOperator::LogicalUnionAll(_) => children
            .iter()
            .fold(MaxCard::zero(), |acc, c| acc.plus(c.max_card)),
        _ => child_card(0),
    }
}

fn derive_constraints(
    op: &LogicalOperator,
    expr: &Expr,
    children: &[Rc<RelationalProperties>],
    output: &ColumnSet,
) -> ConstraintProperty {
    let first_child = || {
        children
            .first()
            .map(|c| c.constraints.clone())
            .unwrap_or_default()
    };
    let with_predicate = |base: ConstraintProperty| match predicate_of(expr) {
        Some(pred) => base.combine(&ConstraintProperty::from_predicate(pred)),
        None => base,
    };
    match op {
        LogicalOperator::LogicalSelect => with_predicate(first_child()),
        LogicalOperator::LogicalProject => {
            let mut pairs = Vec::new();
            for element in expr.child(1).children() {
                if let (Some(ScalarOperator::ScalarProjectElement(column)), Some(source)) =
                    (element.scalar_op(), ident_column(element.child(0)))
                {
                    pairs.push((*column, source));
                }
            }
            first_child().combine(&ConstraintProperty::new(pairs, BTreeMap::new()))
        }
        LogicalOperator::LogicalGbAgg(_) => first_child().restrict(output),
        LogicalOperator::LogicalJoin(join) => match join.join_type() {
            JoinType::Inner => with_predicate(
                children
                    .iter()
                    .fold(ConstraintProperty::default(), |acc, c| acc.combine(&c.constraints)),
            ),
            JoinType::LeftSemi => with_predicate(first_child()).restrict(output),
            _ => first_child(),
        },
        LogicalOperator::LogicalNAryJoin => with_predicate(
            children
                .iter()
                .fold(ConstraintProperty::default(), |acc, c| acc.combine(&c.constraints)),
        ),
        LogicalOperator::LogicalUnion(set_op) | LogicalOperator::LogicalUnionAll(set_op) => {
            let mut constraints = BTreeMap::new();
            'columns: for (i, column) in set_op.output_columns().iter().enumerate() {
                let mut combined: Option<ColumnConstraint> = None;
                for (inputs, child) in set_op.input_columns().iter().zip(children) {
                    let input_constraint = inputs
                        .get(i)
                        .and_then(|c| child.constraints.constraint(c));
                    let input_constraint = match input_constraint {
                        Some(c) => c.with_column(*column),
                        None => continue 'columns,
                    };
                    combined = Some(match combined {
                        Some(acc) => acc.union(&input_constraint),
                        None => input_constraint,
                    });
                }
                if let Some(constraint) = combined {
                    constraints.insert(*column, constraint);
                }
            }
            ConstraintProperty::new(std::iter::empty(), constraints)
        }
        LogicalOperator::LogicalGet(_)
        | LogicalOperator::LogicalConstTableGet(_)
        | LogicalOperator::LogicalCteConsumer(_)
        | LogicalOperator::LogicalInsert(_) => ConstraintProperty::default(),
        _ => first_child(),
    }
}

/// Equalities between columns of a predicate, e.g. the join keys of `a = b AND c = d`.
pub fn column_equalities(predicate: &Rc<Expr>) -> Vec<(ColumnRef, ColumnRef)> {
    conjuncts(predicate)
        .iter()
        .filter_map(|c| equality_on_idents(c))
        .collect()
}
