use std::collections::{BTreeMap, BTreeSet};

use petgraph::unionfind::UnionFind;

use crate::constraint::{constraints_from_predicate, ColumnConstraint};
use crate::expr::ExprRef;
use crate::operator::{ColumnRef, ColumnSet};
use crate::properties::column_equalities;

/// What is known about the values of a relation's columns: equivalence classes of columns that
/// are always equal, and per-column interval constraints.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintProperty {
    equivalence_classes: Vec<ColumnSet>,
    constraints: BTreeMap<ColumnRef, ColumnConstraint>,
}

impl ConstraintProperty {
    /// Builds equivalence classes from pairs of equal columns.
    pub fn new<I>(equalities: I, constraints: BTreeMap<ColumnRef, ColumnConstraint>) -> Self
    where
        I: IntoIterator<Item = (ColumnRef, ColumnRef)>,
    {
        let pairs: Vec<_> = equalities.into_iter().filter(|(a, b)| a != b).collect();
        let index: BTreeMap<ColumnRef, usize> = pairs
            .iter()
            .flat_map(|(a, b)| [*a, *b])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c, i))
            .collect();

        let mut union_find = UnionFind::<usize>::new(index.len());
        for (a, b) in &pairs {
            union_find.union(index[a], index[b]);
        }
        let mut classes: BTreeMap<usize, ColumnSet> = BTreeMap::new();
        for (column, i) in &index {
            classes
                .entry(union_find.find(*i))
                .or_default()
                .insert(*column);
        }

        Self {
            equivalence_classes: classes.into_values().collect(),
            constraints,
        }
    }

    pub fn from_predicate(predicate: &ExprRef) -> Self {
        Self::new(
            column_equalities(predicate),
            constraints_from_predicate(predicate),
        )
    }

    pub fn equivalence_classes(&self) -> &[ColumnSet] {
        &self.equivalence_classes
    }

    pub fn equivalence_class(&self, column: &ColumnRef) -> Option<&ColumnSet> {
        self.equivalence_classes.iter().find(|c| c.contains(column))
    }

    pub fn constraints(&self) -> &BTreeMap<ColumnRef, ColumnConstraint> {
        &self.constraints
    }

    pub fn constraint(&self, column: &ColumnRef) -> Option<&ColumnConstraint> {
        self.constraints.get(column)
    }

    pub fn is_empty(&self) -> bool {
        self.equivalence_classes.is_empty() && self.constraints.is_empty()
    }

    /// Whether the constraints can never be satisfied.
    pub fn is_contradiction(&self) -> bool {
        self.constraints.values().any(|c| c.is_contradiction())
    }

    fn equality_pairs(&self) -> impl Iterator<Item = (ColumnRef, ColumnRef)> + '_ {
        self.equivalence_classes.iter().flat_map(|class| {
            let first = class.iter().next().copied();
            class.iter().skip(1).filter_map(move |c| first.map(|f| (f, *c)))
        })
    }

    /// The property holding when both `self` and `other` hold.
    pub fn combine(&self, other: &ConstraintProperty) -> ConstraintProperty {
        let mut constraints = self.constraints.clone();
        for (column, constraint) in &other.constraints {
            let merged = match constraints.get(column) {
                Some(existing) => existing.intersect(constraint),
                None => constraint.clone(),
            };
            constraints.insert(*column, merged);
        }
        let pairs: Vec<_> = self.equality_pairs().chain(other.equality_pairs()).collect();
        Self::new(pairs, constraints)
    }

    /// Keeps only what is said about `columns`.
    pub fn restrict(&self, columns: &ColumnSet) -> ConstraintProperty {
        let equivalence_classes = self
            .equivalence_classes
            .iter()
            .map(|class| class.intersection(columns).copied().collect::<ColumnSet>())
            .filter(|class| class.len() > 1)
            .collect();
        let constraints = self
            .constraints
            .iter()
            .filter(|(c, _)| columns.contains(c))
            .map(|(c, constraint)| (*c, constraint.clone()))
            .collect();
        Self {
            equivalence_classes,
            constraints,
        }
    }
}
