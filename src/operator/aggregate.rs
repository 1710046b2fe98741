use crate::operator::{ColumnRef, ColumnSet};

/// Group-by aggregate. Children are the input and the project list of aggregates.
///
/// With no grouping columns it is a scalar aggregate that always yields exactly one row.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Aggregate {
    grouping_columns: Vec<ColumnRef>,
    minimal_grouping_columns: Option<Vec<ColumnRef>>,
}

impl Aggregate {
    pub fn new(grouping_columns: Vec<ColumnRef>) -> Self {
        Self {
            grouping_columns,
            minimal_grouping_columns: None,
        }
    }

    pub fn with_minimal_grouping_columns(mut self, minimal: Vec<ColumnRef>) -> Self {
        self.minimal_grouping_columns = Some(minimal);
        self
    }

    pub fn grouping_columns(&self) -> &[ColumnRef] {
        &self.grouping_columns
    }

    pub fn minimal_grouping_columns(&self) -> Option<&[ColumnRef]> {
        self.minimal_grouping_columns.as_deref()
    }

    pub fn is_scalar(&self) -> bool {
        self.grouping_columns.is_empty()
    }

    /// Drops the given columns from the grouping (and minimal grouping) columns.
    pub fn exclude_columns(&self, columns: &ColumnSet) -> Self {
        let keep = |cols: &[ColumnRef]| -> Vec<ColumnRef> {
            cols.iter()
                .filter(|c| !columns.contains(c))
                .copied()
                .collect()
        };
        Self {
            grouping_columns: keep(&self.grouping_columns),
            minimal_grouping_columns: self.minimal_grouping_columns.as_deref().map(keep),
        }
    }
}
