use crate::operator::{ColumnRef, ColumnSet};

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct OrderKey {
    column: ColumnRef,
    descending: bool,
}

impl OrderKey {
    pub fn asc(column: ColumnRef) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: ColumnRef) -> Self {
        Self {
            column,
            descending: true,
        }
    }

    pub fn column(&self) -> ColumnRef {
        self.column
    }

    pub fn descending(&self) -> bool {
        self.descending
    }
}

/// Removes order keys on the given columns.
pub fn exclude_order_columns(order: &[OrderKey], columns: &ColumnSet) -> Vec<OrderKey> {
    order
        .iter()
        .filter(|key| !columns.contains(&key.column))
        .copied()
        .collect()
}

/// Logical limit. Children are the input, the offset and the row count expressions.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Limit {
    order: Vec<OrderKey>,
    global: bool,
    has_count: bool,
    top_limit_under_dml: bool,
}

impl Limit {
    pub fn new(order: Vec<OrderKey>, has_count: bool) -> Self {
        Self {
            order,
            global: true,
            has_count,
            top_limit_under_dml: false,
        }
    }

    pub fn under_dml(mut self) -> Self {
        self.top_limit_under_dml = true;
        self
    }

    pub fn with_order(&self, order: Vec<OrderKey>) -> Self {
        Self {
            order,
            ..self.clone()
        }
    }

    pub fn order(&self) -> &[OrderKey] {
        &self.order
    }

    pub fn global(&self) -> bool {
        self.global
    }

    pub fn has_count(&self) -> bool {
        self.has_count
    }

    pub fn top_limit_under_dml(&self) -> bool {
        self.top_limit_under_dml
    }
}
