use crate::datum::Datum;
use crate::operator::{ColumnRef, SourceId};

/// Reads all rows of a base table.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TableScan {
    table_name: String,
    source: SourceId,
    columns: Vec<ColumnRef>,
}

impl TableScan {
    pub fn new<S: Into<String>>(table_name: S, source: SourceId, columns: Vec<ColumnRef>) -> Self {
        Self {
            table_name: table_name.into(),
            source,
            columns,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }
}

/// Relation given by literal rows; with no rows it is the canonical empty relation.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ConstTable {
    columns: Vec<ColumnRef>,
    rows: Vec<Vec<Datum>>,
}

impl ConstTable {
    pub fn new(columns: Vec<ColumnRef>, rows: Vec<Vec<Datum>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty(columns: Vec<ColumnRef>) -> Self {
        Self::new(columns, vec![])
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Datum>] {
        &self.rows
    }
}
