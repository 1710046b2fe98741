use crate::operator::ColumnRef;

/// Insert of the child's rows into a table.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Insert {
    table_name: String,
    source_columns: Vec<ColumnRef>,
}

impl Insert {
    pub fn new<S: Into<String>>(table_name: S, source_columns: Vec<ColumnRef>) -> Self {
        Self {
            table_name: table_name.into(),
            source_columns,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn source_columns(&self) -> &[ColumnRef] {
        &self.source_columns
    }
}
