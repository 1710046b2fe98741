use crate::operator::ColumnRef;

/// Column mapping of UNION / UNION ALL: the i-th input produces `input_columns[i]`, positionally
/// matching `output_columns`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SetOp {
    output_columns: Vec<ColumnRef>,
    input_columns: Vec<Vec<ColumnRef>>,
}

impl SetOp {
    pub fn new(output_columns: Vec<ColumnRef>, input_columns: Vec<Vec<ColumnRef>>) -> Self {
        Self {
            output_columns,
            input_columns,
        }
    }

    pub fn output_columns(&self) -> &[ColumnRef] {
        &self.output_columns
    }

    pub fn input_columns(&self) -> &[Vec<ColumnRef>] {
        &self.input_columns
    }
}
