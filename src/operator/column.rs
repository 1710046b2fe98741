use std::cell::Cell;
use std::collections::BTreeSet;

use derive_more::{Display, From, Into};

use crate::datum::DataType;

#[derive(Copy, Clone, Debug, Display, From, Into, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "c{}", _0)]
pub struct ColumnId(u32);

/// Identifies the base relation a table column was read from.
#[derive(Copy, Clone, Debug, Display, From, Into, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "src{}", _0)]
pub struct SourceId(u32);

/// Reference to a column produced somewhere in an expression tree.
///
/// Columns are created once by a [`ColumnFactory`] and copied around freely; two references are
/// the same column iff their ids are equal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    id: ColumnId,
    data_type: DataType,
    nullable: bool,
    /// Set for columns read from a table, unset for computed columns.
    source: Option<SourceId>,
}

impl ColumnRef {
    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub fn is_table_column(&self) -> bool {
        self.source.is_some()
    }
}

pub type ColumnSet = BTreeSet<ColumnRef>;

/// Hands out fresh column ids.
#[derive(Debug, Default)]
pub struct ColumnFactory {
    next_column_id: Cell<u32>,
    next_source_id: Cell<u32>,
}

impl ColumnFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ColumnId {
        let id = self.next_column_id.get();
        self.next_column_id.set(id + 1);
        ColumnId::from(id)
    }

    pub fn new_source(&self) -> SourceId {
        let id = self.next_source_id.get();
        self.next_source_id.set(id + 1);
        SourceId::from(id)
    }

    pub fn table_column(&self, source: SourceId, data_type: DataType, nullable: bool) -> ColumnRef {
        ColumnRef {
            id: self.next_id(),
            data_type,
            nullable,
            source: Some(source),
        }
    }

    pub fn computed_column(&self, data_type: DataType) -> ColumnRef {
        ColumnRef {
            id: self.next_id(),
            data_type,
            nullable: true,
            source: None,
        }
    }
}
