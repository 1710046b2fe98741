use strum_macros::{Display, EnumString};

use crate::operator::{ColumnRef, OrderKey};

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display, EnumString)]
pub enum FrameBoundary {
    UnboundedPreceding,
    BoundedPreceding,
    CurrentRow,
    BoundedFollowing,
    UnboundedFollowing,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display)]
pub enum FrameKind {
    Rows,
    Range,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct WindowFrame {
    kind: FrameKind,
    leading: FrameBoundary,
    trailing: FrameBoundary,
}

impl WindowFrame {
    pub fn new(kind: FrameKind, leading: FrameBoundary, trailing: FrameBoundary) -> Self {
        Self {
            kind,
            leading,
            trailing,
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn leading(&self) -> FrameBoundary {
        self.leading
    }

    pub fn trailing(&self) -> FrameBoundary {
        self.trailing
    }

    /// The frame every window function gets when none is written: RANGE from the partition
    /// start to the current row.
    pub fn is_default(&self) -> bool {
        self.kind == FrameKind::Range
            && self.leading == FrameBoundary::UnboundedPreceding
            && self.trailing == FrameBoundary::CurrentRow
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Default)]
pub struct WindowSpec {
    order: Vec<OrderKey>,
    frame: Option<WindowFrame>,
}

impl WindowSpec {
    pub fn new(order: Vec<OrderKey>, frame: Option<WindowFrame>) -> Self {
        Self { order, frame }
    }

    pub fn order(&self) -> &[OrderKey] {
        &self.order
    }

    pub fn frame(&self) -> Option<&WindowFrame> {
        self.frame.as_ref()
    }
}

/// Window operator. Children are the input and the project list of window functions.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SequenceProject {
    partition_columns: Vec<ColumnRef>,
    specs: Vec<WindowSpec>,
}

impl SequenceProject {
    pub fn new(partition_columns: Vec<ColumnRef>, specs: Vec<WindowSpec>) -> Self {
        Self {
            partition_columns,
            specs,
        }
    }

    pub fn partition_columns(&self) -> &[ColumnRef] {
        &self.partition_columns
    }

    pub fn specs(&self) -> &[WindowSpec] {
        &self.specs
    }

    pub fn local_columns(&self) -> Vec<ColumnRef> {
        let mut columns = self.partition_columns.clone();
        for spec in &self.specs {
            columns.extend(spec.order.iter().map(|k| k.column()));
        }
        columns
    }
}
