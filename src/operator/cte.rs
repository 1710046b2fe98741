use std::collections::BTreeMap;

use derive_more::{Display, From, Into};

use crate::expr::ExprRef;
use crate::operator::ColumnRef;

#[derive(Copy, Clone, Debug, Display, From, Into, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "cte{}", _0)]
pub struct CteId(u32);

/// Reads the output of the CTE producer `id`, renaming its columns to `columns`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct CteConsumer {
    id: CteId,
    columns: Vec<ColumnRef>,
}

impl CteConsumer {
    pub fn new(id: CteId, columns: Vec<ColumnRef>) -> Self {
        Self { id, columns }
    }

    pub fn id(&self) -> CteId {
        self.id
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct CteProducer {
    id: CteId,
    columns: Vec<ColumnRef>,
}

impl CteProducer {
    pub fn new(id: CteId, columns: Vec<ColumnRef>) -> Self {
        Self { id, columns }
    }

    pub fn id(&self) -> CteId {
        self.id
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }
}

/// Producer expressions of the query's common table expressions, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct CteInfo {
    producers: BTreeMap<CteId, ExprRef>,
}

impl CteInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_producer(&mut self, id: CteId, producer: ExprRef) {
        self.producers.insert(id, producer);
    }

    pub fn producer(&self, id: CteId) -> Option<&ExprRef> {
        self.producers.get(&id)
    }

    pub fn producers(&self) -> impl Iterator<Item = (&CteId, &ExprRef)> {
        self.producers.iter()
    }
}
