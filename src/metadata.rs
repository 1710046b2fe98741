//! Catalog information about scalar operators.
//!
//! The preprocessor and the statistics layer need to know a little about the operators in a
//! predicate: which comparison an operator implements, its commutator and inverse, and whether
//! it returns NULL on NULL input. All of that is looked up through [`MetadataAccessor`].

use std::collections::HashMap;

use anyhow::anyhow;

use crate::error::{OptError, OptResult};
use crate::operator::{CmpType, Comparison, OperatorId};

#[derive(Clone, Debug, PartialEq)]
pub struct ScalarOpInfo {
    id: OperatorId,
    name: String,
    cmp_type: CmpType,
    commutator: Option<OperatorId>,
    inverse: Option<OperatorId>,
    strict: bool,
}

impl ScalarOpInfo {
    pub fn new<S: Into<String>>(id: OperatorId, name: S) -> Self {
        let name = name.into();
        Self {
            id,
            cmp_type: CmpType::from_op_name(&name),
            name,
            commutator: None,
            inverse: None,
            strict: true,
        }
    }

    pub fn with_commutator(mut self, commutator: OperatorId) -> Self {
        self.commutator = Some(commutator);
        self
    }

    pub fn with_inverse(mut self, inverse: OperatorId) -> Self {
        self.inverse = Some(inverse);
        self
    }

    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn id(&self) -> OperatorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cmp_type(&self) -> CmpType {
        self.cmp_type
    }

    pub fn commutator(&self) -> Option<OperatorId> {
        self.commutator
    }

    pub fn inverse(&self) -> Option<OperatorId> {
        self.inverse
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_like(&self) -> bool {
        self.cmp_type == CmpType::Like
    }

    pub fn comparison(&self) -> Comparison {
        Comparison::new(self.id, self.cmp_type)
    }
}

pub trait MetadataAccessor {
    fn scalar_op(&self, id: OperatorId) -> OptResult<&ScalarOpInfo>;

    /// The default operator implementing `cmp_type`.
    fn comparison(&self, cmp_type: CmpType) -> OptResult<Comparison>;

    /// The comparison with swapped operands, if the operator has a commutator.
    fn commuted(&self, comparison: Comparison) -> OptResult<Option<Comparison>> {
        let info = self.scalar_op(comparison.op())?;
        match info.commutator() {
            Some(id) => Ok(Some(self.scalar_op(id)?.comparison())),
            None => Ok(None),
        }
    }

    /// The comparison that is true exactly when `comparison` is false on non-null input.
    fn inverse(&self, comparison: Comparison) -> OptResult<Option<Comparison>> {
        let info = self.scalar_op(comparison.op())?;
        match info.inverse() {
            Some(id) => Ok(Some(self.scalar_op(id)?.comparison())),
            None => Ok(None),
        }
    }
}

/// Metadata held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetadata {
    operators: HashMap<OperatorId, ScalarOpInfo>,
    by_cmp_type: HashMap<CmpType, OperatorId>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard comparison operators on ids 1 to 7 and `+` on id 8.
    pub fn standard() -> Self {
        let id = OperatorId::from;
        let mut metadata = Self::new();
        metadata.register(ScalarOpInfo::new(id(1), "=").with_commutator(id(1)).with_inverse(id(2)));
        metadata.register(ScalarOpInfo::new(id(2), "<>").with_commutator(id(2)).with_inverse(id(1)));
        metadata.register(ScalarOpInfo::new(id(3), "<").with_commutator(id(5)).with_inverse(id(6)));
        metadata.register(ScalarOpInfo::new(id(4), "<=").with_commutator(id(6)).with_inverse(id(5)));
        metadata.register(ScalarOpInfo::new(id(5), ">").with_commutator(id(3)).with_inverse(id(4)));
        metadata.register(ScalarOpInfo::new(id(6), ">=").with_commutator(id(4)).with_inverse(id(3)));
        metadata.register(ScalarOpInfo::new(id(7), "~~"));
        metadata.register(ScalarOpInfo::new(id(8), "+").with_commutator(id(8)));
        metadata
    }

    pub fn register(&mut self, info: ScalarOpInfo) {
        if info.cmp_type() != CmpType::Other {
            self.by_cmp_type.entry(info.cmp_type()).or_insert(info.id());
        }
        self.operators.insert(info.id(), info);
    }
}

impl MetadataAccessor for InMemoryMetadata {
    fn scalar_op(&self, id: OperatorId) -> OptResult<&ScalarOpInfo> {
        self.operators
            .get(&id)
            .ok_or_else(|| OptError::UnknownOperator(id).into())
    }

    fn comparison(&self, cmp_type: CmpType) -> OptResult<Comparison> {
        let id = self
            .by_cmp_type
            .get(&cmp_type)
            .ok_or_else(|| anyhow!("no operator registered for comparison {}", cmp_type))?;
        Ok(self.scalar_op(*id)?.comparison())
    }
}
