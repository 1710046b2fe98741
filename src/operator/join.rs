use strum_macros::{Display, EnumString};

/// Join flavors kept as binary joins; inner joins may later be collapsed into n-ary joins.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display, EnumString)]
pub enum JoinType {
    Inner,
    LeftOuter,
    #[strum(serialize = "In")]
    LeftSemi,
    #[strum(serialize = "LeftAntiSemiJoin")]
    LeftAntiSemi,
}

/// Logical binary join. Children are outer, inner and the join predicate.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct Join {
    join_type: JoinType,
}

impl Join {
    pub fn new(join_type: JoinType) -> Self {
        Self { join_type }
    }

    pub fn inner() -> Self {
        Self::new(JoinType::Inner)
    }

    pub fn left_outer() -> Self {
        Self::new(JoinType::LeftOuter)
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn is_inner(&self) -> bool {
        self.join_type == JoinType::Inner
    }

    /// Semi and anti-semi joins only output outer columns.
    pub fn outputs_inner_columns(&self) -> bool {
        matches!(self.join_type, JoinType::Inner | JoinType::LeftOuter)
    }
}
