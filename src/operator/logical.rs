use enum_as_inner::EnumAsInner;

use crate::operator::{
    Aggregate, ConstTable, CteConsumer, CteId, CteProducer, Insert, Join, JoinType, Limit, SequenceProject,
    SetOp, TableScan,
};

/// Logical relational operator.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum LogicalOperator {
    LogicalGet(TableScan),
    /// Children: input, predicate.
    LogicalSelect,
    /// Children: input, project list.
    LogicalProject,
    LogicalGbAgg(Aggregate),
    LogicalLimit(Limit),
    LogicalJoin(Join),
    /// Children: all join inputs followed by the conjunctive join predicate.
    LogicalNAryJoin,
    LogicalUnion(SetOp),
    LogicalUnionAll(SetOp),
    LogicalCteAnchor(CteId),
    LogicalCteProducer(CteProducer),
    LogicalCteConsumer(CteConsumer),
    LogicalSequenceProject(SequenceProject),
    LogicalConstTableGet(ConstTable),
    LogicalInsert(Insert),
}

impl LogicalOperator {
    pub fn is_dml(&self) -> bool {
        matches!(self, LogicalOperator::LogicalInsert(_))
    }

    /// Inner joins, binary or n-ary.
    pub fn is_inner_join(&self) -> bool {
        match self {
            LogicalOperator::LogicalJoin(join) => join.is_inner(),
            LogicalOperator::LogicalNAryJoin => true,
            _ => false,
        }
    }

    pub fn is_left_outer_join(&self) -> bool {
        matches!(self, LogicalOperator::LogicalJoin(join) if join.join_type() == JoinType::LeftOuter)
    }

    pub fn is_union_or_union_all(&self) -> bool {
        matches!(
            self,
            LogicalOperator::LogicalUnion(_) | LogicalOperator::LogicalUnionAll(_)
        )
    }

    /// Operators with exactly one relational child.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            LogicalOperator::LogicalSelect
                | LogicalOperator::LogicalProject
                | LogicalOperator::LogicalGbAgg(_)
                | LogicalOperator::LogicalLimit(_)
                | LogicalOperator::LogicalSequenceProject(_)
                | LogicalOperator::LogicalCteAnchor(_)
                | LogicalOperator::LogicalInsert(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogicalOperator::LogicalGet(_) => "Get",
            LogicalOperator::LogicalSelect => "Select",
            LogicalOperator::LogicalProject => "Project",
            LogicalOperator::LogicalGbAgg(_) => "GbAgg",
            LogicalOperator::LogicalLimit(_) => "Limit",
            LogicalOperator::LogicalJoin(_) => "Join",
            LogicalOperator::LogicalNAryJoin => "NAryJoin",
            LogicalOperator::LogicalUnion(_) => "Union",
            LogicalOperator::LogicalUnionAll(_) => "UnionAll",
            LogicalOperator::LogicalCteAnchor(_) => "CteAnchor",
            LogicalOperator::LogicalCteProducer(_) => "CteProducer",
            LogicalOperator::LogicalCteConsumer(_) => "CteConsumer",
            LogicalOperator::LogicalSequenceProject(_) => "SequenceProject",
            LogicalOperator::LogicalConstTableGet(_) => "ConstTableGet",
            LogicalOperator::LogicalInsert(_) => "Insert",
        }
    }
}
