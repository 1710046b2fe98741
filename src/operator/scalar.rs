use derive_more::{Display, From, Into};
use enum_as_inner::EnumAsInner;
use strum_macros::{AsRefStr, Display as StrumDisplay};

use crate::datum::{DataType, Datum};
use crate::operator::ColumnRef;

/// Catalog id of a scalar operator, resolved through the metadata accessor.
#[derive(Copy, Clone, Debug, Display, From, Into, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "op{}", _0)]
pub struct OperatorId(u32);

/// Comparison semantics of a scalar operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, StrumDisplay, AsRefStr)]
pub enum CmpType {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<>")]
    NEq,
    #[strum(serialize = "<")]
    L,
    #[strum(serialize = "<=")]
    LEq,
    #[strum(serialize = ">")]
    G,
    #[strum(serialize = ">=")]
    GEq,
    /// IS DISTINCT FROM
    IDF,
    /// IS NOT DISTINCT FROM
    INDF,
    #[strum(serialize = "LIKE")]
    Like,
    Other,
}

impl CmpType {
    /// Classifies an operator by its catalog name.
    pub fn from_op_name(name: &str) -> CmpType {
        match name {
            "=" => CmpType::Eq,
            "<>" => CmpType::NEq,
            "<" => CmpType::L,
            "<=" => CmpType::LEq,
            ">" => CmpType::G,
            ">=" => CmpType::GEq,
            "~~" => CmpType::Like,
            _ => CmpType::Other,
        }
    }

    /// The comparison obtained by swapping the operands.
    pub fn commuted(&self) -> CmpType {
        match self {
            CmpType::L => CmpType::G,
            CmpType::LEq => CmpType::GEq,
            CmpType::G => CmpType::L,
            CmpType::GEq => CmpType::LEq,
            other => *other,
        }
    }

    /// The comparison that holds exactly when this one is false for non-null operands.
    pub fn inverse(&self) -> Option<CmpType> {
        match self {
            CmpType::Eq => Some(CmpType::NEq),
            CmpType::NEq => Some(CmpType::Eq),
            CmpType::L => Some(CmpType::GEq),
            CmpType::LEq => Some(CmpType::G),
            CmpType::G => Some(CmpType::LEq),
            CmpType::GEq => Some(CmpType::L),
            CmpType::IDF => Some(CmpType::INDF),
            CmpType::INDF => Some(CmpType::IDF),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Comparison {
    op: OperatorId,
    cmp_type: CmpType,
}

impl Comparison {
    pub fn new(op: OperatorId, cmp_type: CmpType) -> Self {
        Self { op, cmp_type }
    }

    pub fn op(&self) -> OperatorId {
        self.op
    }

    pub fn cmp_type(&self) -> CmpType {
        self.cmp_type
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, StrumDisplay)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Function {
    name: String,
    return_type: DataType,
    strict: bool,
    volatile: bool,
    returns_set: bool,
}

impl Function {
    pub fn new<S: Into<String>>(name: S, return_type: DataType) -> Self {
        Self {
            name: name.into(),
            return_type,
            strict: true,
            volatile: false,
            returns_set: false,
        }
    }

    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    pub fn set_returning(mut self) -> Self {
        self.returns_set = true;
        self
    }

    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> DataType {
        self.return_type
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    pub fn returns_set(&self) -> bool {
        self.returns_set
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggFunction {
    name: String,
    distinct: bool,
}

impl AggFunction {
    pub fn new<S: Into<String>>(name: S, distinct: bool) -> Self {
        Self {
            name: name.into(),
            distinct,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }
}

/// A window function evaluated over the window specification at `spec_index` of the enclosing
/// sequence project.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WindowFunction {
    name: String,
    spec_index: usize,
}

impl WindowFunction {
    pub fn new<S: Into<String>>(name: S, spec_index: usize) -> Self {
        Self {
            name: name.into(),
            spec_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec_index(&self) -> usize {
        self.spec_index
    }

    pub fn with_spec_index(&self, spec_index: usize) -> Self {
        Self {
            name: self.name.clone(),
            spec_index,
        }
    }
}

/// Scalar subquery whose value is `column` of its relational child.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subquery {
    column: ColumnRef,
    generated_by_exists: bool,
    generated_by_quantified: bool,
}

impl Subquery {
    pub fn new(column: ColumnRef) -> Self {
        Self {
            column,
            generated_by_exists: false,
            generated_by_quantified: false,
        }
    }

    pub fn from_quantified(column: ColumnRef) -> Self {
        Self {
            column,
            generated_by_exists: false,
            generated_by_quantified: true,
        }
    }

    pub fn column(&self) -> ColumnRef {
        self.column
    }

    pub fn with_column(&self, column: ColumnRef) -> Self {
        Self { column, ..*self }
    }

    pub fn generated_by_quantified(&self) -> bool {
        self.generated_by_quantified
    }

    pub fn generated_by_exists(&self) -> bool {
        self.generated_by_exists
    }
}

/// `scalar OP ANY/ALL (subquery)`; children are the relational subquery and the scalar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuantifiedSubquery {
    comparison: Comparison,
    column: ColumnRef,
}

impl QuantifiedSubquery {
    pub fn new(comparison: Comparison, column: ColumnRef) -> Self {
        Self { comparison, column }
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn column(&self) -> ColumnRef {
        self.column
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, StrumDisplay)]
pub enum ArrayCmpKind {
    Any,
    All,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArrayComparison {
    comparison: Comparison,
    kind: ArrayCmpKind,
}

impl ArrayComparison {
    pub fn new(comparison: Comparison, kind: ArrayCmpKind) -> Self {
        Self { comparison, kind }
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn kind(&self) -> ArrayCmpKind {
        self.kind
    }
}

/// Scalar operator.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum ScalarOperator {
    ScalarIdent(ColumnRef),
    ScalarConst(Datum),
    ScalarCmp(Comparison),
    ScalarIsDistinctFrom(Comparison),
    ScalarBoolOp(BoolOp),
    /// `child IS NULL`
    ScalarNullTest,
    ScalarFunc(Function),
    ScalarAggFunc(AggFunction),
    ScalarWindowFunc(WindowFunction),
    ScalarCast(DataType),
    ScalarProjectList,
    /// Defines the column from its single child.
    ScalarProjectElement(ColumnRef),
    ScalarSubquery(Subquery),
    ScalarSubqueryAny(QuantifiedSubquery),
    ScalarSubqueryAll(QuantifiedSubquery),
    ScalarSubqueryExists,
    ScalarSubqueryNotExists,
    ScalarArrayCmp(ArrayComparison),
    ScalarArray(DataType),
}

impl ScalarOperator {
    pub fn is_subquery(&self) -> bool {
        matches!(
            self,
            ScalarOperator::ScalarSubquery(_)
                | ScalarOperator::ScalarSubqueryAny(_)
                | ScalarOperator::ScalarSubqueryAll(_)
                | ScalarOperator::ScalarSubqueryExists
                | ScalarOperator::ScalarSubqueryNotExists
        )
    }

    pub fn is_existential_subquery(&self) -> bool {
        matches!(
            self,
            ScalarOperator::ScalarSubqueryExists | ScalarOperator::ScalarSubqueryNotExists
        )
    }

    pub fn is_quantified_subquery(&self) -> bool {
        matches!(
            self,
            ScalarOperator::ScalarSubqueryAny(_) | ScalarOperator::ScalarSubqueryAll(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarOperator::ScalarIdent(_) => "Ident",
            ScalarOperator::ScalarConst(_) => "Const",
            ScalarOperator::ScalarCmp(_) => "Cmp",
            ScalarOperator::ScalarIsDistinctFrom(_) => "IsDistinctFrom",
            ScalarOperator::ScalarBoolOp(_) => "BoolOp",
            ScalarOperator::ScalarNullTest => "NullTest",
            ScalarOperator::ScalarFunc(_) => "Func",
            ScalarOperator::ScalarAggFunc(_) => "AggFunc",
            ScalarOperator::ScalarWindowFunc(_) => "WindowFunc",
            ScalarOperator::ScalarCast(_) => "Cast",
            ScalarOperator::ScalarProjectList => "ProjectList",
            ScalarOperator::ScalarProjectElement(_) => "ProjectElement",
            ScalarOperator::ScalarSubquery(_) => "Subquery",
            ScalarOperator::ScalarSubqueryAny(_) => "SubqueryAny",
            ScalarOperator::ScalarSubqueryAll(_) => "SubqueryAll",
            ScalarOperator::ScalarSubqueryExists => "SubqueryExists",
            ScalarOperator::ScalarSubqueryNotExists => "SubqueryNotExists",
            ScalarOperator::ScalarArrayCmp(_) => "ArrayCmp",
            ScalarOperator::ScalarArray(_) => "Array",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmp_type_names() {
        for cmp_type in [
            CmpType::Eq,
            CmpType::NEq,
            CmpType::L,
            CmpType::LEq,
            CmpType::G,
            CmpType::GEq,
        ] {
            assert_eq!(cmp_type, CmpType::from_op_name(&cmp_type.to_string()));
        }
        assert_eq!(CmpType::Like, CmpType::from_op_name("~~"));
        assert_eq!(CmpType::Other, CmpType::from_op_name("@@"));
    }

    #[test]
    fn test_commute_and_inverse() {
        assert_eq!(CmpType::GEq, CmpType::LEq.commuted());
        assert_eq!(CmpType::Eq, CmpType::Eq.commuted());
        assert_eq!(Some(CmpType::G), CmpType::LEq.inverse());
        assert_eq!(None, CmpType::Like.inverse());
    }
}
