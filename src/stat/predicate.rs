use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use enum_as_inner::EnumAsInner;
use itertools::Itertools;

use crate::operator::{CmpType, ColumnRef, ColumnSet};
use crate::stat::{Point, DEFAULT_SCALE_FACTOR};

/// `column <cmp> point`.
#[derive(Clone, Debug, PartialEq)]
pub struct PointPred {
    column: ColumnRef,
    cmp: CmpType,
    point: Point,
}

impl PointPred {
    pub fn new(column: ColumnRef, cmp: CmpType, point: Point) -> Self {
        Self { column, cmp, point }
    }

    pub fn column(&self) -> ColumnRef {
        self.column
    }

    pub fn cmp(&self) -> CmpType {
        self.cmp
    }

    pub fn point(&self) -> &Point {
        &self.point
    }
}

/// `column LIKE pattern`, estimated from the shape of the pattern alone.
#[derive(Clone, Debug, PartialEq)]
pub struct LikePred {
    column: ColumnRef,
    pattern: String,
    scale_factor: f64,
}

impl LikePred {
    pub fn new<S: Into<String>>(column: ColumnRef, pattern: S, scale_factor: f64) -> Self {
        Self {
            column,
            pattern: pattern.into(),
            scale_factor,
        }
    }

    pub fn column(&self) -> ColumnRef {
        self.column
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }
}

/// A predicate histograms cannot evaluate. It filters by a fixed scale factor.
#[derive(Clone, Debug, PartialEq)]
pub struct UnsupportedPred {
    column: Option<ColumnRef>,
    cmp: CmpType,
    scale_factor: f64,
}

impl UnsupportedPred {
    pub fn new(column: Option<ColumnRef>, cmp: CmpType) -> Self {
        Self::with_scale_factor(column, cmp, DEFAULT_SCALE_FACTOR)
    }

    pub fn with_scale_factor(column: Option<ColumnRef>, cmp: CmpType, scale_factor: f64) -> Self {
        Self {
            column,
            cmp,
            scale_factor,
        }
    }

    pub fn column(&self) -> Option<ColumnRef> {
        self.column
    }

    pub fn cmp(&self) -> CmpType {
        self.cmp
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }
}

/// A filter predicate in the shape the statistics engine understands.
#[derive(Clone, Debug, PartialEq, EnumAsInner)]
pub enum StatsPred {
    Point(PointPred),
    Like(LikePred),
    Conj(Vec<StatsPred>),
    Disj(Vec<StatsPred>),
    Unsupported(UnsupportedPred),
}

impl StatsPred {
    /// The conjunction that keeps every row.
    pub fn always_true() -> StatsPred {
        StatsPred::Conj(vec![])
    }

    pub fn point(column: ColumnRef, cmp: CmpType, point: Point) -> StatsPred {
        StatsPred::Point(PointPred::new(column, cmp, point))
    }

    /// The single column the predicate is on, if there is one.
    ///
    /// Conjunctions and disjunctions have a column only when all their children agree on it.
    pub fn column(&self) -> Option<ColumnRef> {
        match self {
            StatsPred::Point(p) => Some(p.column()),
            StatsPred::Like(p) => Some(p.column()),
            StatsPred::Unsupported(p) => p.column(),
            StatsPred::Conj(children) | StatsPred::Disj(children) => {
                let mut columns = children.iter().map(StatsPred::column);
                let first = columns.next()??;
                columns.all(|c| c == Some(first)).then_some(first)
            }
        }
    }

    pub fn is_conj_or_disj(&self) -> bool {
        matches!(self, StatsPred::Conj(_) | StatsPred::Disj(_))
    }

    /// An unsupported predicate over an expression rather than a plain column, e.g. `a + b > 5`.
    pub fn is_unsupported_on_expression(&self) -> bool {
        matches!(self, StatsPred::Unsupported(p) if p.column().is_none())
    }

    /// Number of top-level predicates.
    pub fn len(&self) -> usize {
        match self {
            StatsPred::Conj(children) | StatsPred::Disj(children) => children.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All columns any leaf predicate refers to.
    pub fn used_columns(&self) -> ColumnSet {
        let mut columns = ColumnSet::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns(&self, columns: &mut ColumnSet) {
        match self {
            StatsPred::Conj(children) | StatsPred::Disj(children) => {
                for child in children {
                    child.collect_columns(columns);
                }
            }
            other => columns.extend(other.column()),
        }
    }

    /// Orders children so predicates on the same column are adjacent and column-less ones come
    /// last.
    pub fn sorted_children(children: &[StatsPred]) -> Vec<&StatsPred> {
        children
            .iter()
            .sorted_by(|a, b| compare_by_column(a.column(), b.column()))
            .collect()
    }
}

fn compare_by_column(a: Option<ColumnRef>, b: Option<ColumnRef>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.id().cmp(&b.id()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Display for StatsPred {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsPred::Point(p) => write!(f, "{} {} {}", p.column().id(), p.cmp(), p.point()),
            StatsPred::Like(p) => write!(f, "{} LIKE '{}'", p.column().id(), p.pattern()),
            StatsPred::Conj(children) => write!(f, "({})", children.iter().join(" AND ")),
            StatsPred::Disj(children) => write!(f, "({})", children.iter().join(" OR ")),
            StatsPred::Unsupported(p) => match p.column() {
                Some(c) => write!(f, "unsupported({} {})", c.id(), p.cmp()),
                None => write!(f, "unsupported({})", p.cmp()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{DataType, Datum};
    use crate::operator::ColumnFactory;

    #[test]
    fn test_common_column() {
        let factory = ColumnFactory::new();
        let source = factory.new_source();
        let a = factory.table_column(source, DataType::Int, true);
        let b = factory.table_column(source, DataType::Int, true);

        let same = StatsPred::Disj(vec![
            StatsPred::point(a, CmpType::Eq, Point::new(Datum::Int(1))),
            StatsPred::point(a, CmpType::Eq, Point::new(Datum::Int(2))),
        ]);
        assert_eq!(Some(a), same.column());

        let mixed = StatsPred::Conj(vec![
            StatsPred::point(a, CmpType::Eq, Point::new(Datum::Int(1))),
            StatsPred::point(b, CmpType::L, Point::new(Datum::Int(2))),
        ]);
        assert_eq!(None, mixed.column());
        assert_eq!(2, mixed.used_columns().len());
        assert_eq!(None, StatsPred::always_true().column());
    }

    #[test]
    fn test_column_less_predicates_sort_last() {
        let factory = ColumnFactory::new();
        let source = factory.new_source();
        let a = factory.table_column(source, DataType::Int, true);
        let b = factory.table_column(source, DataType::Int, true);
        let children = vec![
            StatsPred::Unsupported(UnsupportedPred::new(None, CmpType::Other)),
            StatsPred::point(b, CmpType::Eq, Point::new(Datum::Int(1))),
            StatsPred::point(a, CmpType::Eq, Point::new(Datum::Int(1))),
        ];
        let sorted = StatsPred::sorted_children(&children);
        assert_eq!(Some(a), sorted[0].column());
        assert_eq!(Some(b), sorted[1].column());
        assert!(sorted[2].is_unsupported_on_expression());
    }
}
