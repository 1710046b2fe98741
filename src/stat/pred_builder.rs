//! Translation of scalar filter and join predicates into [`StatsPred`]s.

use log::trace;

use crate::config::StatisticsConfig;
use crate::datum::{DataType, Datum};
use crate::expr::{
    conjunction, conjuncts, const_datum, dedup_exprs, disjuncts, ident_column, is_not, is_or,
    ExprRef,
};
use crate::operator::{ArrayCmpKind, CmpType, ColumnRef, ColumnSet, ScalarOperator};
use crate::stat::{
    like_scale_factor, Histogram, LikePred, Point, StatsPred, UnsupportedPred,
    NEUTRAL_SCALE_FACTOR,
};

/// Looks through a cast on top of `expr`.
fn strip_cast(expr: &ExprRef) -> &ExprRef {
    match expr.scalar_op() {
        Some(ScalarOperator::ScalarCast(_)) => expr.child(0),
        _ => expr,
    }
}

fn ident_ignore_cast(expr: &ExprRef) -> Option<ColumnRef> {
    ident_column(strip_cast(expr))
}

fn const_ignore_cast(expr: &ExprRef) -> Option<&Datum> {
    const_datum(strip_cast(expr))
}

/// `ident <cmp> const` or `const <cmp> ident`, normalized to the column on the left.
fn ident_cmp_const(expr: &ExprRef) -> Option<(ColumnRef, CmpType, &Datum)> {
    let ScalarOperator::ScalarCmp(cmp) = expr.scalar_op()? else {
        return None;
    };
    let (left, right) = (expr.child(0), expr.child(1));
    if let (Some(column), Some(datum)) = (ident_ignore_cast(left), const_ignore_cast(right)) {
        return Some((column, cmp.cmp_type(), datum));
    }
    if let (Some(datum), Some(column)) = (const_ignore_cast(left), ident_ignore_cast(right)) {
        return Some((column, cmp.cmp_type().commuted(), datum));
    }
    None
}

/// `ident IS DISTINCT FROM const`.
fn ident_idf_const(expr: &ExprRef) -> Option<(ColumnRef, &Datum)> {
    match expr.scalar_op()? {
        ScalarOperator::ScalarIsDistinctFrom(_) => {
            let (left, right) = (expr.child(0), expr.child(1));
            match (ident_ignore_cast(left), const_ignore_cast(right)) {
                (Some(column), Some(datum)) => Some((column, datum)),
                _ => match (const_ignore_cast(left), ident_ignore_cast(right)) {
                    (Some(datum), Some(column)) => Some((column, datum)),
                    _ => None,
                },
            }
        }
        _ => None,
    }
}

/// `ident IS NOT DISTINCT FROM const`, spelled as the negation of IDF.
fn ident_indf_const(expr: &ExprRef) -> Option<(ColumnRef, &Datum)> {
    if is_not(expr) {
        ident_idf_const(expr.child(0))
    } else {
        None
    }
}

fn null_tested_column(expr: &ExprRef) -> Option<ColumnRef> {
    match expr.scalar_op()? {
        ScalarOperator::ScalarNullTest => ident_column(expr.child(0)),
        _ => None,
    }
}

/// A bare boolean column or its negation, with the value it must take.
fn boolean_ident(expr: &ExprRef) -> Option<(ColumnRef, bool)> {
    if let Some(column) = ident_column(expr) {
        return (column.data_type() == DataType::Bool).then_some((column, true));
    }
    if is_not(expr) {
        let column = ident_column(expr.child(0))?;
        return (column.data_type() == DataType::Bool).then_some((column, false));
    }
    None
}

/// Builds statistics predicates from scalar expressions.
///
/// Predicates that only refer to outer references are constant for one evaluation of the
/// filter and are skipped.
pub struct StatsPredBuilder<'a> {
    config: &'a StatisticsConfig,
    outer_refs: &'a ColumnSet,
}

impl<'a> StatsPredBuilder<'a> {
    pub fn new(config: &'a StatisticsConfig, outer_refs: &'a ColumnSet) -> Self {
        Self { config, outer_refs }
    }

    /// The statistics predicate of a filter expression; never fails.
    pub fn build(&self, expr: &ExprRef) -> StatsPred {
        let pred = if is_or(expr) {
            self.disjunction(expr)
        } else {
            self.conjunction(expr)
        };
        let pred = pred.unwrap_or_else(StatsPred::always_true);
        trace!("statistics predicate of {}: {}", expr, pred);
        pred
    }

    fn only_outer_refs(&self, expr: &ExprRef) -> bool {
        let props = expr.scalar_props();
        let used = props.used_columns();
        !used.is_empty() && used.is_subset(self.outer_refs)
    }

    fn conjunction(&self, expr: &ExprRef) -> Option<StatsPred> {
        let mut children = vec![];
        for conjunct in conjuncts(expr) {
            if self.only_outer_refs(&conjunct) {
                continue;
            }
            if is_or(&conjunct) {
                children.extend(self.disjunction(&conjunct));
            } else {
                self.add_supported(&conjunct, &mut children);
            }
        }
        (!children.is_empty()).then_some(StatsPred::Conj(children))
    }

    fn disjunction(&self, expr: &ExprRef) -> Option<StatsPred> {
        let mut children = vec![];
        for disjunct in dedup_exprs(disjuncts(expr)) {
            if self.only_outer_refs(&disjunct) {
                continue;
            }
            self.add_supported(&disjunct, &mut children);
        }
        (!children.is_empty()).then_some(StatsPred::Disj(children))
    }

    fn add_supported(&self, expr: &ExprRef, preds: &mut Vec<StatsPred>) {
        if self.only_outer_refs(expr) {
            return;
        }
        if const_datum(expr).is_some() {
            preds.push(StatsPred::Unsupported(UnsupportedPred::with_scale_factor(
                None,
                CmpType::Other,
                NEUTRAL_SCALE_FACTOR,
            )));
            return;
        }
        if let Some(ScalarOperator::ScalarArrayCmp(_)) = expr.scalar_op() {
            self.array_cmp(expr, preds);
            return;
        }

        let pred = if is_or(expr) {
            self.disjunction(expr)
        } else if let Some((column, value)) = boolean_ident(expr) {
            Some(self.point_or_unsupported(column, CmpType::Eq, Datum::Bool(value)))
        } else if matches!(ident_cmp_const(expr), Some((_, CmpType::Like, _))) {
            Some(self.like(expr))
        } else if let Some((column, cmp, datum)) = ident_cmp_const(expr) {
            Some(self.point_or_unsupported(column, cmp, datum.clone()))
        } else if let Some((column, datum)) = ident_idf_const(expr) {
            Some(self.point_or_unsupported(column, CmpType::IDF, datum.clone()))
        } else if let Some((column, datum)) = ident_indf_const(expr) {
            Some(self.point_or_unsupported(column, CmpType::INDF, datum.clone()))
        } else if conjuncts(expr).len() > 1 {
            self.conjunction(expr)
        } else if let Some(column) = null_tested_column(expr) {
            Some(self.point_or_unsupported(column, CmpType::Eq, Datum::Null(column.data_type())))
        } else if let Some(column) = is_not(expr)
            .then(|| null_tested_column(expr.child(0)))
            .flatten()
        {
            Some(self.point_or_unsupported(column, CmpType::NEq, Datum::Null(column.data_type())))
        } else {
            Some(self.unsupported(expr))
        };
        preds.extend(pred);
    }

    fn point_or_unsupported(&self, column: ColumnRef, cmp: CmpType, datum: Datum) -> StatsPred {
        if !Histogram::supports_filter(cmp) || !column.data_type().stats_comparable_with(&datum) {
            return StatsPred::Unsupported(UnsupportedPred::new(Some(column), cmp));
        }
        StatsPred::point(column, cmp, Point::new(datum))
    }

    fn like(&self, expr: &ExprRef) -> StatsPred {
        let Some((column, _, datum)) = ident_cmp_const(expr) else {
            return StatsPred::Unsupported(UnsupportedPred::new(None, CmpType::Like));
        };
        if !column.data_type().stats_comparable_with(datum) {
            return StatsPred::Unsupported(UnsupportedPred::new(Some(column), CmpType::Like));
        }
        match datum.as_text() {
            Some(pattern) => StatsPred::Like(LikePred::new(
                column,
                pattern,
                like_scale_factor(self.config.like(), pattern),
            )),
            None => StatsPred::Like(LikePred::new(column, "", NEUTRAL_SCALE_FACTOR)),
        }
    }

    /// Anything else, attributed to a column when exactly one local column is involved.
    fn unsupported(&self, expr: &ExprRef) -> StatsPred {
        let props = expr.scalar_props();
        let mut local = props
            .used_columns()
            .iter()
            .filter(|c| !self.outer_refs.contains(*c));
        let column = match (local.next(), local.next()) {
            (Some(column), None) => Some(*column),
            _ => None,
        };
        let cmp = match expr.scalar_op() {
            Some(ScalarOperator::ScalarCmp(cmp)) => cmp.cmp_type(),
            _ => CmpType::Other,
        };
        StatsPred::Unsupported(UnsupportedPred::new(column, cmp))
    }

    /// `col = ANY (c1, c2, ...)` becomes a disjunction of points, `col op ALL (...)` adds one
    /// point per element to the enclosing list.
    fn array_cmp(&self, expr: &ExprRef, preds: &mut Vec<StatsPred>) {
        let Some(ScalarOperator::ScalarArrayCmp(array_cmp)) = expr.scalar_op() else {
            return;
        };
        let column = ident_ignore_cast(expr.child(0));
        let array = expr.child(1);
        let elements_supported = matches!(array.scalar_op(), Some(ScalarOperator::ScalarArray(_)))
            && array
                .children()
                .iter()
                .all(|e| const_datum(e).is_some() || ident_column(e).is_some());
        let Some(column) = column.filter(|_| elements_supported) else {
            preds.push(StatsPred::Unsupported(UnsupportedPred::new(
                None,
                CmpType::Other,
            )));
            return;
        };

        let cmp = array_cmp.comparison().cmp_type();
        if !Histogram::supports_filter(cmp) {
            preds.push(StatsPred::Unsupported(UnsupportedPred::new(Some(column), cmp)));
            return;
        }

        let points = array
            .children()
            .iter()
            .filter_map(|e| const_datum(e))
            .map(|datum| self.point_or_unsupported(column, cmp, datum.clone()));
        match array_cmp.kind() {
            ArrayCmpKind::Any => preds.push(StatsPred::Disj(points.collect())),
            ArrayCmpKind::All => preds.extend(points),
        }
    }
}

/// `left <cmp> right` between columns of two different join inputs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JoinPred {
    left: ColumnRef,
    cmp: CmpType,
    right: ColumnRef,
}

impl JoinPred {
    pub fn new(left: ColumnRef, cmp: CmpType, right: ColumnRef) -> Self {
        Self { left, cmp, right }
    }

    pub fn left(&self) -> ColumnRef {
        self.left
    }

    pub fn cmp(&self) -> CmpType {
        self.cmp
    }

    pub fn right(&self) -> ColumnRef {
        self.right
    }

    /// The same predicate seen from the other input.
    pub fn swapped(&self) -> JoinPred {
        JoinPred::new(self.right, self.cmp.commuted(), self.left)
    }
}

/// Join predicates usable for histogram joins, plus a filter for the remaining conjuncts.
#[derive(Clone, Debug, Default)]
pub struct JoinPredicates {
    pub preds: Vec<JoinPred>,
    pub unsupported: Option<StatsPred>,
}

fn column_cmp_column(expr: &ExprRef) -> Option<(ColumnRef, CmpType, ColumnRef)> {
    let (cmp, operands) = match expr.scalar_op()? {
        ScalarOperator::ScalarCmp(cmp) => (cmp.cmp_type(), expr),
        ScalarOperator::ScalarIsDistinctFrom(_) => (CmpType::IDF, expr),
        ScalarOperator::ScalarBoolOp(_) if is_not(expr) => match expr.child(0).scalar_op()? {
            ScalarOperator::ScalarIsDistinctFrom(_) => (CmpType::INDF, expr.child(0)),
            _ => return None,
        },
        _ => return None,
    };
    let left = ident_ignore_cast(operands.child(0))?;
    let right = ident_ignore_cast(operands.child(1))?;
    Some((left, cmp, right))
}

impl<'a> StatsPredBuilder<'a> {
    /// Splits a join condition over `inputs` (the output columns of each join child) into
    /// column-to-column predicates and a filter over whatever else the inputs cover.
    pub fn join_preds(&self, expr: &ExprRef, inputs: &[ColumnSet]) -> JoinPredicates {
        let mut result = JoinPredicates::default();
        if expr.scalar_props().has_subquery() {
            return result;
        }
        let input_of = |column: &ColumnRef| inputs.iter().position(|cols| cols.contains(column));
        let covered = |used: &ColumnSet| used.iter().all(|c| input_of(c).is_some());

        let mut unsupported = vec![];
        for conjunct in conjuncts(expr) {
            if self.only_outer_refs(&conjunct) {
                continue;
            }
            if let Some((left, cmp, right)) = column_cmp_column(&conjunct) {
                if cmp != CmpType::Other {
                    if !left.data_type().stats_comparable(&right.data_type()) {
                        unsupported.push(conjunct);
                        continue;
                    }
                    match (input_of(&left), input_of(&right)) {
                        (Some(l), Some(r)) if l < r => {
                            result.preds.push(JoinPred::new(left, cmp, right));
                            continue;
                        }
                        (Some(l), Some(r)) if l > r => {
                            result.preds.push(JoinPred::new(right, cmp.commuted(), left));
                            continue;
                        }
                        _ => {}
                    }
                }
            }
            if covered(conjunct.scalar_props().used_columns()) {
                unsupported.push(conjunct);
            }
        }
        if !unsupported.is_empty() {
            result.unsupported = Some(self.build(&conjunction(unsupported)));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{disjunction, Expr};
    use crate::metadata::InMemoryMetadata;
    use crate::metadata::MetadataAccessor;
    use crate::operator::ColumnFactory;

    struct Fixture {
        metadata: InMemoryMetadata,
        factory: ColumnFactory,
        config: StatisticsConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                metadata: InMemoryMetadata::standard(),
                factory: ColumnFactory::new(),
                config: StatisticsConfig::new(),
            }
        }

        fn column(&self, data_type: DataType) -> ColumnRef {
            let source = self.factory.new_source();
            self.factory.table_column(source, data_type, true)
        }

        fn cmp(&self, cmp: CmpType, left: ExprRef, right: ExprRef) -> ExprRef {
            Expr::cmp(self.metadata.comparison(cmp).unwrap(), left, right)
        }
    }

    #[test]
    fn test_point_predicates() {
        let f = Fixture::new();
        let a = f.column(DataType::Int);
        let outer = ColumnSet::new();
        let builder = StatsPredBuilder::new(&f.config, &outer);

        let pred = builder.build(&f.cmp(CmpType::L, Expr::ident(a), Expr::int_const(5)));
        let children = pred.as_conj().unwrap();
        assert_eq!(1, children.len());
        let point = children[0].as_point().unwrap();
        assert_eq!(CmpType::L, point.cmp());
        assert_eq!(&Datum::Int(5), point.point().datum());

        // the constant on the left commutes the comparison
        let pred = builder.build(&f.cmp(CmpType::L, Expr::int_const(5), Expr::ident(a)));
        assert_eq!(CmpType::G, pred.as_conj().unwrap()[0].as_point().unwrap().cmp());
    }

    #[test]
    fn test_disjunction_and_in_list() {
        let f = Fixture::new();
        let a = f.column(DataType::Int);
        let outer = ColumnSet::new();
        let builder = StatsPredBuilder::new(&f.config, &outer);

        let or = disjunction([
            f.cmp(CmpType::Eq, Expr::ident(a), Expr::int_const(1)),
            f.cmp(CmpType::Eq, Expr::ident(a), Expr::int_const(2)),
        ]);
        let pred = builder.build(&or);
        assert_eq!(2, pred.as_disj().unwrap().len());
        assert_eq!(Some(a), pred.column());

        let in_list = Expr::array_cmp(
            f.metadata.comparison(CmpType::Eq).unwrap(),
            ArrayCmpKind::Any,
            Expr::ident(a),
            DataType::Int,
            vec![Expr::int_const(1), Expr::int_const(2), Expr::int_const(3)],
        );
        let pred = builder.build(&in_list);
        let disj = pred.as_conj().unwrap()[0].as_disj().unwrap();
        assert_eq!(3, disj.len());
    }

    #[test]
    fn test_null_tests_and_booleans() {
        let f = Fixture::new();
        let a = f.column(DataType::Int);
        let flag = f.column(DataType::Bool);
        let outer = ColumnSet::new();
        let builder = StatsPredBuilder::new(&f.config, &outer);

        let pred = builder.build(&Expr::is_null(Expr::ident(a)));
        let point = pred.as_conj().unwrap()[0].as_point().unwrap().clone();
        assert_eq!(CmpType::Eq, point.cmp());
        assert!(point.point().is_null());

        let pred = builder.build(&Expr::is_not_null(Expr::ident(a)));
        assert_eq!(CmpType::NEq, pred.as_conj().unwrap()[0].as_point().unwrap().cmp());

        let pred = builder.build(&Expr::not(Expr::ident(flag)));
        let point = pred.as_conj().unwrap()[0].as_point().unwrap().clone();
        assert_eq!(&Datum::Bool(false), point.point().datum());
    }

    #[test]
    fn test_like_and_unsupported() {
        let f = Fixture::new();
        let name = f.column(DataType::Text);
        let a = f.column(DataType::Int);
        let outer = ColumnSet::new();
        let builder = StatsPredBuilder::new(&f.config, &outer);

        let like = f.cmp(
            CmpType::Like,
            Expr::ident(name),
            Expr::constant(Datum::Text("abc%".into())),
        );
        let pred = builder.build(&like);
        let like = pred.as_conj().unwrap()[0].as_like().unwrap().clone();
        assert_eq!("abc%", like.pattern());
        assert!(like.scale_factor() > 1.0);

        // comparing an int column with text is not something histograms can answer
        let mismatch = f.cmp(
            CmpType::Eq,
            Expr::ident(a),
            Expr::constant(Datum::Text("x".into())),
        );
        let pred = builder.build(&mismatch);
        let unsupported = pred.as_conj().unwrap()[0].as_unsupported().unwrap().clone();
        assert_eq!(Some(a), unsupported.column());

        let pred = builder.build(&Expr::bool_const(true));
        assert!(pred.is_empty());
    }

    #[test]
    fn test_outer_references_are_skipped() {
        let f = Fixture::new();
        let a = f.column(DataType::Int);
        let outer_col = f.column(DataType::Int);
        let outer: ColumnSet = [outer_col].into_iter().collect();
        let builder = StatsPredBuilder::new(&f.config, &outer);

        let pred = builder.build(&conjunction([
            f.cmp(CmpType::Eq, Expr::ident(outer_col), Expr::int_const(1)),
            f.cmp(CmpType::Eq, Expr::ident(a), Expr::int_const(1)),
        ]));
        assert_eq!(1, pred.len());
        assert_eq!(Some(a), pred.column());
    }

    #[test]
    fn test_join_predicates() {
        let f = Fixture::new();
        let a = f.column(DataType::Int);
        let b = f.column(DataType::Int);
        let c = f.column(DataType::Int);
        let outer = ColumnSet::new();
        let builder = StatsPredBuilder::new(&f.config, &outer);
        let inputs: Vec<ColumnSet> = vec![[a, c].into_iter().collect(), [b].into_iter().collect()];

        let condition = conjunction([
            f.cmp(CmpType::Eq, Expr::ident(b), Expr::ident(a)),
            f.cmp(CmpType::L, Expr::ident(c), Expr::int_const(10)),
        ]);
        let join = builder.join_preds(&condition, &inputs);
        assert_eq!(vec![JoinPred::new(a, CmpType::Eq, b)], join.preds);
        let unsupported = join.unsupported.unwrap();
        assert_eq!(Some(c), unsupported.column());
    }
}
