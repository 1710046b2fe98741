use std::collections::BTreeMap;

use rust_orca_core::config::StatisticsConfig;
use rust_orca_core::datum::{DataType, Datum};
use rust_orca_core::operator::{CmpType, ColumnFactory, ColumnRef, ColumnSet};
use rust_orca_core::stat::{Bucket, Histogram, JoinPred, JoinPredicates, Point, Statistics, StatsPred};
use serde::Deserialize;

#[derive(Deserialize)]
struct BucketFixture {
    lower: i64,
    upper: i64,
    #[serde(default = "closed")]
    lower_closed: bool,
    #[serde(default = "closed")]
    upper_closed: bool,
    frequency: f64,
    distinct: f64,
}

fn closed() -> bool {
    true
}

#[derive(Deserialize)]
struct HistogramFixture {
    buckets: Vec<BucketFixture>,
    #[serde(default)]
    null_freq: f64,
}

#[derive(Deserialize)]
struct TableFixture {
    rows: f64,
    histogram: HistogramFixture,
}

const ORDERS: &str = r#"{
    "rows": 1000.0,
    "histogram": {
        "buckets": [
            {"lower": 0, "upper": 9, "frequency": 0.5, "distinct": 10.0},
            {"lower": 10, "upper": 19, "frequency": 0.3, "distinct": 10.0},
            {"lower": 20, "upper": 20, "frequency": 0.1, "distinct": 1.0}
        ],
        "null_freq": 0.1
    }
}"#;

const CUSTOMERS: &str = r#"{
    "rows": 20.0,
    "histogram": {
        "buckets": [
            {"lower": 0, "upper": 19, "upper_closed": true, "frequency": 1.0, "distinct": 20.0}
        ]
    }
}"#;

fn point(value: i64) -> Point {
    Point::new(Datum::Int(value))
}

fn histogram(fixture: &HistogramFixture) -> Histogram {
    let buckets = fixture
        .buckets
        .iter()
        .map(|b| {
            Bucket::new(
                point(b.lower),
                point(b.upper),
                b.lower_closed,
                b.upper_closed,
                b.frequency,
                b.distinct,
            )
        })
        .collect();
    Histogram::with_remainders(buckets, true, fixture.null_freq, 0.0, 0.0)
}

fn load(factory: &ColumnFactory, json: &str) -> (ColumnRef, Statistics) {
    let fixture: TableFixture = serde_json::from_str(json).unwrap();
    let column = factory.table_column(factory.new_source(), DataType::Int, true);
    let histograms: BTreeMap<_, _> = [(column, histogram(&fixture.histogram))].into_iter().collect();
    let widths: BTreeMap<_, _> = [(column, 8.0)].into_iter().collect();
    let stats = Statistics::new(
        histograms,
        widths,
        fixture.rows,
        StatisticsConfig::shared_default(),
    );
    (column, stats)
}

#[test]
fn test_fixture_histogram_is_normalized() {
    let fixture: TableFixture = serde_json::from_str(ORDERS).unwrap();
    let hist = histogram(&fixture.histogram);
    assert!(hist.is_valid());
    assert!(hist.is_normalized());
    assert!((hist.distinct() - 22.0).abs() < 1e-6);
}

#[test]
fn test_point_filter_selects_one_value() {
    let factory = ColumnFactory::new();
    let (column, orders) = load(&factory, ORDERS);

    let filtered = orders.filter(&StatsPred::point(column, CmpType::Eq, point(5)), true);
    assert!((filtered.rows() - 50.0).abs() < 1.0, "got {}", filtered.rows());

    let singleton = orders.filter(&StatsPred::point(column, CmpType::Eq, point(20)), true);
    assert!((singleton.rows() - 100.0).abs() < 1.0, "got {}", singleton.rows());
}

#[test]
fn test_range_filter_keeps_matching_buckets() {
    let factory = ColumnFactory::new();
    let (column, orders) = load(&factory, ORDERS);
    let filtered = orders.filter(&StatsPred::point(column, CmpType::GEq, point(10)), true);
    assert!((filtered.rows() - 400.0).abs() < 1.0, "got {}", filtered.rows());
    let hist = filtered.histogram(column).unwrap();
    assert!(hist.buckets().iter().all(|b| !b.lower().less(&point(10))));
}

#[test]
fn test_value_outside_histogram_is_rare() {
    let factory = ColumnFactory::new();
    let (column, orders) = load(&factory, ORDERS);
    let filtered = orders.filter(&StatsPred::point(column, CmpType::Eq, point(500)), true);
    assert!(filtered.rows() < orders.rows() / 100.0);
}

#[test]
fn test_foreign_key_join() {
    let factory = ColumnFactory::new();
    let (order_customer, orders) = load(&factory, ORDERS);
    let (customer, customers) = load(&factory, CUSTOMERS);
    let preds = JoinPredicates {
        preds: vec![JoinPred::new(order_customer, CmpType::Eq, customer)],
        unsupported: None,
    };

    let joined = orders.inner_join(&customers, &preds);
    // NULL keys never match.
    assert!(joined.rows() < orders.rows());
    assert!(joined.rows() > orders.rows() / 2.0);
    assert!(joined.histogram(order_customer).is_some());
    assert!(joined.histogram(customer).is_some());

    let outer = orders.left_outer_join(&customers, &preds);
    assert!(outer.rows() >= orders.rows() - 1.0);
}

#[test]
fn test_grouping_on_join_key() {
    let factory = ColumnFactory::new();
    let (column, orders) = load(&factory, ORDERS);
    let grouping: ColumnSet = [column].into_iter().collect();
    let groups = orders.groups(&grouping, None);
    assert!(groups <= 22.0 + 1e-6);
    assert!(groups >= 1.0);
}
