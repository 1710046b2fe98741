//! ## Background
//!
//! A cost based optimizer explores alternatives of a logical expression and picks the cheapest
//! one. Exploration works best on expressions in a canonical shape: predicates pushed close to
//! the relations they filter, joins flattened, redundant operators and columns removed. Costing
//! needs cardinality estimates, which come from column histograms.
//!
//! This crate implements both of these concerns.
//!
//! ## Design
//!
//! ### Expressions
//!
//! An [`expr::Expr`] is an immutable tree node holding a logical or scalar operator and its
//! children. Trees are shared through `Rc`, and properties (output columns, not-null columns,
//! constraints, cardinality bounds) are derived lazily and cached per node.
//!
//! ### Preprocessor
//!
//! The [`preprocessor::Preprocessor`] runs a fixed pipeline of whole-tree rewrites. Every rewrite
//! is a pure function from tree to tree that shares unchanged subtrees with its input. The
//! pipeline covers CTE cleanup, subquery simplification, boolean normalization, predicate
//! inference from column constraints, the normalizer that pushes predicates down, and join and
//! projection collapsing.
//!
//! ### Statistics
//!
//! [`stat::Histogram`] models the value distribution of a column as ordered, non-overlapping
//! buckets plus NULL and NDV remainder fractions. [`stat::Statistics`] combines histograms of a
//! relation and derives the statistics of filters, joins, unions and aggregates from them.
//!
//! ## Reference
//!
//! 1. Soliman, M. A., et al. "Orca: a modular query optimizer architecture for big data."
//! Proceedings of the 2014 ACM SIGMOD international conference on Management of data. 2014.
//! 2. Graefe, G., 1995. The cascades framework for query optimization. IEEE Data Eng. Bull., 18(3),
//! pp.19-29.

#[macro_use]
extern crate prettytable;
#[macro_use]
extern crate lazy_static;

pub mod config;
pub mod constraint;
pub mod datum;
pub mod error;
pub mod expr;
pub mod metadata;
pub mod operator;
pub mod preprocessor;
pub mod properties;
pub mod stat;
