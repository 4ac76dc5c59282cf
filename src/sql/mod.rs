//! SQL utilities for the cohort store
//!
//! Provides identifier quoting, filter clauses, metric column selection and
//! ingestion DDL.

pub mod ddl;
pub mod filter;
pub mod sanitize;
pub mod select;

pub use ddl::{ColumnSpec, DdlGenerator};
pub use filter::{ComparisonOp, FilterClauses, Predicate};
pub use sanitize::{quote_identifier, quote_identifier_list};
pub use select::MetricSelector;
