//! Filter clause building for SQL WHERE clauses
//!
//! Filters are a conjunction of `"column" OP ?` fragments. Each fragment binds
//! exactly one positional parameter, and `params` stays index-aligned with the
//! placeholders in fragment order.

use std::fmt;
use std::str::FromStr;

use crate::error::{CohortStoreError, Result};
use crate::sql::sanitize::quote_identifier;
use crate::types::Value;

/// Comparison operators accepted by [`Predicate::Compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    Like,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 7] = [
        ComparisonOp::Gt,
        ComparisonOp::Gte,
        ComparisonOp::Lt,
        ComparisonOp::Lte,
        ComparisonOp::Eq,
        ComparisonOp::Ne,
        ComparisonOp::Like,
    ];

    /// Parse an operator token, case-insensitively
    ///
    /// # Example
    /// ```
    /// use cohort_store::sql::ComparisonOp;
    ///
    /// assert_eq!(ComparisonOp::parse(">=").unwrap(), ComparisonOp::Gte);
    /// assert_eq!(ComparisonOp::parse("like").unwrap(), ComparisonOp::Like);
    /// assert!(ComparisonOp::parse("<>").is_err());
    /// ```
    pub fn parse(op: &str) -> Result<Self> {
        let normalized = op.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_sql() == normalized)
            .ok_or_else(|| {
                CohortStoreError::validation(format!(
                    "Unsupported operator '{}'. Allowed: {}",
                    op,
                    Self::ALL
                        .iter()
                        .map(|o| o.as_sql())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    /// SQL spelling of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Like => "LIKE",
        }
    }
}

impl FromStr for ComparisonOp {
    type Err = CohortStoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single-column predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `"column" = ?`
    Equals(Value),
    /// `"column" OP ?`
    Compare(ComparisonOp, Value),
}

impl Predicate {
    pub fn eq(value: impl Into<Value>) -> Self {
        Predicate::Equals(value.into())
    }

    pub fn compare(op: ComparisonOp, value: impl Into<Value>) -> Self {
        Predicate::Compare(op, value.into())
    }

    /// Build a comparison from an operator token, rejecting unknown operators
    pub fn parse(op: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Predicate::Compare(ComparisonOp::parse(op)?, value.into()))
    }

    fn render(&self, column: &str) -> (String, Value) {
        let column = quote_identifier(column);
        match self {
            Predicate::Equals(value) => (format!("{} = ?", column), value.clone()),
            Predicate::Compare(op, value) => {
                (format!("{} {} ?", column, op.as_sql()), value.clone())
            }
        }
    }
}

/// Ordered conjunction of filter fragments with their bound parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterClauses {
    clauses: Vec<String>,
    params: Vec<Value>,
    columns: Vec<String>,
}

impl FilterClauses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one predicate on `column`
    pub fn add(&mut self, column: &str, predicate: &Predicate) {
        let (clause, param) = predicate.render(column);
        self.clauses.push(clause);
        self.params.push(param);
        self.columns.push(column.to_string());
    }

    /// Append an operator given as text; nothing is appended if it is unknown
    pub fn add_comparison(&mut self, column: &str, op: &str, value: Value) -> Result<()> {
        let predicate = Predicate::Compare(ComparisonOp::parse(op)?, value);
        self.add(column, &predicate);
        Ok(())
    }

    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Unquoted column names, one per clause
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn clear(&mut self) {
        self.clauses.clear();
        self.params.clear();
        self.columns.clear();
    }

    /// WHERE body: `1=1` when empty, otherwise the fragments joined with AND
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            "1=1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder_count(sql: &str) -> usize {
        sql.matches('?').count()
    }

    // ==================== Operator Parsing ====================

    #[test]
    fn test_parse_all_operators() {
        assert_eq!(ComparisonOp::parse(">").unwrap(), ComparisonOp::Gt);
        assert_eq!(ComparisonOp::parse(">=").unwrap(), ComparisonOp::Gte);
        assert_eq!(ComparisonOp::parse("<").unwrap(), ComparisonOp::Lt);
        assert_eq!(ComparisonOp::parse("<=").unwrap(), ComparisonOp::Lte);
        assert_eq!(ComparisonOp::parse("=").unwrap(), ComparisonOp::Eq);
        assert_eq!(ComparisonOp::parse("!=").unwrap(), ComparisonOp::Ne);
        assert_eq!(ComparisonOp::parse("LIKE").unwrap(), ComparisonOp::Like);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(ComparisonOp::parse("like").unwrap(), ComparisonOp::Like);
        assert_eq!(ComparisonOp::parse("LiKe").unwrap(), ComparisonOp::Like);
        assert_eq!("like".parse::<ComparisonOp>().unwrap().to_string(), "LIKE");
    }

    #[test]
    fn test_parse_rejects_unknown() {
        for op in [
            "<>", "==", "IN", "BETWEEN", "", "; DROP TABLE raw", " >", "LIKE ", " = ",
        ] {
            let err = ComparisonOp::parse(op).unwrap_err();
            assert!(matches!(err, CohortStoreError::Validation(_)), "{op}");
        }
    }

    #[test]
    fn test_parse_error_lists_allowed() {
        let err = ComparisonOp::parse("<>").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'<>'"));
        assert!(msg.contains(">, >=, <, <=, =, !=, LIKE"));
    }

    // ==================== Clause Rendering ====================

    #[test]
    fn test_equals_clause() {
        let mut filters = FilterClauses::new();
        filters.add("Sex", &Predicate::eq("f"));

        assert_eq!(filters.where_sql(), "\"Sex\" = ?");
        assert_eq!(filters.params(), &[Value::from("f")]);
    }

    #[test]
    fn test_compare_clause() {
        let mut filters = FilterClauses::new();
        filters.add("Age Scan", &Predicate::compare(ComparisonOp::Gt, 70));

        assert_eq!(filters.where_sql(), "\"Age Scan\" > ?");
        assert_eq!(filters.params(), &[Value::Integer(70)]);
    }

    #[test]
    fn test_like_clause() {
        let mut filters = FilterClauses::new();
        filters.add_comparison("Notes", "like", Value::from("%lesion%")).unwrap();

        assert_eq!(filters.where_sql(), "\"Notes\" LIKE ?");
    }

    #[test]
    fn test_clauses_and_joined_in_order() {
        let mut filters = FilterClauses::new();
        filters.add("Study", &Predicate::eq("UK Biobank"));
        filters.add("Sex", &Predicate::eq("f"));
        filters.add("Age Scan", &Predicate::compare(ComparisonOp::Gte, 70));

        assert_eq!(
            filters.where_sql(),
            "\"Study\" = ? AND \"Sex\" = ? AND \"Age Scan\" >= ?"
        );
        assert_eq!(
            filters.params(),
            &[Value::from("UK Biobank"), Value::from("f"), Value::from(70)]
        );
    }

    #[test]
    fn test_empty_where_is_sentinel() {
        let filters = FilterClauses::new();
        assert!(filters.is_empty());
        assert_eq!(filters.where_sql(), "1=1");
        assert!(filters.params().is_empty());
    }

    #[test]
    fn test_quoted_column_name_in_clause() {
        let mut filters = FilterClauses::new();
        filters.add("odd\"name", &Predicate::eq(1));
        assert_eq!(filters.where_sql(), "\"odd\"\"name\" = ?");
    }

    // ==================== Invariants ====================

    #[test]
    fn test_placeholders_match_params() {
        let mut filters = FilterClauses::new();
        for (i, op) in ComparisonOp::ALL.iter().enumerate() {
            filters.add(&format!("col{i}"), &Predicate::compare(*op, i as i64));
            assert_eq!(
                placeholder_count(&filters.where_sql()),
                filters.params().len()
            );
        }
        assert_eq!(filters.len(), 7);
    }

    #[test]
    fn test_rejected_comparison_leaves_state_unchanged() {
        let mut filters = FilterClauses::new();
        filters.add("Sex", &Predicate::eq("m"));
        let before = filters.clone();

        assert!(filters.add_comparison("Age", "<>", Value::from(3)).is_err());
        assert_eq!(filters, before);
    }

    #[test]
    fn test_columns_track_clauses() {
        let mut filters = FilterClauses::new();
        filters.add("Study", &Predicate::eq("A"));
        filters.add("odd\"name", &Predicate::eq(1));
        assert_eq!(
            filters.columns(),
            &["Study".to_string(), "odd\"name".to_string()]
        );
    }

    #[test]
    fn test_clear() {
        let mut filters = FilterClauses::new();
        filters.add("Sex", &Predicate::eq("m"));
        filters.clear();
        assert_eq!(filters, FilterClauses::new());
    }
}
