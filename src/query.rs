//! Cohort query builder state
//!
//! [`CohortQuery`] accumulates a cohort filter, ad-hoc column filters, an
//! optional column selection and row limit, and assembles them into one
//! parameterized `SELECT`. It performs no I/O; [`crate::CohortStore`] wraps it
//! with introspection and execution.

use tracing::debug;

use crate::error::{CohortStoreError, Result};
use crate::sql::filter::{FilterClauses, Predicate};
use crate::sql::sanitize::{quote_identifier, quote_identifier_list};
use crate::types::Value;

/// Lifecycle of a query between resets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    /// Nothing configured since construction or the last reset
    Fresh,
    /// At least one filter, selection or limit applied
    Configuring,
    /// SQL has been assembled; read-only until `reset()`
    Built,
}

/// Mutable builder state for one query session
#[derive(Debug, Clone)]
pub struct CohortQuery {
    table: String,
    study_column: String,
    filters: FilterClauses,
    selected_columns: Option<Vec<String>>,
    limit: Option<u64>,
    phase: QueryPhase,
}

impl CohortQuery {
    pub fn new(table: impl Into<String>, study_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            study_column: study_column.into(),
            filters: FilterClauses::new(),
            selected_columns: None,
            limit: None,
            phase: QueryPhase::Fresh,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn study_column(&self) -> &str {
        &self.study_column
    }

    pub fn phase(&self) -> QueryPhase {
        self.phase
    }

    pub fn filter_clauses(&self) -> &FilterClauses {
        &self.filters
    }

    pub fn selected_columns(&self) -> Option<&[String]> {
        self.selected_columns.as_deref()
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Every column the query names: filter columns first, then the selection
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        let selected = self.selected_columns.iter().flatten();
        for column in self.filters.columns().iter().chain(selected) {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
        columns
    }

    /// Clear filters, selection and limit; valid from any phase
    pub fn reset(&mut self) -> &mut Self {
        self.filters.clear();
        self.selected_columns = None;
        self.limit = None;
        self.phase = QueryPhase::Fresh;
        self
    }

    /// Restrict rows to one study
    pub fn select_cohort(&mut self, name: impl Into<Value>) -> Result<&mut Self> {
        let column = self.study_column.clone();
        self.filter(&column, Predicate::Equals(name.into()))
    }

    /// Add one predicate; combined with earlier ones by AND
    pub fn filter(&mut self, column: &str, predicate: Predicate) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.filters.add(column, &predicate);
        self.phase = QueryPhase::Configuring;
        Ok(self)
    }

    /// Add a predicate whose operator is given as text
    ///
    /// An unknown operator fails with `Validation` and appends nothing.
    pub fn filter_op(
        &mut self,
        column: &str,
        op: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        let predicate = Predicate::parse(op, value)?;
        self.filter(column, predicate)
    }

    /// Add several predicates, in order
    pub fn filters<I, S>(&mut self, filters: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (S, Predicate)>,
        S: AsRef<str>,
    {
        self.ensure_configurable()?;
        let filters: Vec<(S, Predicate)> = filters.into_iter().collect();
        if filters.is_empty() {
            return Ok(self);
        }
        for (column, predicate) in &filters {
            self.filters.add(column.as_ref(), predicate);
        }
        self.phase = QueryPhase::Configuring;
        Ok(self)
    }

    /// Replace the SELECT list; duplicates are dropped keeping first occurrence
    pub fn select_columns<I, S>(&mut self, columns: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_configurable()?;
        let mut ordered: Vec<String> = Vec::new();
        for column in columns {
            let column = column.into();
            if !ordered.contains(&column) {
                ordered.push(column);
            }
        }
        self.selected_columns = Some(ordered);
        self.phase = QueryPhase::Configuring;
        Ok(self)
    }

    /// Cap the number of returned rows
    ///
    /// SQLite limits are signed 64-bit; anything above `i64::MAX` fails with
    /// `Validation`.
    pub fn limit(&mut self, limit: u64) -> Result<&mut Self> {
        self.ensure_configurable()?;
        if i64::try_from(limit).is_err() {
            return Err(CohortStoreError::validation(format!(
                "Limit {} exceeds the maximum of {}",
                limit,
                i64::MAX
            )));
        }
        self.limit = Some(limit);
        self.phase = QueryPhase::Configuring;
        Ok(self)
    }

    /// Assemble the SQL text and a fresh copy of its parameters
    ///
    /// # Example
    /// ```
    /// use cohort_store::CohortQuery;
    ///
    /// let mut query = CohortQuery::new("raw", "Study");
    /// query.select_cohort("UK Biobank").unwrap();
    /// let (sql, params) = query.build();
    /// assert_eq!(sql, "SELECT * FROM \"raw\" WHERE \"Study\" = ?");
    /// assert_eq!(params.len(), 1);
    /// ```
    pub fn build(&mut self) -> (String, Vec<Value>) {
        let select = match &self.selected_columns {
            Some(columns) => quote_identifier_list(columns),
            None => "*".to_string(),
        };

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            select,
            quote_identifier(&self.table),
            self.filters.where_sql()
        );
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        self.phase = QueryPhase::Built;
        debug!(sql = %sql, params = self.filters.params().len(), "built cohort query");

        (sql, self.filters.params().to_vec())
    }

    /// The SQL text alone
    pub fn query_sql(&mut self) -> String {
        self.build().0
    }

    fn ensure_configurable(&self) -> Result<()> {
        if self.phase == QueryPhase::Built {
            return Err(CohortStoreError::validation(
                "Query already built; call reset() before changing it",
            ));
        }
        Ok(())
    }
}
