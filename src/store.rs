//! CohortStore - Main entry point for querying cohort measurements
//!
//! This module provides the `CohortStore` struct that owns a connection to the
//! backing SQLite database, resolves the study column once, and runs the
//! queries assembled by [`CohortQuery`].

use std::path::Path;

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{
    Column, ConnectOptions, Connection, Executor, Row, Sqlite, SqliteConnection, Statement,
    TypeInfo, ValueRef,
};
use tracing::{debug, warn};

use crate::catalog::{detect_study_column, introspect_columns};
use crate::config::StoreConfig;
use crate::error::{CohortStoreError, Result};
use crate::export::{self, RecordBatch};
use crate::query::{CohortQuery, QueryPhase};
use crate::sql::filter::Predicate;
use crate::sql::sanitize::quote_identifier;
use crate::sql::select::MetricSelector;
use crate::types::{Table, Value};

/// Open a connection for the configured database
pub(crate) async fn connect(config: &StoreConfig) -> Result<SqliteConnection> {
    config.connect_options()?.connect().await.map_err(|e| {
        CohortStoreError::io(format!(
            "Database connection to '{}' failed: {}",
            config.database_url, e
        ))
    })
}

/// Fluent cohort query layer over one table
///
/// Owns its connection; the connection is released when the store is closed
/// or dropped.
///
/// ```rust,no_run
/// use cohort_store::{CohortStore, Predicate, StoreConfig};
///
/// # async fn run() -> cohort_store::Result<()> {
/// let mut store = CohortStore::open(StoreConfig::builder("cohorts.db").build()).await?;
/// let table = store
///     .reset()
///     .select_cohort("UK Biobank")?
///     .filter("Sex", Predicate::eq("f"))?
///     .filter_op("Age Scan", ">", 70)?
///     .metrics(&["Liver"], &["Volume", "SUVMean"])
///     .await?
///     .execute()
///     .await?;
/// println!("{} rows", table.num_rows());
/// store.close().await;
/// # Ok(())
/// # }
/// ```
pub struct CohortStore {
    conn: SqliteConnection,
    config: StoreConfig,
    query: CohortQuery,
}

impl CohortStore {
    /// Connect and resolve the study column of the configured table
    ///
    /// Fails with `Schema` when the table has no recognizable study column.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let conn = connect(&config).await?;
        Self::from_connection(conn, config).await
    }

    /// Wrap an existing connection
    ///
    /// Use this when the connection was opened elsewhere, e.g. an in-memory
    /// database populated by an [`crate::Ingestor`].
    pub async fn from_connection(mut conn: SqliteConnection, config: StoreConfig) -> Result<Self> {
        let columns = introspect_columns(&mut conn, &config.table).await?;
        let study_column = detect_study_column(&columns).map_err(|e| match e {
            CohortStoreError::Schema(msg) => {
                CohortStoreError::schema(format!("Table '{}': {}", config.table, msg))
            }
            other => other,
        })?;
        debug!(table = %config.table, study_column = %study_column, "opened cohort store");

        let query = CohortQuery::new(config.table.clone(), study_column);
        Ok(Self { conn, config, query })
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The detected study column
    pub fn study_column(&self) -> &str {
        self.query.study_column()
    }

    /// The builder state of the current query
    pub fn query(&self) -> &CohortQuery {
        &self.query
    }

    pub fn phase(&self) -> QueryPhase {
        self.query.phase()
    }

    /// Direct access to the connection for statements outside the builder
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Release the connection; failures are logged, not returned
    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            warn!(error = %e, "failed to close cohort store connection");
        }
    }

    /// Hand the connection back, e.g. to run ingestion on it
    pub fn into_connection(self) -> SqliteConnection {
        self.conn
    }

    // =========================================================================
    // Builder Operations
    // =========================================================================

    /// Clear previous selections, filters and limit
    pub fn reset(&mut self) -> &mut Self {
        self.query.reset();
        self
    }

    /// Restrict rows to one study
    pub fn select_cohort(&mut self, name: impl Into<Value>) -> Result<&mut Self> {
        self.query.select_cohort(name)?;
        Ok(self)
    }

    /// Add a column predicate
    pub fn filter(&mut self, column: &str, predicate: Predicate) -> Result<&mut Self> {
        self.query.filter(column, predicate)?;
        Ok(self)
    }

    /// Add a column comparison with the operator given as text
    pub fn filter_op(
        &mut self,
        column: &str,
        op: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.query.filter_op(column, op, value)?;
        Ok(self)
    }

    /// Add several column predicates, in order
    pub fn filters<I, S>(&mut self, filters: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (S, Predicate)>,
        S: AsRef<str>,
    {
        self.query.filters(filters)?;
        Ok(self)
    }

    /// Cap the number of returned rows
    pub fn limit(&mut self, limit: u64) -> Result<&mut Self> {
        self.query.limit(limit)?;
        Ok(self)
    }

    /// Select measurement columns by organ and kind tokens
    ///
    /// Re-reads the table's columns on every call. Replaces any earlier
    /// selection. The study column and one identifier column always lead.
    pub async fn metrics<O, K>(&mut self, organs: O, kinds: K) -> Result<&mut Self>
    where
        O: IntoIterator,
        O::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        if self.query.phase() == QueryPhase::Built {
            return Err(CohortStoreError::validation(
                "Query already built; call reset() before changing it",
            ));
        }

        let selector = MetricSelector::new(organs, kinds);
        let columns = introspect_columns(&mut self.conn, &self.config.table).await?;
        let selected = selector.select(&columns, self.query.study_column());
        debug!(selected = selected.len(), available = columns.len(), "selected metric columns");

        self.query.select_columns(selected)?;
        Ok(self)
    }

    /// Assemble the SQL text and parameters
    pub fn build(&mut self) -> (String, Vec<Value>) {
        self.query.build()
    }

    /// The SQL text alone, for inspection
    pub fn query_sql(&mut self) -> String {
        self.query.query_sql()
    }

    // =========================================================================
    // Materialization
    // =========================================================================

    /// Run the current query and return its rows
    ///
    /// A column missing from the table fails with `Query` before anything
    /// runs; SQLite would otherwise read an unresolved quoted name as a string.
    pub async fn execute(&mut self) -> Result<Table> {
        let (sql, params) = self.query.build();
        self.check_columns().await?;
        fetch_table(&mut self.conn, &sql, &params).await
    }

    async fn check_columns(&mut self) -> Result<()> {
        let available = introspect_columns(&mut self.conn, &self.config.table).await?;
        let missing = self
            .query
            .referenced_columns()
            .into_iter()
            .find(|column| !available.iter().any(|a| a.eq_ignore_ascii_case(column)));

        match missing {
            Some(column) => Err(CohortStoreError::Query(sqlx::Error::ColumnNotFound(
                column.to_string(),
            ))),
            None => Ok(()),
        }
    }

    /// Run the current query and convert the result to an Arrow record batch
    ///
    /// Fails with `Dependency` when built without the `arrow` feature.
    pub async fn to_record_batch(&mut self) -> Result<RecordBatch> {
        let table = self.execute().await?;
        export::to_record_batch(&table)
    }

    /// Run the current query and write it as CSV
    pub async fn save_csv(&mut self, path: impl AsRef<Path>) -> Result<Table> {
        let table = self.execute().await?;
        export::write_csv(&table, path)?;
        Ok(table)
    }

    /// Run the current query and write it as Parquet
    pub async fn save_parquet(&mut self, path: impl AsRef<Path>) -> Result<Table> {
        let table = self.execute().await?;
        export::write_parquet(&table, path)?;
        Ok(table)
    }

    // =========================================================================
    // Studies
    // =========================================================================

    /// The studies view, ordered by name
    pub async fn list_studies(&mut self) -> Result<Table> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY study_name",
            quote_identifier(&self.config.studies_view)
        );
        fetch_table(&mut self.conn, &sql, &[]).await
    }

    /// Study names from the studies view, ordered
    pub async fn study_names(&mut self) -> Result<Vec<String>> {
        let table = self.list_studies().await?;
        let idx = table.column_index("study_name").ok_or_else(|| {
            CohortStoreError::schema(format!(
                "View '{}' has no study_name column",
                self.config.studies_view
            ))
        })?;

        Ok(table
            .rows
            .into_iter()
            .filter_map(|mut row| match std::mem::replace(&mut row[idx], Value::Null) {
                Value::Null => None,
                Value::Text(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect())
    }
}

// =============================================================================
// Internal Helpers
// =============================================================================

/// Run `sql` with positional parameters and collect every row
pub(crate) async fn fetch_table(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[Value],
) -> Result<Table> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_value(query, param);
    }

    let rows = query.fetch_all(&mut *conn).await?;

    let columns: Vec<String> = match rows.first() {
        Some(row) => row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
        None => (&mut *conn)
            .prepare(sql)
            .await?
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    };

    let rows = rows
        .iter()
        .map(|row| row_to_values(row, columns.len()))
        .collect::<Result<Vec<_>>>()?;

    debug!(rows = rows.len(), columns = columns.len(), "fetched table");
    Ok(Table::new(columns, rows))
}

pub(crate) fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(i) => query.bind(*i),
        Value::Real(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Blob(b) => query.bind(b.clone()),
    }
}

fn row_to_values(row: &SqliteRow, width: usize) -> Result<Vec<Value>> {
    (0..width).map(|idx| extract_value(row, idx)).collect()
}

fn extract_value(row: &SqliteRow, idx: usize) -> Result<Value> {
    let type_name = {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };

    Ok(match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get_unchecked::<i64, _>(idx)?),
        "REAL" | "NUMERIC" => Value::Real(row.try_get_unchecked::<f64, _>(idx)?),
        "BLOB" => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        _ => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
    })
}
