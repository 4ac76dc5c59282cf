//! CSV ingestion into the backing store
//!
//! Loads a CSV file into the primary table by full replace, plain append, or
//! keyed upsert (delete matching keys, then insert), and refreshes the derived
//! studies view afterwards.

use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use tracing::{debug, info, warn};

use crate::catalog::{detect_study_columns, introspect_columns};
use crate::config::StoreConfig;
use crate::error::{CohortStoreError, Result};
use crate::sql::ddl::{ColumnSpec, DdlGenerator};
use crate::store::{bind_value, connect};
use crate::types::{ColumnType, Value};

/// How incoming rows combine with an existing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum IngestMode {
    /// Drop and recreate the table from the CSV
    Replace,
    /// Insert every row; no deduplication
    Append,
    /// Delete rows sharing a key with any incoming row, then insert all rows
    Upsert { key_columns: Vec<String> },
}

impl IngestMode {
    pub fn upsert<I, S>(key_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IngestMode::Upsert {
            key_columns: key_columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestMode::Replace => f.write_str("replace"),
            IngestMode::Append => f.write_str("append"),
            IngestMode::Upsert { .. } => f.write_str("upsert"),
        }
    }
}

/// Summary of one ingestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub table: String,
    pub mode: IngestMode,
    pub rows_read: usize,
    pub rows_deleted: u64,
    pub columns: Vec<String>,
}

/// Parsed CSV contents with inferred column types
#[derive(Debug, Clone)]
struct CsvBatch {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<Value>>,
}

impl CsvBatch {
    fn read<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut raw_rows: Vec<csv::StringRecord> = Vec::new();
        for record in reader.records() {
            raw_rows.push(record?);
        }

        let columns: Vec<ColumnSpec> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let column_type =
                    ColumnType::infer(raw_rows.iter().map(|r| r.get(idx).unwrap_or("")));
                ColumnSpec::new(name.clone(), column_type)
            })
            .collect();

        let rows = raw_rows
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        column.column_type.parse_cell(record.get(idx).unwrap_or(""))
                    })
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn key_indices(&self, key_columns: &[String]) -> Result<Vec<usize>> {
        if key_columns.is_empty() {
            return Err(CohortStoreError::validation(
                "Upsert requires at least one key column",
            ));
        }
        key_columns
            .iter()
            .map(|key| {
                self.columns
                    .iter()
                    .position(|c| &c.name == key)
                    .ok_or_else(|| {
                        CohortStoreError::validation(format!(
                            "Upsert key column '{}' is not in the CSV header",
                            key
                        ))
                    })
            })
            .collect()
    }
}

/// Loads CSV data into the configured table
///
/// Owns its connection, like [`crate::CohortStore`]; close it with
/// [`Ingestor::close`] or let it drop.
pub struct Ingestor {
    conn: SqliteConnection,
    config: StoreConfig,
}

impl Ingestor {
    /// Connect, creating the database file when the config allows it
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let conn = connect(&config).await?;
        Ok(Self { conn, config })
    }

    pub fn from_connection(conn: SqliteConnection, config: StoreConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Hand the connection over, e.g. to a [`crate::CohortStore`]
    pub fn into_connection(self) -> SqliteConnection {
        self.conn
    }

    /// Release the connection; failures are logged, not returned
    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            warn!(error = %e, "failed to close ingestor connection");
        }
    }

    /// Load a CSV file
    pub async fn ingest_csv(
        &mut self,
        path: impl AsRef<Path>,
        mode: IngestMode,
    ) -> Result<IngestReport> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            CohortStoreError::io(format!("Cannot open '{}': {}", path.display(), e))
        })?;
        debug!(path = %path.display(), %mode, "ingesting CSV");
        self.ingest_reader(file, mode).await
    }

    /// Load CSV data from any reader
    pub async fn ingest_reader<R: Read>(
        &mut self,
        reader: R,
        mode: IngestMode,
    ) -> Result<IngestReport> {
        let batch = CsvBatch::read(reader)?;
        let key_indices = match &mode {
            IngestMode::Upsert { key_columns } => Some(batch.key_indices(key_columns)?),
            _ => None,
        };

        let table = self.config.table.clone();
        let ddl = DdlGenerator::new(&table);
        let column_names = batch.column_names();
        let mut rows_deleted = 0;

        let mut tx = self.conn.begin().await?;

        match &mode {
            IngestMode::Replace => {
                sqlx::query(&DdlGenerator::generate_drop_view(&self.config.studies_view))
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(&ddl.generate_drop_table())
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(&ddl.generate_create_table(&batch.columns, false))
                    .execute(&mut *tx)
                    .await?;
            }
            IngestMode::Append | IngestMode::Upsert { .. } => {
                sqlx::query(&ddl.generate_create_table(&batch.columns, true))
                    .execute(&mut *tx)
                    .await?;
            }
        }

        if let (IngestMode::Upsert { key_columns }, Some(key_indices)) = (&mode, &key_indices) {
            let delete_sql = ddl.generate_delete_by_key(key_columns);
            for row in &batch.rows {
                let mut query = sqlx::query(&delete_sql);
                for idx in key_indices {
                    query = bind_value(query, &row[*idx]);
                }
                rows_deleted += query.execute(&mut *tx).await?.rows_affected();
            }
        }

        let insert_sql = ddl.generate_insert(&column_names);
        for row in &batch.rows {
            let mut query = sqlx::query(&insert_sql);
            for value in row {
                query = bind_value(query, value);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;

        info!(
            table = %table,
            %mode,
            rows = batch.rows.len(),
            deleted = rows_deleted,
            "ingested CSV"
        );

        self.refresh_studies_view().await?;

        Ok(IngestReport {
            table,
            mode,
            rows_read: batch.rows.len(),
            rows_deleted,
            columns: column_names,
        })
    }

    /// Recreate the studies view over every study column of the table
    ///
    /// Fails with `Schema` when the table has no study column.
    pub async fn refresh_studies_view(&mut self) -> Result<()> {
        let table = self.config.table.clone();
        let view = self.config.studies_view.clone();

        let columns = introspect_columns(&mut self.conn, &table).await?;
        let study_columns = detect_study_columns(&columns);
        let create_sql = DdlGenerator::new(&table)
            .generate_studies_view(&view, &study_columns)
            .ok_or_else(|| {
                CohortStoreError::schema(format!(
                    "Could not find a study column in table '{}'. Available columns: {:?}",
                    table, columns
                ))
            })?;

        let mut tx = self.conn.begin().await?;
        sqlx::query(&DdlGenerator::generate_drop_view(&view))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&create_sql).execute(&mut *tx).await?;
        tx.commit().await?;

        debug!(view = %view, sources = ?study_columns, "refreshed studies view");
        Ok(())
    }
}
