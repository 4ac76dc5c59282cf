//! # cohort-store
//!
//! A fluent query layer over a SQLite table of per-subject medical-imaging
//! measurements.
//!
//! Pick a study cohort, add column filters, narrow the result to measurement
//! columns whose names mention an organ and a metric kind, then materialize the
//! rows or inspect the generated SQL.
//!
//! ## Features
//!
//! - **Cohort Selection**: The study column is detected once from a priority list
//!   ("Study", "Study Name", "study", "StudyName", "Study_Name")
//! - **Parameterized Filters**: `=`, `!=`, `<`, `<=`, `>`, `>=` and `LIKE`, AND-combined,
//!   values always bound as `?` parameters
//! - **Metric Columns**: Case-insensitive token matching, organs AND (any kind)
//! - **SQL Injection Prevention**: Every identifier is quoted
//! - **Ingestion**: CSV replace, append, or keyed upsert, plus a derived `studies` view
//! - **Export**: CSV always; Arrow record batches and Parquet with the `arrow` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cohort_store::{CohortStore, IngestMode, Ingestor, Predicate, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::builder("cohorts.db")
//!         .create_if_missing(true)
//!         .build();
//!
//!     // Load the merged master file
//!     let mut ingestor = Ingestor::open(config.clone()).await?;
//!     ingestor.ingest_csv("data/Merged_master_file.csv", IngestMode::Replace).await?;
//!     ingestor.close().await;
//!
//!     // Query one cohort
//!     let mut store = CohortStore::open(config).await?;
//!     let Some(first) = store.study_names().await?.into_iter().next() else {
//!         return Ok(());
//!     };
//!
//!     let liver = store
//!         .reset()
//!         .select_cohort(first.as_str())?
//!         .filter("Sex", Predicate::eq("f"))?
//!         .filter_op("Age Scan", ">", 70)?
//!         .metrics(["Liver"], ["Volume", "SUVMean"])
//!         .await?
//!         .execute()
//!         .await?;
//!
//!     println!("{}", store.query_sql());
//!     cohort_store::export::write_csv(&liver, "filtered_liver_metrics.csv")?;
//!
//!     store.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use cohort_store::StoreConfig;
//!
//! let config = StoreConfig::builder("cohorts.db")
//!     .table("raw")              // Primary table (default)
//!     .studies_view("studies")   // Derived view of study names (default)
//!     .create_if_missing(false)  // Do not create the file on open (default)
//!     .build();
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod query;
pub mod sql;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::{StoreConfig, StoreConfigBuilder};
pub use error::{CohortStoreError, Result};
pub use ingest::{IngestMode, IngestReport, Ingestor};
pub use query::{CohortQuery, QueryPhase};
pub use sql::filter::{ComparisonOp, Predicate};
pub use store::CohortStore;
pub use types::{ColumnType, Table, Value};

// Re-export SQL utilities for advanced users
pub use catalog::{
    ID_COLUMN_CANDIDATES, STUDY_COLUMN_CANDIDATES, detect_study_column, introspect_columns,
};
pub use sql::sanitize::quote_identifier;
pub use sql::select::MetricSelector;
