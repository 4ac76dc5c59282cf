//! Error types for cohort store operations

use thiserror::Error;

/// Errors that can occur while building, running, importing or exporting cohort queries
#[derive(Debug, Error)]
pub enum CohortStoreError {
    /// The table lacks a column the operation depends on (e.g. no study column)
    #[error("Schema error: {0}")]
    Schema(String),

    /// A caller-supplied argument was rejected before touching any state
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backing store or a file could not be reached
    #[error("I/O error: {0}")]
    Io(String),

    /// The backing store rejected or failed to run a statement
    #[error("Query error: {0}")]
    Query(#[source] sqlx::Error),

    /// An optional output format was requested but is not compiled in
    #[error("Missing dependency: {0}")]
    Dependency(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "arrow")]
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[cfg(feature = "arrow")]
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CohortStoreError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::Dependency(msg.into())
    }
}

impl From<sqlx::Error> for CohortStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => Self::Io(e.to_string()),
            other => Self::Query(other),
        }
    }
}

impl From<std::io::Error> for CohortStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CohortStoreError>;
