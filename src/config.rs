//! Configuration for CohortStore and Ingestor
//!
//! Provides a builder pattern for configuring the backing store connection.

use std::str::FromStr;

use sqlx::sqlite::SqliteConnectOptions;

use crate::error::{CohortStoreError, Result};

/// Default name of the primary measurement table
pub const DEFAULT_TABLE: &str = "raw";

/// Default name of the derived studies view
pub const DEFAULT_STUDIES_VIEW: &str = "studies";

/// Identifier columns used to match rows during an upsert
pub const DEFAULT_UPSERT_KEYS: &[&str] = &["Image/Patient ID", "Study Name"];

/// Configuration for the cohort store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database path or `sqlite:` URL
    pub database_url: String,
    /// Name of the primary table (default: "raw")
    pub table: String,
    /// Name of the derived view listing studies (default: "studies")
    pub studies_view: String,
    /// Whether to create the database file when it does not exist
    pub create_if_missing: bool,
    /// Key columns used by upsert ingestion
    pub upsert_keys: Vec<String>,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }

    /// Connection options for the configured database
    ///
    /// Plain file paths are accepted as well as `sqlite:` URLs.
    pub fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let options = if self.database_url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(&self.database_url).map_err(|e| {
                CohortStoreError::io(format!(
                    "Invalid database URL '{}': {}",
                    self.database_url, e
                ))
            })?
        } else {
            SqliteConnectOptions::new().filename(&self.database_url)
        };

        Ok(options.create_if_missing(self.create_if_missing))
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    table: String,
    studies_view: String,
    create_if_missing: bool,
    upsert_keys: Vec<String>,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database path or URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            table: DEFAULT_TABLE.to_string(),
            studies_view: DEFAULT_STUDIES_VIEW.to_string(),
            create_if_missing: false,
            upsert_keys: DEFAULT_UPSERT_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Set the primary table name (default: "raw")
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = name.into();
        self
    }

    /// Set the studies view name (default: "studies")
    pub fn studies_view(mut self, name: impl Into<String>) -> Self {
        self.studies_view = name.into();
        self
    }

    /// Create the database file if it does not exist (default: false)
    pub fn create_if_missing(mut self, enabled: bool) -> Self {
        self.create_if_missing = enabled;
        self
    }

    /// Replace the upsert key columns
    pub fn upsert_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upsert_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url,
            table: self.table,
            studies_view: self.studies_view,
            create_if_missing: self.create_if_missing,
            upsert_keys: self.upsert_keys,
        }
    }
}
