//! DDL and write-statement generation for ingestion
//!
//! Generates the SQLite statements used to (re)create the primary table, load
//! rows into it, and maintain the derived studies view.

use crate::sql::sanitize::{quote_identifier, quote_identifier_list};
use crate::types::ColumnType;

/// A column of an ingested table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Statement generator bound to one table
pub struct DdlGenerator<'a> {
    table: &'a str,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(table: &'a str) -> Self {
        Self { table }
    }

    /// `CREATE TABLE` with one typed column per `ColumnSpec`
    pub fn generate_create_table(&self, columns: &[ColumnSpec], if_not_exists: bool) -> String {
        let column_defs = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.to_sql_type()))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_identifier(self.table),
            column_defs
        )
    }

    pub fn generate_drop_table(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_identifier(self.table))
    }

    /// Positional `INSERT` naming every column explicitly
    pub fn generate_insert(&self, columns: &[String]) -> String {
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(self.table),
            quote_identifier_list(columns),
            placeholders
        )
    }

    /// `DELETE` of every row whose key columns equal the bound values
    pub fn generate_delete_by_key(&self, key_columns: &[String]) -> String {
        let conditions = key_columns
            .iter()
            .map(|k| format!("{} = ?", quote_identifier(k)))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "DELETE FROM {} WHERE {}",
            quote_identifier(self.table),
            conditions
        )
    }

    pub fn generate_drop_view(view: &str) -> String {
        format!("DROP VIEW IF EXISTS {}", quote_identifier(view))
    }

    /// Studies view: distinct non-null values of every study column, unioned
    ///
    /// Returns `None` when there is no study column to draw from.
    pub fn generate_studies_view(&self, view: &str, study_columns: &[String]) -> Option<String> {
        if study_columns.is_empty() {
            return None;
        }

        let table = quote_identifier(self.table);
        let parts = study_columns
            .iter()
            .map(|col| {
                let col = quote_identifier(col);
                format!(
                    "SELECT DISTINCT {} AS study_name FROM {} WHERE {} IS NOT NULL",
                    col, table, col
                )
            })
            .collect::<Vec<_>>();

        Some(format!(
            "CREATE VIEW {} AS {}",
            quote_identifier(view),
            parts.join(" UNION ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("Study", ColumnType::Text),
            ColumnSpec::new("Age Scan", ColumnType::Integer),
            ColumnSpec::new("Liver Volume", ColumnType::Real),
        ]
    }

    #[test]
    fn test_create_table() {
        let ddl = DdlGenerator::new("raw");
        assert_eq!(
            ddl.generate_create_table(&specs(), false),
            "CREATE TABLE \"raw\" (\"Study\" TEXT, \"Age Scan\" INTEGER, \"Liver Volume\" REAL)"
        );
    }

    #[test]
    fn test_create_table_if_not_exists() {
        let ddl = DdlGenerator::new("raw");
        assert!(ddl
            .generate_create_table(&specs(), true)
            .starts_with("CREATE TABLE IF NOT EXISTS \"raw\" ("));
    }

    #[test]
    fn test_drop_table() {
        assert_eq!(
            DdlGenerator::new("raw").generate_drop_table(),
            "DROP TABLE IF EXISTS \"raw\""
        );
    }

    #[test]
    fn test_insert() {
        let ddl = DdlGenerator::new("raw");
        let columns = vec!["Study".to_string(), "Image/Patient ID".to_string()];
        assert_eq!(
            ddl.generate_insert(&columns),
            "INSERT INTO \"raw\" (\"Study\", \"Image/Patient ID\") VALUES (?, ?)"
        );
    }

    #[test]
    fn test_delete_by_key() {
        let ddl = DdlGenerator::new("raw");
        let keys = vec!["Image/Patient ID".to_string(), "Study Name".to_string()];
        assert_eq!(
            ddl.generate_delete_by_key(&keys),
            "DELETE FROM \"raw\" WHERE \"Image/Patient ID\" = ? AND \"Study Name\" = ?"
        );
    }

    #[test]
    fn test_studies_view_single_column() {
        let ddl = DdlGenerator::new("raw");
        assert_eq!(
            ddl.generate_studies_view("studies", &["Study".to_string()]).unwrap(),
            "CREATE VIEW \"studies\" AS SELECT DISTINCT \"Study\" AS study_name FROM \"raw\" WHERE \"Study\" IS NOT NULL"
        );
    }

    #[test]
    fn test_studies_view_unions_every_column() {
        let ddl = DdlGenerator::new("raw");
        let sql = ddl
            .generate_studies_view("studies", &["Study".to_string(), "Study Name".to_string()])
            .unwrap();
        assert_eq!(sql.matches(" UNION ").count(), 1);
        assert!(sql.contains("SELECT DISTINCT \"Study Name\" AS study_name"));
    }

    #[test]
    fn test_studies_view_without_columns() {
        assert!(
            DdlGenerator::new("raw")
                .generate_studies_view("studies", &[])
                .is_none()
        );
    }

    #[test]
    fn test_drop_view() {
        assert_eq!(
            DdlGenerator::generate_drop_view("studies"),
            "DROP VIEW IF EXISTS \"studies\""
        );
    }
}
