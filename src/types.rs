//! Core type definitions for the cohort store
//!
//! Includes the dynamically typed [`Value`], the materialized [`Table`] and the
//! column affinities used when ingesting CSV files.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Values
// ============================================================================

/// A single SQL value, typed the way SQLite stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Parse a raw text cell, preferring integers, then reals, then text
    ///
    /// Empty input becomes `Null`. Used by the CLI and CSV ingestion so that
    /// `"70"` binds as a number and compares numerically.
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Real(f);
        }
        Value::Text(raw.to_string())
    }

    /// Convert to a JSON value (blobs become arrays of bytes)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Blob(b) => serde_json::Value::from(b.clone()),
        }
    }
}

/// Text rendering used for CSV output: `NULL` is empty, blobs are hex
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Tables
// ============================================================================

/// A materialized query result: ordered column names and row-major values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order
    ///
    /// `None` when the column is unknown or any row is too short to hold it.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        self.rows.iter().map(|row| row.get(idx)).collect()
    }

    /// Position of the first row whose width differs from the header
    pub fn ragged_row(&self) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.len() != self.columns.len())
    }

    /// Records-oriented JSON: `[{"col": value, ...}, ...]`
    pub fn to_json(&self) -> serde_json::Value {
        let records = self
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| (col.clone(), value.to_json()))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(records)
    }
}

// ============================================================================
// Column affinity (CSV ingestion)
// ============================================================================

/// Declared type of an ingested column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// SQLite type name used in CREATE TABLE
    pub fn to_sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Narrowest type that can hold every non-empty cell
    ///
    /// A column with no non-empty cells is `Text`.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut seen_any = false;
        let mut all_int = true;
        let mut all_real = true;

        for cell in cells {
            if cell.is_empty() {
                continue;
            }
            seen_any = true;
            if all_int && cell.parse::<i64>().is_err() {
                all_int = false;
            }
            if all_real && cell.parse::<f64>().is_err() {
                all_real = false;
            }
            if !all_real {
                break;
            }
        }

        match (seen_any, all_int, all_real) {
            (false, _, _) => ColumnType::Text,
            (true, true, _) => ColumnType::Integer,
            (true, false, true) => ColumnType::Real,
            _ => ColumnType::Text,
        }
    }

    /// Convert one raw cell to a value of this column type
    pub fn parse_cell(&self, raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Integer => raw
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Real => raw
                .parse::<f64>()
                .map(Value::Real)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Text => Value::Text(raw.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Value Tests
    // =========================================================================

    #[test]
    fn test_value_from_scalars() {
        assert_eq!(Value::from(70), Value::Integer(70));
        assert_eq!(Value::from(1.5), Value::Real(1.5));
        assert_eq!(Value::from("f"), Value::Text("f".to_string()));
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("A")), Value::Text("A".to_string()));
    }

    #[test]
    fn test_value_infer() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("70"), Value::Integer(70));
        assert_eq!(Value::infer("-3"), Value::Integer(-3));
        assert_eq!(Value::infer("1.25"), Value::Real(1.25));
        assert_eq!(Value::infer("f"), Value::Text("f".to_string()));
        assert_eq!(Value::infer("P-001"), Value::Text("P-001".to_string()));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::Text("UK Biobank".into()).to_string(), "UK Biobank");
        assert_eq!(Value::Blob(vec![0x0a, 0xff]).to_string(), "0aff");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Real(3.5).as_i64(), None);
        assert_eq!(Value::Text("x".into()).as_str(), Some("x"));
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_value_serializes_untagged() {
        let json = serde_json::to_string(&vec![
            Value::Null,
            Value::Integer(1),
            Value::Text("a".into()),
        ])
        .unwrap();
        assert_eq!(json, "[null,1,\"a\"]");
    }

    // =========================================================================
    // Table Tests
    // =========================================================================

    fn sample_table() -> Table {
        Table::new(
            vec!["Study".into(), "Liver Volume".into()],
            vec![
                vec![Value::from("A"), Value::Real(1510.5)],
                vec![Value::from("B"), Value::Null],
            ],
        )
    }

    #[test]
    fn test_table_shape() {
        let table = sample_table();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.num_columns(), 2);
        assert!(!table.is_empty());
        assert_eq!(table.column_index("Liver Volume"), Some(1));
        assert_eq!(table.column_index("Kidney Volume"), None);
    }

    #[test]
    fn test_table_column_values() {
        let table = sample_table();
        let studies = table.column("Study").unwrap();
        assert_eq!(studies, vec![&Value::from("A"), &Value::from("B")]);
    }

    #[test]
    fn test_table_ragged_rows() {
        let table = Table::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Integer(1), Value::Integer(2)],
                vec![Value::Integer(3)],
            ],
        );

        assert_eq!(table.ragged_row(), Some(1));
        assert_eq!(table.column("a").unwrap().len(), 2);
        assert!(table.column("b").is_none());
        assert_eq!(sample_table().ragged_row(), None);
    }

    #[test]
    fn test_table_to_json_records() {
        let json = sample_table().to_json();
        assert_eq!(
            json,
            serde_json::json!([
                {"Study": "A", "Liver Volume": 1510.5},
                {"Study": "B", "Liver Volume": null}
            ])
        );
    }

    // =========================================================================
    // ColumnType Tests
    // =========================================================================

    #[test]
    fn test_column_type_infer() {
        assert_eq!(ColumnType::infer(["1", "2", ""]), ColumnType::Integer);
        assert_eq!(ColumnType::infer(["1", "2.5"]), ColumnType::Real);
        assert_eq!(ColumnType::infer(["1", "f"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["", ""]), ColumnType::Text);
    }

    #[test]
    fn test_column_type_parse_cell() {
        assert_eq!(ColumnType::Integer.parse_cell("7"), Value::Integer(7));
        assert_eq!(ColumnType::Real.parse_cell("7"), Value::Real(7.0));
        assert_eq!(ColumnType::Text.parse_cell("7"), Value::Text("7".into()));
        assert_eq!(ColumnType::Real.parse_cell(""), Value::Null);
    }

    #[test]
    fn test_column_type_sql_names() {
        assert_eq!(ColumnType::Integer.to_sql_type(), "INTEGER");
        assert_eq!(ColumnType::Real.to_sql_type(), "REAL");
        assert_eq!(ColumnType::Text.to_sql_type(), "TEXT");
    }
}
