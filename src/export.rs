//! Export of materialized tables
//!
//! CSV is always available. Arrow record batches and Parquet files need the
//! `arrow` feature; without it those calls fail with
//! [`CohortStoreError::Dependency`] instead of being compiled out, so callers
//! can probe for the capability at runtime.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::{CohortStoreError, Result};
use crate::types::Table;

#[cfg(feature = "arrow")]
pub use arrow::record_batch::RecordBatch;

/// Stand-in for Arrow's `RecordBatch` when the `arrow` feature is off; never constructed
#[cfg(not(feature = "arrow"))]
#[derive(Debug)]
pub enum RecordBatch {}

/// Whether Arrow/Parquet output is compiled in
pub const fn columnar_output_available() -> bool {
    cfg!(feature = "arrow")
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Write `table` as CSV: header row, then one line per row, no index column
pub fn write_csv(table: &Table, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        CohortStoreError::io(format!("Cannot create '{}': {}", path.display(), e))
    })?;
    write_csv_to(table, file)?;
    info!(path = %path.display(), rows = table.num_rows(), "wrote CSV");
    Ok(())
}

/// Write `table` as CSV to any writer
pub fn write_csv_to<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Arrow / Parquet
// ---------------------------------------------------------------------------

#[cfg(feature = "arrow")]
mod columnar {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, BinaryArray, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::{RecordBatch, RecordBatchOptions};

    use crate::error::{CohortStoreError, Result};
    use crate::types::{Table, Value};

    /// Arrow type able to hold every value of a column
    ///
    /// Integers widen to Float64 when reals are present; any text (or a mix
    /// with blobs) falls back to Utf8. All-null columns are Utf8.
    fn column_data_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
        let (mut ints, mut reals, mut texts, mut blobs) = (false, false, false, false);
        for value in values {
            match value {
                Value::Null => {}
                Value::Integer(_) => ints = true,
                Value::Real(_) => reals = true,
                Value::Text(_) => texts = true,
                Value::Blob(_) => blobs = true,
            }
        }

        match (ints, reals, texts, blobs) {
            (_, _, true, _) => DataType::Utf8,
            (false, false, false, true) => DataType::Binary,
            (_, _, _, true) => DataType::Utf8,
            (_, true, _, _) => DataType::Float64,
            (true, false, _, _) => DataType::Int64,
            _ => DataType::Utf8,
        }
    }

    fn build_array(table: &Table, idx: usize, data_type: &DataType) -> ArrayRef {
        let values = table.rows.iter().map(|row| &row[idx]);
        match data_type {
            DataType::Int64 => Arc::new(values.map(Value::as_i64).collect::<Int64Array>()),
            DataType::Float64 => Arc::new(values.map(Value::as_f64).collect::<Float64Array>()),
            DataType::Binary => Arc::new(
                values
                    .map(|v| match v {
                        Value::Blob(b) => Some(b.as_slice()),
                        _ => None,
                    })
                    .collect::<BinaryArray>(),
            ),
            _ => Arc::new(
                values
                    .map(|v| match v {
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect::<StringArray>(),
            ),
        }
    }

    pub fn to_record_batch(table: &Table) -> Result<RecordBatch> {
        if let Some(row) = table.ragged_row() {
            return Err(CohortStoreError::validation(format!(
                "Row {} has {} values but the table has {} columns",
                row,
                table.rows[row].len(),
                table.num_columns()
            )));
        }

        let mut fields = Vec::with_capacity(table.num_columns());
        let mut arrays = Vec::with_capacity(table.num_columns());

        for (idx, name) in table.columns.iter().enumerate() {
            let data_type = column_data_type(table.rows.iter().map(|row| &row[idx]));
            arrays.push(build_array(table, idx, &data_type));
            fields.push(Field::new(name, data_type, true));
        }

        let schema = Arc::new(Schema::new(fields));
        let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
        Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
    }

}

/// Convert a table to an Arrow record batch, one nullable column per table column
#[cfg(feature = "arrow")]
pub fn to_record_batch(table: &Table) -> Result<RecordBatch> {
    columnar::to_record_batch(table)
}

/// Convert a table to an Arrow record batch, one nullable column per table column
#[cfg(not(feature = "arrow"))]
pub fn to_record_batch(_table: &Table) -> Result<RecordBatch> {
    Err(arrow_unavailable())
}

/// Write `table` as a Snappy-compressed Parquet file
#[cfg(feature = "arrow")]
pub fn write_parquet(table: &Table, path: impl AsRef<Path>) -> Result<()> {
    use parquet::arrow::ArrowWriter;
    use parquet::basic::Compression;
    use parquet::file::properties::WriterProperties;

    let path = path.as_ref();
    let batch = to_record_batch(table)?;
    let file = File::create(path).map_err(|e| {
        CohortStoreError::io(format!("Cannot create '{}': {}", path.display(), e))
    })?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    info!(path = %path.display(), rows = table.num_rows(), "wrote Parquet");
    Ok(())
}

/// Write `table` as a Snappy-compressed Parquet file
#[cfg(not(feature = "arrow"))]
pub fn write_parquet(_table: &Table, _path: impl AsRef<Path>) -> Result<()> {
    Err(arrow_unavailable())
}

#[cfg(not(feature = "arrow"))]
fn arrow_unavailable() -> CohortStoreError {
    CohortStoreError::dependency(
        "Arrow/Parquet output is not compiled in. Rebuild with `--features arrow` to use it.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn sample_table() -> Table {
        Table::new(
            vec!["Study".into(), "ID".into(), "Liver Volume".into()],
            vec![
                vec![Value::from("A"), Value::from(1), Value::Real(1510.5)],
                vec![Value::from("B, C"), Value::from(2), Value::Null],
            ],
        )
    }

    #[test]
    fn test_write_csv_to_preserves_order_without_index() {
        let mut out = Vec::new();
        write_csv_to(&sample_table(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "Study,ID,Liver Volume\nA,1,1510.5\n\"B, C\",2,\n"
        );
    }

    #[test]
    fn test_write_csv_header_only_for_empty_table() {
        let table = Table::new(vec!["Study".into()], Vec::new());
        let mut out = Vec::new();
        write_csv_to(&table, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Study\n");
    }

    #[cfg(feature = "arrow")]
    #[test]
    fn test_to_record_batch_types() {
        use arrow::datatypes::DataType;

        let batch = to_record_batch(&sample_table()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 3);

        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), "Study");
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(batch.column(2).null_count(), 1);
    }

    #[cfg(feature = "arrow")]
    #[test]
    fn test_write_parquet_rejects_ragged_rows() {
        let table = Table::new(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Integer(1)]],
        );
        let path = std::env::temp_dir().join("cohort_store_ragged_rows.parquet");

        assert!(matches!(
            write_parquet(&table, &path),
            Err(CohortStoreError::Validation(_))
        ));
        assert!(!path.exists());
    }

    #[cfg(not(feature = "arrow"))]
    #[test]
    fn test_columnar_output_reports_missing_dependency() {
        assert!(!columnar_output_available());
        assert!(matches!(
            to_record_batch(&sample_table()),
            Err(CohortStoreError::Dependency(_))
        ));
        assert!(matches!(
            write_parquet(&sample_table(), "unused.parquet"),
            Err(CohortStoreError::Dependency(_))
        ));
    }
}
