//! Table introspection and well-known column detection

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{CohortStoreError, Result};

/// Column names that identify a row's study, in priority order
pub const STUDY_COLUMN_CANDIDATES: &[&str] =
    &["Study", "Study Name", "study", "StudyName", "Study_Name"];

/// Column names that identify a subject or image, in priority order
pub const ID_COLUMN_CANDIDATES: &[&str] = &["Image/Patient ID", "Patient ID", "Image ID", "ID"];

/// Fetch the ordered column names of a table or view
///
/// Always queries the backing store; nothing is cached. A missing table
/// yields an empty list. Driver failures surface as `CohortStoreError::Io`.
pub async fn introspect_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(conn)
            .await
            .map_err(|e| {
                CohortStoreError::io(format!("Failed to introspect table '{}': {}", table, e))
            })?;

    debug!(table, columns = columns.len(), "introspected table");
    Ok(columns)
}

/// Pick the study column: the first candidate, in priority order, present in `columns`
///
/// # Example
/// ```
/// use cohort_store::catalog::detect_study_column;
///
/// let columns = vec!["Study Name".to_string(), "Study".to_string()];
/// assert_eq!(detect_study_column(&columns).unwrap(), "Study");
/// ```
pub fn detect_study_column(columns: &[String]) -> Result<String> {
    first_present(STUDY_COLUMN_CANDIDATES, columns)
        .map(str::to_string)
        .ok_or_else(|| {
            CohortStoreError::schema(format!(
                "No study column found. Expected one of {:?}, available columns: {:?}",
                STUDY_COLUMN_CANDIDATES, columns
            ))
        })
}

/// Every study candidate present in `columns`, in priority order
pub fn detect_study_columns(columns: &[String]) -> Vec<String> {
    STUDY_COLUMN_CANDIDATES
        .iter()
        .filter(|candidate| columns.iter().any(|c| c == *candidate))
        .map(|c| c.to_string())
        .collect()
}

/// The first present identifier column, if any
pub fn detect_id_column(columns: &[String]) -> Option<&'static str> {
    first_present(ID_COLUMN_CANDIDATES, columns)
}

fn first_present(candidates: &[&'static str], columns: &[String]) -> Option<&'static str> {
    candidates
        .iter()
        .copied()
        .find(|candidate| columns.iter().any(|c| c == candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    // ==================== Study Column ====================

    #[test]
    fn test_detect_study_column_simple() {
        let columns = cols(&["ID", "Study", "Liver Volume"]);
        assert_eq!(detect_study_column(&columns).unwrap(), "Study");
    }

    #[test]
    fn test_detect_study_column_priority_beats_position() {
        // "Study Name" appears first in the table but "Study" has higher priority
        let columns = cols(&["Study Name", "ID", "Study"]);
        assert_eq!(detect_study_column(&columns).unwrap(), "Study");
    }

    #[test]
    fn test_detect_study_column_lower_priority_variants() {
        assert_eq!(detect_study_column(&cols(&["study"])).unwrap(), "study");
        assert_eq!(
            detect_study_column(&cols(&["StudyName"])).unwrap(),
            "StudyName"
        );
        assert_eq!(
            detect_study_column(&cols(&["Study_Name"])).unwrap(),
            "Study_Name"
        );
    }

    #[test]
    fn test_detect_study_column_is_case_sensitive() {
        let err = detect_study_column(&cols(&["STUDY", "ID"])).unwrap_err();
        assert!(matches!(err, CohortStoreError::Schema(_)));
    }

    #[test]
    fn test_detect_study_column_missing() {
        let err = detect_study_column(&cols(&["ID", "Liver Volume"])).unwrap_err();
        assert!(matches!(err, CohortStoreError::Schema(_)));
        assert!(err.to_string().contains("No study column found"));
    }

    #[test]
    fn test_detect_study_columns_all_present() {
        let columns = cols(&["Study_Name", "ID", "Study", "study"]);
        assert_eq!(
            detect_study_columns(&columns),
            vec!["Study", "study", "Study_Name"]
        );
        assert!(detect_study_columns(&cols(&["ID"])).is_empty());
    }

    // ==================== ID Column ====================

    #[test]
    fn test_detect_id_column_priority() {
        let columns = cols(&["ID", "Patient ID", "Image/Patient ID"]);
        assert_eq!(detect_id_column(&columns), Some("Image/Patient ID"));
        assert_eq!(
            detect_id_column(&cols(&["Image ID", "ID"])),
            Some("Image ID")
        );
        assert_eq!(detect_id_column(&cols(&["Study"])), None);
    }
}
