//! Metric column selection by organ and measurement-kind tokens
//!
//! Matching is case-insensitive substring search: AND between the organ and
//! kind groups, OR within each group. An empty group matches every column.

use crate::catalog::ID_COLUMN_CANDIDATES;

/// Organ and kind tokens to select measurement columns with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSelector {
    organs: Vec<String>,
    kinds: Vec<String>,
}

impl MetricSelector {
    pub fn new<O, K>(organs: O, kinds: K) -> Self
    where
        O: IntoIterator,
        O::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        Self {
            organs: lowercase_all(organs),
            kinds: lowercase_all(kinds),
        }
    }

    /// Whether a column name satisfies both token groups
    pub fn column_matches(&self, column: &str) -> bool {
        let name = column.to_lowercase();
        contains_any(&name, &self.organs) && contains_any(&name, &self.kinds)
    }

    /// Resolve the SELECT list for `columns`
    ///
    /// The result starts with `study_column` (when it is among `columns`) and the
    /// first present identifier column, followed by every matching column in
    /// table order. Duplicates are dropped, keeping the first occurrence.
    ///
    /// # Example
    /// ```
    /// use cohort_store::sql::MetricSelector;
    ///
    /// let columns: Vec<String> = ["Study", "ID", "Liver Volume", "Kidney Volume"]
    ///     .iter()
    ///     .map(|c| c.to_string())
    ///     .collect();
    /// let selector = MetricSelector::new(["liver"], ["volume"]);
    /// assert_eq!(
    ///     selector.select(&columns, "Study"),
    ///     vec!["Study", "ID", "Liver Volume"]
    /// );
    /// ```
    pub fn select(&self, columns: &[String], study_column: &str) -> Vec<String> {
        let mut base: Vec<&str> = Vec::new();
        if columns.iter().any(|c| c == study_column) {
            base.push(study_column);
        }
        if let Some(id) = ID_COLUMN_CANDIDATES
            .iter()
            .copied()
            .find(|candidate| columns.iter().any(|c| c == candidate) && !base.contains(candidate))
        {
            base.push(id);
        }

        let keep = columns
            .iter()
            .map(String::as_str)
            .filter(|c| self.column_matches(c));

        let mut ordered: Vec<String> = Vec::new();
        for column in base.into_iter().chain(keep) {
            if !ordered.iter().any(|c| c == column) {
                ordered.push(column.to_string());
            }
        }
        ordered
    }
}

fn lowercase_all<I>(tokens: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|t| t.as_ref().to_lowercase())
        .collect()
}

fn contains_any(name: &str, tokens: &[String]) -> bool {
    tokens.is_empty() || tokens.iter().any(|t| name.contains(t.as_str()))
}
