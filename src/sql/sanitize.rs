//! SQL identifier quoting
//!
//! Column names in imaging exports contain spaces, slashes and punctuation
//! ("Image/Patient ID", "Liver SUVMean"), so every identifier that reaches
//! generated SQL goes through [`quote_identifier`].

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Arguments
/// * `identifier` - The identifier to quote
///
/// # Returns
/// The identifier wrapped in double quotes with escaped internal quotes
///
/// # Example
/// ```
/// use cohort_store::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("Liver Volume"), "\"Liver Volume\"");
/// assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Quote each identifier and join them with `", "`
pub fn quote_identifier_list<S: AsRef<str>>(identifiers: &[S]) -> String {
    identifiers
        .iter()
        .map(|i| quote_identifier(i.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}
