//! Column-name canonicalization.
//!
//! Uploaded tables come with headers like `"DAP Applied (kg)"` or
//! `"30D Rain/mm"`; everything downstream keys on the canonical form.

/// Canonicalize a single column name.
///
/// Trims surrounding whitespace, lowercases, turns spaces into underscores,
/// drops `(` and `)`, and turns `/` into underscores. Any other character is
/// kept as is, so this never fails.
pub fn normalize_column(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace(['(', ')'], "")
        .replace('/', "_")
}

/// Canonicalize every name of a header row, keeping order.
pub fn normalize_columns<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|n| normalize_column(n.as_ref())).collect()
}
