//! Keyword and document-token canonicalization.
//!
//! Configured keywords and document text pass through the same
//! normalization so `breast_mri`, `Breast-MRI` and `Breast  MRI` all
//! compare equal. Pure and idempotent.

use std::sync::LazyLock;

use regex::Regex;

/// Separator runs collapsed to a single space: `_`, `-`, `.`, whitespace.
static SEPARATOR_RUNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[_\-.\s]+").expect("separator regex is valid")
});

/// Lowercase, collapse separator runs to single spaces, trim.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    SEPARATOR_RUNS.replace_all(&lowered, " ").trim().to_string()
}

/// Split an already-normalized string into tokens.
pub fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}
