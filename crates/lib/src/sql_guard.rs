//! # SQL Safety Gate
//!
//! A textual check that a generated statement is a single read-only `SELECT`.
//! It does not parse SQL: comments and string literals are not understood, so a
//! forbidden word inside a literal is still rejected.

use std::fmt;
use thiserror::Error;

/// Words that reject a statement wherever they appear as a whole word.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "attach", "detach", "pragma",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnsafeStatement {
    #[error("Statement is empty")]
    Empty,
    #[error("Only SELECT statements are allowed")]
    NotSelect,
    #[error("Multiple statements are not allowed")]
    MultipleStatements,
    #[error("Forbidden keyword: {0}")]
    ForbiddenKeyword(String),
}

/// A statement that passed [`validate`]. The executor accepts nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatedSql {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn strip_trailing_semicolon(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').map(str::trim_end).unwrap_or(trimmed)
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

/// Checks `sql` and returns it trimmed, without its trailing `;`, in original casing.
pub fn validate(sql: &str) -> Result<ValidatedSql, UnsafeStatement> {
    let statement = strip_trailing_semicolon(sql);
    if statement.is_empty() {
        return Err(UnsafeStatement::Empty);
    }

    let lowered = statement.to_lowercase();
    if !lowered.starts_with("select") || words(&lowered).next() != Some("select") {
        return Err(UnsafeStatement::NotSelect);
    }
    if lowered.contains(';') {
        return Err(UnsafeStatement::MultipleStatements);
    }
    if let Some(keyword) = words(&lowered).find(|w| FORBIDDEN_KEYWORDS.contains(w)) {
        return Err(UnsafeStatement::ForbiddenKeyword(keyword.to_string()));
    }

    Ok(ValidatedSql(statement.to_string()))
}

/// Returns true if `sql` is a single read-only `SELECT`.
pub fn is_safe(sql: &str) -> bool {
    validate(sql).is_ok()
}
