//! # Structured Query Execution
//!
//! Runs a validated statement against the tabular store after checking that every
//! table it references is allowed for the caller. Failures are returned as values so
//! the orchestrator can fall back instead of aborting the request.

use crate::{
    constants::NO_RESULTS_MESSAGE,
    format::markdown_table,
    locks::TableLocks,
    providers::db::storage::Storage,
    sql_guard::ValidatedSql,
    types::QueryRows,
};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Access denied to table: {table}")]
pub struct AccessDenied {
    pub table: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Error: {0}")]
pub struct ExecutionError(pub String);

/// The result of one structured query.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutcome {
    Rows(QueryRows),
    /// The query ran and matched nothing. Still a success.
    NoResults,
    Denied(AccessDenied),
    Failed(ExecutionError),
}

impl StructuredOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StructuredOutcome::Rows(_) | StructuredOutcome::NoResults)
    }

    /// The user-facing answer text.
    pub fn answer(&self) -> String {
        match self {
            StructuredOutcome::Rows(rows) => markdown_table(rows),
            StructuredOutcome::NoResults => NO_RESULTS_MESSAGE.to_string(),
            StructuredOutcome::Denied(denied) => denied.to_string(),
            StructuredOutcome::Failed(error) => error.to_string(),
        }
    }
}

// --- Table reference extraction ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    /// A single-quoted string. SQLite reads one as a table name in table position.
    Str(String),
    Dot,
    Comma,
    LParen,
    RParen,
    Other,
}

fn read_delimited(chars: &[char], start: usize, close: char) -> (String, usize) {
    let mut text = String::new();
    let mut i = start;
    while i < chars.len() {
        if chars[i] == close {
            // A doubled closing quote is an escaped quote.
            if close != ']' && chars.get(i + 1) == Some(&close) {
                text.push(close);
                i += 2;
                continue;
            }
            return (text, i + 1);
        }
        text.push(chars[i]);
        i += 1;
    }
    (text, i)
}

fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            '\'' => {
                let (text, next) = read_delimited(&chars, i + 1, '\'');
                tokens.push(Token::Str(text));
                i = next;
            }
            '"' | '`' | '[' => {
                let close = match c {
                    '[' => ']',
                    other => other,
                };
                let (text, next) = read_delimited(&chars, i + 1, close);
                tokens.push(Token::Quoted(text));
                i = next;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_alphanumeric() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            _ => {
                tokens.push(Token::Other);
                i += 1;
            }
        }
    }
    tokens
}

/// Words that end a `FROM` item instead of naming its alias.
const CLAUSE_KEYWORDS: &[&str] = &[
    "where", "join", "inner", "left", "right", "full", "outer", "cross", "natural", "on",
    "using", "group", "order", "limit", "offset", "having", "union", "except", "intersect",
    "window", "as", "indexed", "not",
];

fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
    matches!(token, Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
}

/// Reads `name` or `schema.name` starting at `i`.
fn read_qualified_name(tokens: &[Token], mut i: usize) -> Option<(String, usize)> {
    let mut name = match tokens.get(i)? {
        Token::Word(w) | Token::Quoted(w) | Token::Str(w) => w.clone(),
        _ => return None,
    };
    i += 1;
    while tokens.get(i) == Some(&Token::Dot) {
        match tokens.get(i + 1) {
            Some(Token::Word(w)) | Some(Token::Quoted(w)) | Some(Token::Str(w)) => {
                name.push('.');
                name.push_str(w);
                i += 2;
            }
            _ => break,
        }
    }
    Some((name, i))
}

fn skip_parenthesized(tokens: &[Token], mut i: usize) -> usize {
    let mut depth = 0usize;
    while i < tokens.len() {
        match tokens[i] {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    i
}

fn skip_alias(tokens: &[Token], mut i: usize) -> usize {
    if is_keyword(tokens.get(i), "as") {
        i += 1;
        if matches!(
            tokens.get(i),
            Some(Token::Word(_)) | Some(Token::Quoted(_)) | Some(Token::Str(_))
        ) {
            i += 1;
        }
        return i;
    }
    match tokens.get(i) {
        Some(Token::Quoted(_)) | Some(Token::Str(_)) => i + 1,
        Some(Token::Word(w))
            if !CLAUSE_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)) =>
        {
            i + 1
        }
        _ => i,
    }
}

/// Skips `INDEXED BY <index>` or `NOT INDEXED` after a table name.
fn skip_index_hint(tokens: &[Token], i: usize) -> usize {
    if is_keyword(tokens.get(i), "indexed") && is_keyword(tokens.get(i + 1), "by") {
        return (i + 3).min(tokens.len());
    }
    if is_keyword(tokens.get(i), "not") && is_keyword(tokens.get(i + 1), "indexed") {
        return i + 2;
    }
    i
}

fn starts_subquery(token: Option<&Token>) -> bool {
    ["select", "with", "values"]
        .iter()
        .any(|k| is_keyword(token, k))
}

/// Reads the comma-separated table list starting at `i` into `tables`.
///
/// A parenthesized group that is not a subquery is read as a nested table list.
/// Subqueries are skipped here; their own `FROM` clauses are found by the outer scan.
/// Returns `None` when the item at `i` is not recognizable as a table reference.
fn read_table_list(tokens: &[Token], mut i: usize, tables: &mut BTreeSet<String>) -> Option<usize> {
    loop {
        if tokens.get(i) == Some(&Token::LParen) {
            if !starts_subquery(tokens.get(i + 1)) {
                read_table_list(tokens, i + 1, tables)?;
            }
            i = skip_parenthesized(tokens, i);
        } else {
            let (name, next) = read_qualified_name(tokens, i)?;
            tables.insert(name);
            i = next;
            // Table-valued function arguments.
            if tokens.get(i) == Some(&Token::LParen) {
                i = skip_parenthesized(tokens, i);
            }
        }
        i = skip_alias(tokens, i);
        i = skip_index_hint(tokens, i);
        if tokens.get(i) == Some(&Token::Comma) {
            i += 1;
        } else {
            return Some(i);
        }
    }
}

/// `IS [NOT] DISTINCT FROM` compares values and names no table.
fn is_distinct_from(tokens: &[Token], i: usize) -> bool {
    i >= 2
        && is_keyword(tokens.get(i - 1), "distinct")
        && (is_keyword(tokens.get(i - 2), "is") || is_keyword(tokens.get(i - 2), "not"))
}

/// Marker used as the denied table when a `FROM` or `JOIN` target cannot be read.
pub const UNRECOGNIZED_TABLE: &str = "<unrecognized table reference>";

/// Collects the tables named after `FROM` (including comma lists and parenthesized
/// lists) and `JOIN`.
///
/// Subqueries are not skipped wholesale: their own `FROM` clauses are found by the
/// same scan, so nested references are reported too. A target that cannot be read
/// is an error, so the caller denies instead of under-detecting.
pub fn extract_table_references(sql: &str) -> Result<BTreeSet<String>, AccessDenied> {
    let tokens = tokenize(sql);
    let mut tables = BTreeSet::new();

    for (i, token) in tokens.iter().enumerate() {
        let Token::Word(word) = token else { continue };
        let is_target = word.eq_ignore_ascii_case("join")
            || (word.eq_ignore_ascii_case("from") && !is_distinct_from(&tokens, i));
        if is_target && read_table_list(&tokens, i + 1, &mut tables).is_none() {
            return Err(AccessDenied {
                table: UNRECOGNIZED_TABLE.to_string(),
            });
        }
    }
    Ok(tables)
}

// --- Executor ---

/// Runs validated statements against a storage backend under per-table read locks.
#[derive(Debug, Clone)]
pub struct StructuredExecutor {
    storage: Box<dyn Storage>,
    locks: TableLocks,
}

impl StructuredExecutor {
    pub fn new(storage: Box<dyn Storage>, locks: TableLocks) -> Self {
        Self { storage, locks }
    }

    /// Executes `sql` if every referenced table is in `allowed_tables`.
    pub async fn execute(
        &self,
        sql: &ValidatedSql,
        allowed_tables: &BTreeSet<String>,
    ) -> StructuredOutcome {
        let referenced = match extract_table_references(sql.as_str()) {
            Ok(referenced) => referenced,
            Err(denied) => {
                warn!(sql = %sql, "Query has a table reference that cannot be read.");
                return StructuredOutcome::Denied(denied);
            }
        };
        if let Some(denied) = referenced
            .iter()
            .find(|table| !allowed_tables.iter().any(|a| a.eq_ignore_ascii_case(table)))
        {
            warn!(table = %denied, "Query references a table outside the allowed set.");
            return StructuredOutcome::Denied(AccessDenied {
                table: denied.clone(),
            });
        }

        let _guards = self.locks.read_many(&referenced).await;
        match self.storage.execute_query(sql.as_str()).await {
            Ok(rows) if rows.is_empty() => StructuredOutcome::NoResults,
            Ok(rows) => {
                info!(storage = self.storage.name(), rows = rows.rows.len(), "Structured query succeeded.");
                StructuredOutcome::Rows(rows)
            }
            Err(e) => {
                warn!(error = %e, "Structured query failed.");
                StructuredOutcome::Failed(ExecutionError(e.to_string()))
            }
        }
    }
}
