//! # SQLite Schema Definitions
//!
//! Table definitions for the two stores. Every statement is idempotent.

/// Tables owned by the application store, in addition to the access tables
/// from `core-access`.
pub const DOCUMENT_TABLE_CREATION_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        filename TEXT NOT NULL,
        role TEXT NOT NULL,
        filepath TEXT NOT NULL,
        embedded INTEGER NOT NULL DEFAULT 0,
        table_name TEXT,
        column_headers TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS document_chunks (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        role TEXT NOT NULL,
        filename TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB
    );",
    "CREATE INDEX IF NOT EXISTS idx_documents_role ON documents(role);",
    "CREATE INDEX IF NOT EXISTS idx_document_chunks_document ON document_chunks(document_id);",
];

/// The registry table of the tabular store.
pub const TABULAR_TABLE_CREATION_SQL: &[&str] = &["CREATE TABLE IF NOT EXISTS tables_metadata (
        table_name TEXT PRIMARY KEY,
        role TEXT NOT NULL
    );"];

/// Returns the similarity query over `document_chunks`.
///
/// `vector_literal` is the rendered query vector. When `role_params > 0`, the query
/// filters on `LOWER(role) IN (?, ..)` with that many placeholders.
pub fn chunk_vector_search(vector_literal: &str, role_params: usize, limit: u32) -> String {
    let role_filter = if role_params == 0 {
        String::new()
    } else {
        let placeholders = vec!["?"; role_params].join(", ");
        format!(" AND LOWER(role) IN ({placeholders})")
    };
    format!(
        "SELECT document_id, filename, role, content, vector_distance_cos(embedding, {vector_literal}) AS distance
         FROM document_chunks
         WHERE embedding IS NOT NULL{role_filter}
         ORDER BY distance ASC
         LIMIT {limit};"
    )
}
