//! # Table and Document Registry
//!
//! Read and write helpers for the two metadata tables: `tables_metadata` in the
//! tabular store, and `documents` in the application store.

use crate::types::{DocumentRecord, TableRegistration};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;
use turso::{params, Connection, Database, Row, Value as TursoValue};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] turso::Error),
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lists every table registration, ordered by table name.
pub async fn list_registrations(db: &Database) -> Result<Vec<TableRegistration>, RegistryError> {
    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT table_name, role FROM tables_metadata ORDER BY table_name ASC",
            (),
        )
        .await?;

    let mut registrations = Vec::new();
    while let Some(row) = rows.next().await? {
        registrations.push(TableRegistration {
            table_name: row.get(0)?,
            role: row.get(1)?,
        });
    }
    Ok(registrations)
}

/// Replaces the registration of `table_name` on an open connection.
///
/// Runs inside the caller's transaction so the table and its registration change together.
pub async fn register_table(
    conn: &Connection,
    table_name: &str,
    role: &str,
) -> Result<(), RegistryError> {
    conn.execute(
        "DELETE FROM tables_metadata WHERE table_name = ?",
        params![table_name],
    )
    .await?;
    conn.execute(
        "INSERT INTO tables_metadata (table_name, role) VALUES (?, ?)",
        params![table_name, role],
    )
    .await?;
    debug!(table = %table_name, role = %role, "Registered table.");
    Ok(())
}

const DOCUMENT_COLUMNS: &str =
    "id, filename, role, filepath, embedded, table_name, column_headers, created_at";

impl TryFrom<&Row> for DocumentRecord {
    type Error = RegistryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let embedded = match row.get_value(4)? {
            TursoValue::Integer(i) => i != 0,
            _ => false,
        };
        let table_name = match row.get_value(5)? {
            TursoValue::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        };
        let column_headers = match row.get_value(6)? {
            TursoValue::Text(s) if !s.is_empty() => serde_json::from_str(&s)?,
            _ => Vec::new(),
        };
        let created_at = match row.get_value(7)? {
            TursoValue::Text(s) => s,
            _ => String::new(),
        };
        Ok(DocumentRecord {
            id: row.get(0)?,
            filename: row.get(1)?,
            role: row.get(2)?,
            filepath: row.get(3)?,
            embedded,
            table_name,
            column_headers,
            created_at,
        })
    }
}

async fn collect_documents(
    conn: &Connection,
    sql: &str,
    params: Vec<TursoValue>,
) -> Result<Vec<DocumentRecord>, RegistryError> {
    let mut rows = if params.is_empty() {
        conn.query(sql, ()).await?
    } else {
        conn.query(sql, params).await?
    };
    let mut documents = Vec::new();
    while let Some(row) = rows.next().await? {
        documents.push(DocumentRecord::try_from(&row)?);
    }
    Ok(documents)
}

/// Lists every document record, newest last.
pub async fn list_documents(db: &Database) -> Result<Vec<DocumentRecord>, RegistryError> {
    let conn = db.connect()?;
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at ASC, filename ASC");
    collect_documents(&conn, &sql, Vec::new()).await
}

/// Finds the document uploaded under `filename` for `role` (role matched case-insensitively).
pub async fn find_document(
    db: &Database,
    filename: &str,
    role: &str,
) -> Result<Option<DocumentRecord>, RegistryError> {
    let conn = db.connect()?;
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE filename = ? AND LOWER(role) = LOWER(?) LIMIT 1"
    );
    let mut documents = collect_documents(
        &conn,
        &sql,
        vec![filename.to_string().into(), role.to_string().into()],
    )
    .await?;
    Ok(documents.pop())
}

/// Loads one document record by id.
pub async fn get_document(db: &Database, id: &str) -> Result<Option<DocumentRecord>, RegistryError> {
    let conn = db.connect()?;
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?");
    let mut documents = collect_documents(&conn, &sql, vec![id.to_string().into()]).await?;
    Ok(documents.pop())
}

/// Lists documents whose chunks have not been embedded yet.
pub async fn pending_documents(db: &Database) -> Result<Vec<DocumentRecord>, RegistryError> {
    let conn = db.connect()?;
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE embedded = 0 ORDER BY created_at ASC");
    collect_documents(&conn, &sql, Vec::new()).await
}

/// Inserts a document record. Any earlier record for the same filename and role,
/// together with its chunks, is removed first.
pub async fn replace_document(db: &Database, record: &DocumentRecord) -> Result<(), RegistryError> {
    let conn = db.connect()?;
    let headers = if record.column_headers.is_empty() {
        TursoValue::Null
    } else {
        TursoValue::Text(serde_json::to_string(&record.column_headers)?)
    };
    let table_name = record
        .table_name
        .clone()
        .map(TursoValue::Text)
        .unwrap_or(TursoValue::Null);

    conn.execute("BEGIN TRANSACTION", ()).await?;
    let result = async {
        conn.execute(
            "DELETE FROM document_chunks WHERE document_id IN
                (SELECT id FROM documents WHERE filename = ? AND LOWER(role) = LOWER(?))",
            params![record.filename.clone(), record.role.clone()],
        )
        .await?;
        conn.execute(
            "DELETE FROM documents WHERE filename = ? AND LOWER(role) = LOWER(?)",
            params![record.filename.clone(), record.role.clone()],
        )
        .await?;
        // A table has one schema source: the newest upload that produced it.
        if let TursoValue::Text(name) = &table_name {
            conn.execute(
                "UPDATE documents SET table_name = NULL, column_headers = NULL WHERE table_name = ?",
                params![name.clone()],
            )
            .await?;
        }
        conn.execute(
            "INSERT INTO documents (id, filename, role, filepath, embedded, table_name, column_headers)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            vec![
                TursoValue::Text(record.id.clone()),
                TursoValue::Text(record.filename.clone()),
                TursoValue::Text(record.role.clone()),
                TursoValue::Text(record.filepath.clone()),
                TursoValue::Integer(record.embedded as i64),
                table_name.clone(),
                headers.clone(),
            ],
        )
        .await?;
        Ok::<(), RegistryError>(())
    }
    .await;

    match result {
        Ok(()) => {
            conn.execute("COMMIT", ()).await?;
            Ok(())
        }
        Err(e) => {
            conn.execute("ROLLBACK", ()).await?;
            Err(e)
        }
    }
}

/// Flags a document as embedded.
pub async fn mark_embedded(db: &Database, id: &str) -> Result<(), RegistryError> {
    let conn = db.connect()?;
    conn.execute("UPDATE documents SET embedded = 1 WHERE id = ?", params![id])
        .await?;
    Ok(())
}

/// Returns the recorded column headers of each requested table.
///
/// Tables without a document record map to an empty column list.
pub async fn table_columns(
    db: &Database,
    tables: &BTreeSet<String>,
) -> Result<BTreeMap<String, Vec<String>>, RegistryError> {
    let mut columns: BTreeMap<String, Vec<String>> =
        tables.iter().map(|t| (t.clone(), Vec::new())).collect();
    if tables.is_empty() {
        return Ok(columns);
    }

    let conn = db.connect()?;
    let mut rows = conn
        .query(
            "SELECT table_name, column_headers FROM documents
             WHERE table_name IS NOT NULL AND column_headers IS NOT NULL",
            (),
        )
        .await?;
    while let Some(row) = rows.next().await? {
        let table: String = row.get(0)?;
        let headers: String = row.get(1)?;
        if let Some(entry) = columns.get_mut(&table) {
            *entry = serde_json::from_str(&headers)?;
        }
    }
    Ok(columns)
}
