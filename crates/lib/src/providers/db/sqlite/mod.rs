use crate::{
    errors::PromptError,
    providers::{
        ai::embedding::vector_literal,
        db::storage::{ChunkMatch, Storage, VectorSearch},
    },
    types::QueryRows,
};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{self, Debug};
use tracing::{debug, info};
use turso::{Database, Value as TursoValue};

pub mod sql;

/// A provider for interacting with a local SQLite database using Turso.
///
/// This provider holds a `Database` instance. When cloned, it shares the same
/// underlying database, so an in-memory instance can be shared by cloning it.
#[derive(Clone)]
pub struct SqliteProvider {
    /// The Turso database instance. It's cloneable and thread-safe.
    pub db: Database,
}

impl SqliteProvider {
    /// Creates a new `SqliteProvider` from a file path or in-memory.
    ///
    /// # Arguments
    ///
    /// * `db_path`: The path to the SQLite database file. Use ":memory:" for a unique,
    ///   isolated in-memory database.
    pub async fn new(db_path: &str) -> Result<Self, PromptError> {
        let db = turso::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| PromptError::StorageConnection(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| PromptError::StorageConnection(e.to_string()))?;
        // `query`, not `execute`: the PRAGMA returns a row.
        conn.query("PRAGMA journal_mode=WAL;", ())
            .await
            .map_err(|e| PromptError::StorageConnection(e.to_string()))?;

        Ok(Self { db })
    }

    /// A helper for tests to pre-populate data by executing multiple SQL statements.
    pub async fn initialize_with_data(&self, init_sql: &str) -> Result<(), PromptError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| PromptError::StorageConnection(e.to_string()))?;

        for statement in init_sql.split(';').filter(|s| !s.trim().is_empty()) {
            conn.execute(statement, ())
                .await
                .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Creates the application store tables: users, roles, documents and chunks.
    pub async fn initialize_schema(&self) -> Result<(), PromptError> {
        core_access::initialize_access_schema(&self.db)
            .await
            .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?;
        self.run_statements(sql::DOCUMENT_TABLE_CREATION_SQL).await
    }

    /// Creates the tabular store's `tables_metadata` registry.
    pub async fn initialize_tabular_schema(&self) -> Result<(), PromptError> {
        self.run_statements(sql::TABULAR_TABLE_CREATION_SQL).await
    }

    async fn run_statements(&self, statements: &[&str]) -> Result<(), PromptError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| PromptError::StorageConnection(e.to_string()))?;

        for statement in statements {
            conn.execute(statement, ())
                .await
                .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Debug for SqliteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteProvider").finish_non_exhaustive()
    }
}

impl AsRef<Database> for SqliteProvider {
    fn as_ref(&self) -> &Database {
        &self.db
    }
}

/// Converts a Turso value to a serde_json::Value.
pub(crate) fn turso_value_to_json(v: TursoValue) -> Value {
    match v {
        TursoValue::Null => Value::Null,
        TursoValue::Integer(i) => Value::Number(i.into()),
        TursoValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        TursoValue::Text(s) => Value::String(s),
        TursoValue::Blob(_) => Value::String("<blob>".to_string()),
    }
}

fn text_or_empty(v: TursoValue) -> String {
    match v {
        TursoValue::Text(s) => s,
        _ => String::new(),
    }
}

#[async_trait]
impl Storage for SqliteProvider {
    fn name(&self) -> &str {
        "SQLite"
    }

    async fn execute_query(&self, query: &str) -> Result<QueryRows, PromptError> {
        debug!(query = %query, "--> Executing SQLite query");

        let conn = self
            .db
            .connect()
            .map_err(|e| PromptError::StorageConnection(e.to_string()))?;

        let mut stmt = conn
            .prepare(query)
            .await
            .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?;

        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut rows = stmt
            .query(())
            .await
            .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?;

        let mut result_rows = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value = row
                    .get_value(i)
                    .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?;
                values.push(turso_value_to_json(value));
            }
            result_rows.push(values);
        }

        Ok(QueryRows {
            columns,
            rows: result_rows,
        })
    }
}

#[async_trait]
impl VectorSearch for SqliteProvider {
    async fn vector_search(
        &self,
        query_vector: &[f32],
        roles: Option<&[String]>,
        limit: u32,
    ) -> Result<Vec<ChunkMatch>, PromptError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| PromptError::StorageConnection(e.to_string()))?;

        let role_params: Vec<TursoValue> = roles
            .unwrap_or_default()
            .iter()
            .map(|r| TursoValue::Text(r.to_lowercase()))
            .collect();
        if roles.is_some() && role_params.is_empty() {
            return Ok(Vec::new());
        }

        let sql = sql::chunk_vector_search(&vector_literal(query_vector), role_params.len(), limit);
        info!(roles = ?roles, limit, "Executing chunk vector search.");

        let mut results = if role_params.is_empty() {
            conn.query(&sql, ()).await
        } else {
            conn.query(&sql, role_params).await
        }
        .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?;

        let mut matches = Vec::new();
        while let Some(row) = results
            .next()
            .await
            .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))?
        {
            let read = |i: usize| {
                row.get_value(i)
                    .map_err(|e| PromptError::StorageOperationFailed(e.to_string()))
            };
            let distance = match read(4)? {
                TursoValue::Real(f) => f,
                TursoValue::Integer(i) => i as f64,
                _ => 0.0,
            };
            matches.push(ChunkMatch {
                document_id: text_or_empty(read(0)?),
                filename: text_or_empty(read(1)?),
                role: text_or_empty(read(2)?),
                content: text_or_empty(read(3)?),
                distance,
            });
        }

        Ok(matches)
    }
}
