//! # Document Upload Pipeline
//!
//! Validates an upload, stores it under its role's directory, loads CSVs into the tabular
//! store, records the document, chunks its text, and embeds the chunks when an
//! embedding service is configured.

use super::{
    tabular::{csv_to_text, derive_table_name, parse_csv, replace_table, CsvData},
    text::chunk_text,
    IngestError,
};
use crate::{
    locks::TableLocks,
    providers::{
        ai::{
            embedding::{embedding_to_blob, EmbeddingConfig},
            generate_embedding,
        },
        db::sqlite::SqliteProvider,
    },
    registry::{self, get_document, mark_embedded, pending_documents, replace_document},
    types::{DocumentRecord, UploadReport},
};
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::Client as ReqwestClient;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};
use turso::{params, Value as TursoValue};
use uuid::Uuid;

/// Concurrent embedding requests per document.
const EMBEDDING_CONCURRENCY: usize = 4;

/// The two accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Csv,
    Markdown,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Result<Self, IngestError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("csv") => Ok(DocumentKind::Csv),
            Some("md") => Ok(DocumentKind::Markdown),
            _ => Err(IngestError::UnsupportedFileType(filename.to_string())),
        }
    }
}

/// Reduces a client-supplied filename to a bare file name.
pub fn sanitize_filename(filename: &str) -> Result<String, IngestError> {
    let name = Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(IngestError::InvalidFilename(filename.to_string()));
    }
    Ok(name.to_string())
}

/// A validated upload, parsed before anything is written.
enum ParsedUpload {
    Csv {
        table_name: String,
        csv: CsvData,
        chunks: Vec<String>,
    },
    Markdown {
        chunks: Vec<String>,
    },
}

impl ParsedUpload {
    fn parse(kind: DocumentKind, filename: &str, data: &[u8]) -> Result<Self, IngestError> {
        match kind {
            DocumentKind::Csv => {
                let table_name = derive_table_name(filename)?;
                let csv = parse_csv(data)?;
                let chunks = chunk_text(&csv_to_text(&csv))?;
                Ok(ParsedUpload::Csv {
                    table_name,
                    csv,
                    chunks,
                })
            }
            DocumentKind::Markdown => {
                let text = std::str::from_utf8(data).map_err(|_| IngestError::InvalidUtf8)?;
                Ok(ParsedUpload::Markdown {
                    chunks: chunk_text(text)?,
                })
            }
        }
    }

    fn chunks(&self) -> &[String] {
        match self {
            ParsedUpload::Csv { chunks, .. } | ParsedUpload::Markdown { chunks } => chunks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentIngestor {
    app_store: SqliteProvider,
    tabular_store: SqliteProvider,
    locks: TableLocks,
    upload_dir: PathBuf,
    embedding: EmbeddingConfig,
    http: ReqwestClient,
}

impl DocumentIngestor {
    pub fn new(
        app_store: SqliteProvider,
        tabular_store: SqliteProvider,
        locks: TableLocks,
        upload_dir: impl Into<PathBuf>,
        embedding: EmbeddingConfig,
        timeout: Duration,
    ) -> Result<Self, IngestError> {
        let http = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(crate::errors::PromptError::ReqwestClientBuild)?;
        Ok(Self {
            app_store,
            tabular_store,
            locks,
            upload_dir: upload_dir.into(),
            embedding,
            http,
        })
    }

    /// Ingests one uploaded file for `role`.
    ///
    /// The role must exist. Permission to upload for that role is the caller's concern.
    /// An embedding failure does not fail the upload: the document stays pending and
    /// can be embedded later with [`DocumentIngestor::embed_pending`].
    pub async fn ingest_upload(
        &self,
        filename: &str,
        role: &str,
        data: &[u8],
    ) -> Result<UploadReport, IngestError> {
        let filename = sanitize_filename(filename)?;
        let kind = DocumentKind::from_filename(&filename)?;
        let role = core_access::find_role(&self.app_store.db, role)
            .await?
            .ok_or_else(|| IngestError::UnknownRole(role.to_string()))?;

        if !core_access::is_valid_role_name(&role) {
            return Err(IngestError::UnknownRole(role));
        }
        let parsed = ParsedUpload::parse(kind, &filename, data)?;

        let role_dir = self.upload_dir.join(&role);
        tokio::fs::create_dir_all(&role_dir).await?;
        let filepath = role_dir.join(&filename);
        tokio::fs::write(&filepath, data).await?;
        info!(filename = %filename, role = %role, path = %filepath.display(), "Stored upload.");

        let (table_name, column_headers, rows_ingested) = match &parsed {
            ParsedUpload::Csv {
                table_name, csv, ..
            } => {
                let rows =
                    replace_table(&self.tabular_store.db, &self.locks, table_name, &role, csv)
                        .await?;
                (Some(table_name.clone()), csv.headers.clone(), rows)
            }
            ParsedUpload::Markdown { .. } => (None, Vec::new(), 0),
        };
        let chunks = parsed.chunks();

        let record = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            filename: filename.clone(),
            role: role.clone(),
            filepath: filepath.to_string_lossy().into_owned(),
            embedded: false,
            table_name: table_name.clone(),
            column_headers,
            created_at: String::new(),
        };
        replace_document(&self.app_store.db, &record).await?;
        self.store_chunks(&record, chunks).await?;

        let embedded = if self.embedding.is_configured() {
            match self.embed_document(&record.id).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Embedding failed; document left pending.");
                    false
                }
            }
        } else {
            warn!(filename = %filename, "Embedding service not configured; document left pending.");
            false
        };

        Ok(UploadReport {
            document_id: record.id,
            filename,
            role,
            table_name,
            rows_ingested,
            chunks: chunks.len(),
            embedded,
        })
    }

    async fn store_chunks(
        &self,
        record: &DocumentRecord,
        chunks: &[String],
    ) -> Result<(), IngestError> {
        let conn = self.app_store.db.connect()?;
        conn.execute(
            "DELETE FROM document_chunks WHERE document_id = ?",
            params![record.id.clone()],
        )
        .await?;
        let mut stmt = conn
            .prepare(
                "INSERT INTO document_chunks (id, document_id, role, filename, chunk_index, content)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .await?;
        for (index, chunk) in chunks.iter().enumerate() {
            stmt.execute(vec![
                TursoValue::Text(Uuid::new_v4().to_string()),
                TursoValue::Text(record.id.clone()),
                TursoValue::Text(record.role.clone()),
                TursoValue::Text(record.filename.clone()),
                TursoValue::Integer(index as i64),
                TursoValue::Text(chunk.clone()),
            ])
            .await?;
        }
        Ok(())
    }

    /// Rebuilds a document's chunks from its stored file.
    async fn rechunk_from_file(&self, record: &DocumentRecord) -> Result<(), IngestError> {
        let data = tokio::fs::read(&record.filepath).await?;
        let text = match DocumentKind::from_filename(&record.filename)? {
            DocumentKind::Csv => csv_to_text(&parse_csv(&data)?),
            DocumentKind::Markdown => std::str::from_utf8(&data)
                .map_err(|_| IngestError::InvalidUtf8)?
                .to_string(),
        };
        self.store_chunks(record, &chunk_text(&text)?).await
    }

    /// Embeds every chunk of one document that has no embedding yet, then flags it embedded.
    async fn embed_document(&self, document_id: &str) -> Result<(), IngestError> {
        let conn = self.app_store.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, content FROM document_chunks WHERE document_id = ? AND embedding IS NULL",
                params![document_id],
            )
            .await?;
        let mut pending: Vec<(String, String)> = Vec::new();
        while let Some(row) = rows.next().await? {
            pending.push((row.get(0)?, row.get(1)?));
        }
        drop(rows);

        let vectors: Vec<(String, Vec<f32>)> = stream::iter(pending)
            .map(|(chunk_id, content)| async move {
                let vector = generate_embedding(&self.http, &self.embedding, &content).await?;
                Ok::<_, IngestError>((chunk_id, vector))
            })
            .buffered(EMBEDDING_CONCURRENCY)
            .try_collect()
            .await?;

        for (chunk_id, vector) in &vectors {
            conn.execute(
                "UPDATE document_chunks SET embedding = ? WHERE id = ?",
                vec![
                    TursoValue::Blob(embedding_to_blob(vector)),
                    TursoValue::Text(chunk_id.clone()),
                ],
            )
            .await?;
        }
        mark_embedded(&self.app_store.db, document_id).await?;
        info!(document_id = %document_id, chunks = vectors.len(), "Embedded document.");
        Ok(())
    }

    /// Embeds every document whose embedded flag is false. Returns how many succeeded.
    ///
    /// A document without chunks is re-chunked from its stored file first.
    pub async fn embed_pending(&self) -> Result<usize, IngestError> {
        if !self.embedding.is_configured() {
            return Err(IngestError::EmbeddingNotConfigured);
        }

        let mut embedded = 0;
        for record in pending_documents(&self.app_store.db).await? {
            if self.chunk_count(&record.id).await? == 0 {
                if let Err(e) = self.rechunk_from_file(&record).await {
                    warn!(filename = %record.filename, error = %e, "Could not rebuild chunks.");
                    continue;
                }
            }
            match self.embed_document(&record.id).await {
                Ok(()) => embedded += 1,
                Err(e) => warn!(filename = %record.filename, error = %e, "Embedding failed."),
            }
        }
        Ok(embedded)
    }

    async fn chunk_count(&self, document_id: &str) -> Result<i64, IngestError> {
        let conn = self.app_store.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM document_chunks WHERE document_id = ?",
                params![document_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    /// Lists the documents visible to `role`.
    pub async fn visible_documents(&self, role: &str) -> Result<Vec<DocumentRecord>, IngestError> {
        let scope = crate::access::visible_roles(role);
        Ok(registry::list_documents(&self.app_store.db)
            .await?
            .into_iter()
            .filter(|d| scope.includes(&d.role))
            .collect())
    }

    /// Loads one document record.
    pub async fn document(&self, id: &str) -> Result<Option<DocumentRecord>, IngestError> {
        Ok(get_document(&self.app_store.db, id).await?)
    }
}
