//! # Document Route Handlers
//!
//! Upload, listing and re-embedding of role-tagged documents, plus the caller's
//! queryable tables.

use crate::{auth::middleware::AuthenticatedUser, errors::AppError, state::AppState};
use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use rolerag::{
    allowed_tables,
    types::{DocumentRecord, UploadReport},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Serialize, Deserialize, Debug)]
pub struct UploadResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: UploadReport,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DocumentsResponse {
    pub documents: Vec<DocumentRecord>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ReindexResponse {
    pub message: String,
    pub embedded: usize,
}

/// Ingests one `.csv` or `.md` file for a role.
///
/// Multipart fields: `file` (required) and `role` (defaults to the caller's role).
/// The privileged role may upload for any existing role; others only for their own.
pub async fn upload_docs_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut target_role: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::BadRequest("The file part has no filename.".to_string()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?;
                file = Some((filename, data.to_vec()));
            }
            "role" => {
                let role = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read role: {e}")))?;
                target_role = Some(role.trim().to_string()).filter(|r| !r.is_empty());
            }
            _ => warn!("Ignoring unknown multipart field: {}", name),
        }
    }

    let (filename, data) =
        file.ok_or_else(|| AppError::BadRequest("Missing 'file' field.".to_string()))?;
    let target_role = target_role.unwrap_or_else(|| user.0.role.clone());

    if !user.is_privileged() && !target_role.eq_ignore_ascii_case(&user.0.role) {
        warn!(username = %user.0.username, role = %user.0.role, target = %target_role, "Upload for a foreign role refused.");
        return Err(AppError::Forbidden(format!(
            "You can only upload documents for your own role ('{}').",
            user.0.role
        )));
    }

    info!(username = %user.0.username, filename = %filename, role = %target_role, "Upload received.");
    let report = app_state
        .ingestor
        .ingest_upload(&filename, &target_role, &data)
        .await?;

    let message = if report.embedded {
        format!("'{}' uploaded for role '{}'.", report.filename, report.role)
    } else {
        format!(
            "'{}' uploaded for role '{}'; embedding is pending.",
            report.filename, report.role
        )
    };
    Ok(Json(UploadResponse { message, report }))
}

/// Lists the documents the caller's role may see.
pub async fn list_documents_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = app_state.ingestor.visible_documents(&user.0.role).await?;
    Ok(Json(DocumentsResponse { documents }))
}

/// Lists the tables the caller's role may query.
pub async fn list_tables_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<TablesResponse>, AppError> {
    let tables = allowed_tables(&app_state.tabular_store.db, &user.0.role).await?;
    Ok(Json(TablesResponse {
        tables: tables.into_iter().collect(),
    }))
}

/// Embeds every document still waiting for embeddings.
pub async fn reindex_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ReindexResponse>, AppError> {
    if !user.is_privileged() {
        return Err(AppError::Forbidden(format!(
            "Only {} users can re-index documents.",
            core_access::PRIVILEGED_ROLE
        )));
    }

    let embedded = app_state.ingestor.embed_pending().await?;
    info!(by = %user.0.username, embedded, "Re-index finished.");
    Ok(Json(ReindexResponse {
        message: format!("Embedded {embedded} pending document(s)."),
        embedded,
    }))
}
