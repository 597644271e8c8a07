//! # Chat Route Handler

use crate::{auth::middleware::AuthenticatedUser, errors::AppError, state::AppState};
use axum::{extract::State, Json};
use rolerag::ChatResponse;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize, Debug)]
pub struct ChatRequest {
    pub question: String,
}

/// Answers a question on behalf of the caller, scoped to their role.
pub async fn chat_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    info!(username = %user.0.username, role = %user.0.role, "Chat request received.");
    let response = app_state
        .orchestrator
        .chat(&user.context(), &payload.question)
        .await?;
    Ok(Json(response))
}
