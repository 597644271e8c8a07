//! # Authentication Route Handlers
//!
//! Endpoints that only need a verified caller.

use crate::{auth::middleware::AuthenticatedUser, errors::AppError, state::AppState};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RolesResponse {
    pub roles: Vec<String>,
}

/// Confirms the caller's credentials and reports their role.
pub async fn login_handler(user: AuthenticatedUser) -> Json<LoginResponse> {
    info!(username = %user.0.username, role = %user.0.role, "User logged in.");
    Json(LoginResponse {
        message: format!("Welcome {}!", user.0.username),
        role: user.0.role,
    })
}

/// Lists every role.
pub async fn list_roles_handler(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<RolesResponse>, AppError> {
    let roles = core_access::list_roles(&app_state.app_store.db).await?;
    Ok(Json(RolesResponse { roles }))
}
