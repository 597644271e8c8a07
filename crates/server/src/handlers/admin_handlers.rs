//! # Admin Route Handlers
//!
//! Role and user management. Only the privileged role may call these.

use crate::{auth::middleware::AuthenticatedUser, errors::AppError, state::AppState};
use axum::{extract::State, Form, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Deserialize, Debug)]
pub struct CreateRoleForm {
    pub role_name: String,
}

#[derive(Deserialize, Debug)]
pub struct CreateUserForm {
    pub username: String,
    pub password: String,
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AdminResponse {
    pub message: String,
}

fn require_privileged(user: &AuthenticatedUser, action: &str) -> Result<(), AppError> {
    if user.is_privileged() {
        return Ok(());
    }
    warn!(username = %user.0.username, role = %user.0.role, action, "Forbidden admin action.");
    Err(AppError::Forbidden(format!(
        "Only {} users can {action}.",
        core_access::PRIVILEGED_ROLE
    )))
}

/// Creates a new role.
pub async fn create_role_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Form(form): Form<CreateRoleForm>,
) -> Result<Json<AdminResponse>, AppError> {
    require_privileged(&user, "create roles")?;

    let role = core_access::create_role(&app_state.app_store.db, &form.role_name).await?;
    info!(by = %user.0.username, role = %role, "Role created.");
    Ok(Json(AdminResponse {
        message: format!("Role '{role}' created."),
    }))
}

/// Creates a new user under an existing role.
pub async fn create_user_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Form(form): Form<CreateUserForm>,
) -> Result<Json<AdminResponse>, AppError> {
    require_privileged(&user, "create users")?;
    if form.password.is_empty() {
        return Err(AppError::BadRequest("Password must not be empty.".to_string()));
    }

    let created = core_access::create_user(
        &app_state.app_store.db,
        &form.username,
        &form.password,
        &form.role,
        app_state.config.password_cost,
    )
    .await?;
    info!(by = %user.0.username, username = %created.username, role = %created.role, "User created.");
    Ok(Json(AdminResponse {
        message: format!(
            "User '{}' created with role '{}'.",
            created.username, created.role
        ),
    }))
}
