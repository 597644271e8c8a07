//! # Authentication Middleware
//!
//! This module provides the Axum extractor for HTTP Basic authentication.
//! Handlers that take an `AuthenticatedUser` only run for callers whose
//! username and password match a stored user.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Basic, Authorization},
    TypedHeader,
};
use core_access::{AccessError, User};
use rolerag::UserContext;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::state::AppState;

/// An Axum extractor that provides the currently authenticated user.
///
/// - **No credentials**: rejected with `401 Unauthorized` and a Basic challenge.
/// - **Wrong credentials**: rejected the same way.
/// - **Valid credentials**: resolves to the stored user.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn is_privileged(&self) -> bool {
        core_access::is_privileged(&self.0.role)
    }

    /// The `(username, role)` pair the chat layer needs.
    pub fn context(&self) -> UserContext {
        UserContext::new(&self.0.username, &self.0.role)
    }
}

/// A custom rejection type for authentication failures.
pub struct AuthError(StatusCode, String);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = (self.0, Json(json!({ "error": self.1 }))).into_response();
        if self.0 == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic realm=\"rolerag\""),
            );
        }
        response
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let basic_header =
            Option::<TypedHeader<Authorization<Basic>>>::from_request_parts(parts, state)
                .await
                .map_err(|e| {
                    warn!("Unexpected error during header extraction: {}", e);
                    AuthError(
                        StatusCode::BAD_REQUEST,
                        "Invalid Authorization header format.".to_string(),
                    )
                })?;

        let Some(TypedHeader(Authorization(basic))) = basic_header else {
            debug!("No Basic credentials on request.");
            return Err(AuthError(
                StatusCode::UNAUTHORIZED,
                "Authentication required.".to_string(),
            ));
        };

        let user = core_access::verify_credentials(
            &state.app_store.db,
            basic.username(),
            basic.password(),
        )
        .await
        .map_err(|e| match e {
            AccessError::InvalidCredentials => AuthError(
                StatusCode::UNAUTHORIZED,
                "Invalid username or password.".to_string(),
            ),
            other => {
                error!("Failed to verify credentials: {}", other);
                AuthError(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not verify credentials.".to_string(),
                )
            }
        })?;

        Ok(AuthenticatedUser(user))
    }
}
