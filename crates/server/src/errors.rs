use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use core_access::AccessError;
use rolerag::{
    registry::RegistryError, retrieval::RetrievalError, ChatError, IngestError, PromptError,
};
use serde_json::json;
use tracing::error;

/// A custom error type for the server application.
///
/// This enum encapsulates the errors a handler can return, allowing them to be
/// converted into appropriate HTTP responses with a JSON `{"error": ..}` body.
#[derive(Debug)]
pub enum AppError {
    /// The request was malformed or referenced something that does not exist.
    BadRequest(String),
    /// The caller is authenticated but not allowed to do this.
    Forbidden(String),
    Prompt(PromptError),
    Chat(ChatError),
    Ingest(IngestError),
    Access(AccessError),
    Registry(RegistryError),
    /// Generic internal server errors.
    Internal(anyhow::Error),
}

impl From<PromptError> for AppError {
    fn from(err: PromptError) -> Self {
        AppError::Prompt(err)
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        AppError::Chat(err)
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        AppError::Ingest(err)
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        AppError::Access(err)
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError::Registry(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

fn prompt_status(err: &PromptError) -> StatusCode {
    match err {
        PromptError::AiRequest(_) | PromptError::AiDeserialization(_) | PromptError::AiApi(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, error_message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            AppError::Prompt(err) => {
                error!("PromptError: {:?}", err);
                (prompt_status(&err), err.to_string())
            }
            AppError::Chat(err) => {
                error!("ChatError: {:?}", err);
                let status = match &err {
                    ChatError::EmptyQuestion => StatusCode::BAD_REQUEST,
                    ChatError::Classification(_) => StatusCode::BAD_GATEWAY,
                    ChatError::Retrieval(RetrievalError::NotConfigured) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    ChatError::Retrieval(_) => StatusCode::BAD_GATEWAY,
                };
                (status, err.to_string())
            }
            AppError::Ingest(err) => {
                error!("IngestError: {:?}", err);
                let status = match &err {
                    IngestError::UnsupportedFileType(_)
                    | IngestError::InvalidFilename(_)
                    | IngestError::InvalidTableName(_)
                    | IngestError::UnknownRole(_)
                    | IngestError::EmptyContent
                    | IngestError::NoData
                    | IngestError::InvalidUtf8
                    | IngestError::Csv(_)
                    | IngestError::EmbeddingNotConfigured => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            AppError::Access(err) => {
                error!("AccessError: {:?}", err);
                match err {
                    AccessError::RoleExists(_)
                    | AccessError::InvalidRole(_)
                    | AccessError::UnknownRole(_)
                    | AccessError::UserExists(_)
                    | AccessError::InvalidUsername(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                    AccessError::InvalidCredentials => {
                        (StatusCode::UNAUTHORIZED, err.to_string())
                    }
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "An internal server error occurred.".to_string(),
                    ),
                }
            }
            AppError::Registry(err) => {
                error!("RegistryError: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
            AppError::Internal(err) => {
                error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status_code, body).into_response()
    }
}
