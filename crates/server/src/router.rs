use super::{handlers, state::AppState};
use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Creates the Axum router with all the application routes.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/login", get(handlers::login_handler))
        .route("/roles", get(handlers::list_roles_handler))
        .route("/create-role", post(handlers::create_role_handler))
        .route("/create-user", post(handlers::create_user_handler))
        .route(
            "/upload-docs",
            post(handlers::upload_docs_handler).layer(DefaultBodyLimit::max(10 * 1024 * 1024)),
        )
        .route("/documents", get(handlers::list_documents_handler))
        .route("/documents/reindex", post(handlers::reindex_handler))
        .route("/tables", get(handlers::list_tables_handler))
        .route("/chat", post(handlers::chat_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
