//! # API Route Handlers
//!
//! This module organizes all the Axum route handlers for the `rolerag-server`.
//! The handlers are split into sub-modules by concern.

pub mod admin_handlers;
pub mod auth_handlers;
pub mod chat_handlers;
pub mod document_handlers;
pub mod general;

// Re-export all handlers so the router can reach them under a single `handlers::` path.
pub use admin_handlers::*;
pub use auth_handlers::*;
pub use chat_handlers::*;
pub use document_handlers::*;
pub use general::*;
