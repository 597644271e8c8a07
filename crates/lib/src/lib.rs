//! # Role-Scoped Question Routing
//!
//! This crate answers natural-language questions against role-restricted data. A
//! question is classified as structured or unstructured; structured questions are
//! translated into SQL, checked by a textual safety gate and an allowed-table check,
//! and run against the tabular store. Any structured failure falls back to retrieval
//! over the caller's visible documents.

pub mod access;
pub mod chat;
pub mod classifier;
pub mod constants;
pub mod errors;
pub mod executor;
pub mod format;
pub mod ingest;
pub mod locks;
pub mod prompts;
pub mod providers;
pub mod registry;
pub mod retrieval;
pub mod sql_guard;
pub mod translator;
pub mod types;

pub use access::{allowed_tables, visible_roles, RoleScope};
pub use chat::{ChatError, ChatOrchestrator, ChatOrchestratorBuilder, StructuredFailure};
pub use classifier::{ClassificationError, QueryClassifier};
pub use errors::PromptError;
pub use executor::{AccessDenied, ExecutionError, StructuredExecutor, StructuredOutcome};
pub use ingest::{DocumentIngestor, IngestError};
pub use locks::TableLocks;
pub use retrieval::{DocumentRetriever, EmbeddingConfig, EmbeddingRetriever, RetrievalError};
pub use sql_guard::{is_safe, validate, UnsafeStatement, ValidatedSql};
pub use translator::{SqlTranslator, TranslationError};
pub use types::{ChatMode, ChatResponse, QueryLabel, RagAnswer, UserContext};
