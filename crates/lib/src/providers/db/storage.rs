use crate::{errors::PromptError, types::QueryRows};
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;

/// A trait for running read queries against a storage backend.
///
/// The structured executor only ever sees this trait, so tests can substitute a
/// backend that records or rejects queries.
#[async_trait]
pub trait Storage: Send + Sync + DynClone + Debug {
    /// Returns the name of the storage provider (e.g., "SQLite").
    fn name(&self) -> &str;

    /// Executes a SQL query and returns its columns and rows.
    async fn execute_query(&self, sql: &str) -> Result<QueryRows, PromptError>;
}

dyn_clone::clone_trait_object!(Storage);

/// A chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMatch {
    pub document_id: String,
    pub filename: String,
    pub role: String,
    pub content: String,
    pub distance: f64,
}

/// A trait for similarity search over embedded document chunks.
#[async_trait]
pub trait VectorSearch: Send + Sync + Debug {
    /// Returns the `limit` chunks nearest to `query_vector` whose role is in `roles`.
    ///
    /// `roles == None` means no role filter (the privileged view).
    async fn vector_search(
        &self,
        query_vector: &[f32],
        roles: Option<&[String]>,
        limit: u32,
    ) -> Result<Vec<ChunkMatch>, PromptError>;
}
