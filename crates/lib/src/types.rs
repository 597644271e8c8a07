//! # Shared Types
//!
//! Data structures passed between the routing core, the providers, and the server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The tabular result of a query: column names plus rows of JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The label the classifier assigns to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryLabel {
    Structured,
    Unstructured,
}

impl QueryLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryLabel::Structured => "structured",
            QueryLabel::Unstructured => "unstructured",
        }
    }
}

/// The path that produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatMode {
    #[serde(rename = "structured")]
    Structured,
    #[serde(rename = "unstructured")]
    Unstructured,
    #[serde(rename = "structured→fallback")]
    StructuredFallback,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Structured => "structured",
            ChatMode::Unstructured => "unstructured",
            ChatMode::StructuredFallback => "structured→fallback",
        }
    }
}

/// The authenticated caller of a chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub username: String,
    pub role: String,
}

impl UserContext {
    pub fn new(username: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: role.into(),
        }
    }
}

/// The answer envelope returned to the caller of `/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub user: String,
    pub role: String,
    pub mode: ChatMode,
    pub fallback: bool,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// What the unstructured path returns: the synthesized answer and the files it drew on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// A row of the `documents` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub role: String,
    pub filepath: String,
    pub embedded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub column_headers: Vec<String>,
    pub created_at: String,
}

/// A row of the `tables_metadata` registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRegistration {
    pub table_name: String,
    pub role: String,
}

/// Summary of a single upload, returned by the ingestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub document_id: String,
    pub filename: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub rows_ingested: usize,
    pub chunks: usize,
    pub embedded: bool,
}
