//! # Ingestion Logic
//!
//! Turns uploaded files into queryable data: CSVs become tables in the tabular store,
//! and both CSVs and Markdown become embedded chunks for the unstructured path.

pub mod documents;
pub mod tabular;
pub mod text;

pub use documents::{DocumentIngestor, DocumentKind};
pub use tabular::{csv_to_text, derive_table_name, parse_csv, replace_table, CsvData};
pub use text::chunk_text;

use crate::{errors::PromptError, registry::RegistryError};
use core_access::AccessError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported file type: '{0}'. Only .csv and .md files are accepted")]
    UnsupportedFileType(String),
    #[error("Invalid filename: '{0}'")]
    InvalidFilename(String),
    #[error("Cannot derive a table name from '{0}'")]
    InvalidTableName(String),
    #[error("Role '{0}' does not exist")]
    UnknownRole(String),
    #[error("Text content is empty or only whitespace")]
    EmptyContent,
    #[error("The CSV has no data to ingest")]
    NoData,
    #[error("File is not valid UTF-8")]
    InvalidUtf8,
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] turso::Error),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Access error: {0}")]
    Access(#[from] AccessError),
    #[error("Embedding failed: {0}")]
    Embedding(#[from] PromptError),
    #[error("Embedding service is not configured")]
    EmbeddingNotConfigured,
}
