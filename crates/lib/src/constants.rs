//! # Shared Constants
//!
//! Default locations and user-facing messages shared by the library and the server.

/// The default path for the application database (users, roles, documents, chunks).
pub const DEFAULT_DB_FILE: &str = "db/rolerag.db";

/// The default path for the tabular database that holds ingested CSV tables.
pub const DEFAULT_STRUCTURED_DB_FILE: &str = "db/structured_queries.db";

/// The default root directory for uploaded files. Each role gets a subdirectory.
pub const DEFAULT_UPLOAD_DIR: &str = "static/uploads";

/// The registry table inside the tabular database. Never a valid upload target.
pub const TABLES_METADATA: &str = "tables_metadata";

/// Answer returned when a structured query succeeds without matching rows.
pub const NO_RESULTS_MESSAGE: &str = "Query executed, but no results found.";

/// Answer returned when the caller's role has no embedded documents to search.
pub const NO_DOCUMENTS_MESSAGE: &str = "No documents found for your role.";

/// Default number of chunks handed to the answer-synthesis call.
pub const DEFAULT_RETRIEVAL_LIMIT: u32 = 5;

/// Default bound on a single model call, in seconds.
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;
