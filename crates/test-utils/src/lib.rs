use anyhow::Result;
use async_trait::async_trait;
use rolerag::errors::PromptError;
use rolerag::ingest::{parse_csv, replace_table};
use rolerag::locks::TableLocks;
use rolerag::providers::ai::AiProvider;
use rolerag::providers::db::sqlite::SqliteProvider;
use rolerag::registry::replace_document;
use rolerag::retrieval::{DocumentRetriever, RetrievalError};
use rolerag::types::{DocumentRecord, RagAnswer};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A bcrypt cost low enough to keep tests fast.
pub const TEST_PASSWORD_COST: u32 = 4;

/// Substrings of the default system prompts, for keying mock responses.
pub const CLASSIFICATION_KEY: &str = "query router";
pub const TRANSLATION_KEY: &str = "SQLite SELECT";
pub const SYNTHESIS_KEY: &str = "strict, factual";

// --- Test Setup ---

/// Isolated in-memory application and tabular stores with their schemas.
pub struct TestSetup {
    pub app_store: SqliteProvider,
    pub tabular_store: SqliteProvider,
    pub locks: TableLocks,
}

impl TestSetup {
    /// Creates both stores and seeds the `C-Level` and `general` roles.
    pub async fn new() -> Result<Self> {
        let app_store = SqliteProvider::new(":memory:").await?;
        app_store.initialize_schema().await?;
        let tabular_store = SqliteProvider::new(":memory:").await?;
        tabular_store.initialize_tabular_schema().await?;

        core_access::ensure_role(&app_store.db, core_access::PRIVILEGED_ROLE).await?;
        core_access::ensure_role(&app_store.db, core_access::GENERAL_ROLE).await?;

        Ok(Self {
            app_store,
            tabular_store,
            locks: TableLocks::new(),
        })
    }

    pub async fn add_role(&self, role: &str) -> Result<String> {
        Ok(core_access::ensure_role(&self.app_store.db, role).await?)
    }

    /// Loads `csv` as `table_name` owned by `role`, and records its columns the way an
    /// upload would.
    pub async fn seed_table(&self, table_name: &str, role: &str, csv: &str) -> Result<()> {
        let data = parse_csv(csv.as_bytes())?;
        replace_table(&self.tabular_store.db, &self.locks, table_name, role, &data).await?;
        let record = DocumentRecord {
            id: format!("doc-{table_name}"),
            filename: format!("{table_name}.csv"),
            role: role.to_string(),
            filepath: format!("/tmp/{role}/{table_name}.csv"),
            embedded: false,
            table_name: Some(table_name.to_string()),
            column_headers: data.headers,
            created_at: String::new(),
        };
        replace_document(&self.app_store.db, &record).await?;
        Ok(())
    }

    /// Counts the rows of a tabular-store table.
    pub async fn row_count(&self, table_name: &str) -> Result<i64> {
        let conn = self.tabular_store.db.connect()?;
        let mut rows = conn
            .query(&format!("SELECT COUNT(*) FROM \"{table_name}\""), ())
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| anyhow::anyhow!("COUNT returned no row"))?;
        Ok(row.get(0)?)
    }
}

// --- Mock AI Provider ---

#[derive(Clone, Debug, Default)]
pub struct MockAiProvider {
    responses: Arc<Mutex<Vec<(String, Result<String, String>)>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    delay: Option<Duration>,
}

impl MockAiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-programs a response for a specific prompt.
    /// The key should be a unique substring of the system prompt. The first match wins.
    pub fn add_response(&self, key: &str, response: &str) {
        let mut responses = self.responses.lock().unwrap();
        responses.push((key.to_string(), Ok(response.to_string())));
    }

    /// Pre-programs an API error for a specific prompt.
    pub fn add_error(&self, key: &str, message: &str) {
        let mut responses = self.responses.lock().unwrap();
        responses.push((key.to_string(), Err(message.to_string())));
    }

    /// Makes every call sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Retrieves the recorded calls for assertion.
    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Counts recorded calls whose system prompt contains `key`.
    pub fn calls_matching(&self, key: &str) -> usize {
        self.get_calls()
            .iter()
            .filter(|(system, _)| system.contains(key))
            .count()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, PromptError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let programmed = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(key, _)| system_prompt.contains(key.as_str()))
            .map(|(_, response)| response.clone());

        match programmed {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(PromptError::AiApi(message)),
            None => Err(PromptError::AiApi(format!(
                "MockAiProvider: No response programmed for system prompt. Got: '{system_prompt}'"
            ))),
        }
    }
}

// --- Mock Retriever ---

/// A retriever that returns a fixed answer and records what it was asked.
#[derive(Clone, Debug)]
pub struct MockRetriever {
    answer: Result<RagAnswer, String>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockRetriever {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: Ok(RagAnswer {
                answer: answer.to_string(),
                sources: Vec::new(),
            }),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_sources(mut self, sources: &[&str]) -> Self {
        if let Ok(answer) = &mut self.answer {
            answer.sources = sources.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    /// A retriever whose every call fails.
    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Recorded `(question, role)` pairs.
    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentRetriever for MockRetriever {
    async fn retrieve_and_answer(
        &self,
        question: &str,
        role: &str,
    ) -> Result<RagAnswer, RetrievalError> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), role.to_string()));
        self.answer
            .clone()
            .map_err(|message| RetrievalError::Synthesis(PromptError::AiApi(message)))
    }
}
