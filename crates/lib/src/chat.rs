//! # Chat Orchestration
//!
//! Routes a question to the structured or unstructured path and builds the answer
//! envelope. A structured attempt that fails for any reason is retried once on the
//! unstructured path; the unstructured path has no further fallback.

use crate::{
    access::allowed_tables,
    classifier::{ClassificationError, QueryClassifier},
    errors::PromptError,
    executor::{AccessDenied, ExecutionError, StructuredExecutor, StructuredOutcome},
    providers::db::sqlite::SqliteProvider,
    registry::{table_columns, RegistryError},
    retrieval::{DocumentRetriever, RetrievalError},
    sql_guard::{validate, UnsafeStatement, ValidatedSql},
    translator::{describe_schema, SqlTranslator, TableDescription, TranslationError},
    types::{ChatMode, ChatResponse, QueryLabel, UserContext},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Why a structured attempt gave way to the unstructured path.
#[derive(Error, Debug)]
pub enum StructuredFailure {
    #[error("Table lookup failed: {0}")]
    Lookup(#[from] RegistryError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error("Unsafe statement: {0}")]
    Unsafe(#[from] UnsafeStatement),
    #[error(transparent)]
    Denied(AccessDenied),
    #[error(transparent)]
    Execution(ExecutionError),
    #[error("Structured path produced an empty answer")]
    EmptyAnswer,
}

/// Errors that end a chat request.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Question must not be empty")]
    EmptyQuestion,
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// A successful structured answer together with the statement that produced it.
#[derive(Debug)]
struct StructuredAnswer {
    answer: String,
    sql: ValidatedSql,
}

#[derive(Debug, Clone)]
pub struct ChatOrchestrator {
    classifier: QueryClassifier,
    translator: SqlTranslator,
    executor: StructuredExecutor,
    retriever: Arc<dyn DocumentRetriever>,
    app_store: SqliteProvider,
    tabular_store: SqliteProvider,
}

impl ChatOrchestrator {
    pub fn builder() -> ChatOrchestratorBuilder {
        ChatOrchestratorBuilder::default()
    }

    /// Answers `question` on behalf of `user`.
    pub async fn chat(
        &self,
        user: &UserContext,
        question: &str,
    ) -> Result<ChatResponse, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let label = self.classifier.classify(question).await?;

        if label == QueryLabel::Structured {
            match self.structured_attempt(question, &user.role).await {
                Ok(structured) => {
                    return Ok(ChatResponse {
                        user: user.username.clone(),
                        role: user.role.clone(),
                        mode: ChatMode::Structured,
                        fallback: false,
                        answer: structured.answer,
                        sql: Some(structured.sql.into_inner()),
                        sources: Vec::new(),
                    });
                }
                Err(failure) => {
                    warn!(user = %user.username, role = %user.role, reason = %failure, "Structured path failed; falling back.");
                }
            }
        }

        let rag = self
            .retriever
            .retrieve_and_answer(question, &user.role)
            .await?;
        let (mode, fallback) = match label {
            QueryLabel::Structured => (ChatMode::StructuredFallback, true),
            QueryLabel::Unstructured => (ChatMode::Unstructured, false),
        };
        info!(user = %user.username, mode = mode.as_str(), "Answered question.");

        Ok(ChatResponse {
            user: user.username.clone(),
            role: user.role.clone(),
            mode,
            fallback,
            answer: rag.answer,
            sql: None,
            sources: rag.sources,
        })
    }

    /// Allowed tables, schema, translation, validation, execution.
    async fn structured_attempt(
        &self,
        question: &str,
        role: &str,
    ) -> Result<StructuredAnswer, StructuredFailure> {
        let allowed = allowed_tables(&self.tabular_store.db, role).await?;
        let descriptions: Vec<TableDescription> = table_columns(&self.app_store.db, &allowed)
            .await?
            .into_iter()
            .map(|(name, columns)| TableDescription { name, columns })
            .collect();

        let raw_sql = self
            .translator
            .translate(question, &describe_schema(&descriptions))
            .await?;
        let sql = validate(&raw_sql)?;

        let answer = match self.executor.execute(&sql, &allowed).await {
            StructuredOutcome::Denied(denied) => return Err(StructuredFailure::Denied(denied)),
            StructuredOutcome::Failed(error) => return Err(StructuredFailure::Execution(error)),
            outcome => outcome.answer(),
        };
        if answer.trim().is_empty() {
            return Err(StructuredFailure::EmptyAnswer);
        }

        Ok(StructuredAnswer { answer, sql })
    }
}

/// A builder for [`ChatOrchestrator`]. Every component is required.
#[derive(Default)]
pub struct ChatOrchestratorBuilder {
    classifier: Option<QueryClassifier>,
    translator: Option<SqlTranslator>,
    executor: Option<StructuredExecutor>,
    retriever: Option<Arc<dyn DocumentRetriever>>,
    app_store: Option<SqliteProvider>,
    tabular_store: Option<SqliteProvider>,
}

impl ChatOrchestratorBuilder {
    pub fn classifier(mut self, classifier: QueryClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn translator(mut self, translator: SqlTranslator) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn executor(mut self, executor: StructuredExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn DocumentRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// The application store, source of table column metadata.
    pub fn app_store(mut self, store: SqliteProvider) -> Self {
        self.app_store = Some(store);
        self
    }

    /// The tabular store, source of table registrations.
    pub fn tabular_store(mut self, store: SqliteProvider) -> Self {
        self.tabular_store = Some(store);
        self
    }

    pub fn build(self) -> Result<ChatOrchestrator, PromptError> {
        fn missing(component: &str) -> PromptError {
            PromptError::MissingAiProvider(format!("ChatOrchestrator requires a {component}"))
        }
        Ok(ChatOrchestrator {
            classifier: self.classifier.ok_or_else(|| missing("classifier"))?,
            translator: self.translator.ok_or_else(|| missing("translator"))?,
            executor: self.executor.ok_or_else(|| missing("executor"))?,
            retriever: self.retriever.ok_or_else(|| missing("retriever"))?,
            app_store: self.app_store.ok_or_else(|| missing("application store"))?,
            tabular_store: self.tabular_store.ok_or_else(|| missing("tabular store"))?,
        })
    }
}
