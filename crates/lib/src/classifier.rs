//! # Query-Type Classification
//!
//! Labels a question as structured (answerable from tables) or unstructured
//! (answerable from documents) with one model call. Anything the model says that is
//! not clearly "structured" is treated as unstructured.

use crate::{
    constants::DEFAULT_AI_TIMEOUT_SECS,
    errors::PromptError,
    prompts::{
        fill_template,
        tasks::{QUERY_CLASSIFICATION_SYSTEM_PROMPT, QUERY_CLASSIFICATION_USER_PROMPT},
    },
    providers::ai::AiProvider,
    types::QueryLabel,
};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Query classification failed: {0}")]
    Provider(#[from] PromptError),
    #[error("Query classification timed out after {0:?}")]
    Timeout(Duration),
}

const STRUCTURED_WORDS: &[&str] = &["structured", "sql", "tabular"];
const UNSTRUCTURED_WORDS: &[&str] = &["unstructured", "rag", "document", "documents"];

/// Maps free model text onto a label. Ambiguous or unrecognized text is unstructured.
pub fn normalize_label(raw: &str) -> QueryLabel {
    let lowered = raw.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let structured = words.iter().any(|w| STRUCTURED_WORDS.contains(w));
    let unstructured = words.iter().any(|w| UNSTRUCTURED_WORDS.contains(w));

    if structured && !unstructured {
        QueryLabel::Structured
    } else {
        QueryLabel::Unstructured
    }
}

#[derive(Debug, Clone)]
pub struct QueryClassifier {
    ai_provider: Box<dyn AiProvider>,
    system_prompt: String,
    user_prompt: String,
    timeout: Duration,
}

impl QueryClassifier {
    pub fn new(ai_provider: Box<dyn AiProvider>) -> Self {
        Self {
            ai_provider,
            system_prompt: QUERY_CLASSIFICATION_SYSTEM_PROMPT.to_string(),
            user_prompt: QUERY_CLASSIFICATION_USER_PROMPT.to_string(),
            timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECS),
        }
    }

    /// Replaces the prompt templates. The user template may use `{prompt}`.
    pub fn with_prompts(mut self, system_prompt: String, user_prompt: String) -> Self {
        self.system_prompt = system_prompt;
        self.user_prompt = user_prompt;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn classify(&self, question: &str) -> Result<QueryLabel, ClassificationError> {
        let user_prompt = fill_template(&self.user_prompt, &[("prompt", question)]);
        let raw_response = tokio::time::timeout(
            self.timeout,
            self.ai_provider.generate(&self.system_prompt, &user_prompt),
        )
        .await
        .map_err(|_| ClassificationError::Timeout(self.timeout))??;

        let label = normalize_label(&raw_response);
        info!(raw = %raw_response.trim(), label = label.as_str(), "Classified question.");
        Ok(label)
    }
}
