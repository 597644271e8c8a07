//! # Natural Language to SQL
//!
//! Turns a question plus a description of the allowed tables into a SQL string with
//! one model call. The output is untrusted: callers must pass it through
//! [`crate::sql_guard::validate`] before running it.

use crate::{
    constants::DEFAULT_AI_TIMEOUT_SECS,
    errors::PromptError,
    prompts::{
        fill_template,
        tasks::{SQL_TRANSLATION_SYSTEM_PROMPT, SQL_TRANSLATION_USER_PROMPT},
    },
    providers::ai::AiProvider,
};
use regex::Regex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("SQL translation failed: {0}")]
    Provider(#[from] PromptError),
    #[error("SQL translation timed out after {0:?}")]
    Timeout(Duration),
}

/// One table as presented to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<String>,
}

/// Renders the allowed tables as one line per table: `- name (col1, col2)`.
pub fn describe_schema(tables: &[TableDescription]) -> String {
    if tables.is_empty() {
        return "(no tables available)".to_string();
    }
    tables
        .iter()
        .map(|table| {
            if table.columns.is_empty() {
                format!("- {}", table.name)
            } else {
                let columns = table
                    .columns
                    .iter()
                    .map(|c| format!("\"{c}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {} ({columns})", table.name)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracts the query from a model response, removing a markdown code fence if present.
pub fn extract_sql(raw_response: &str) -> Result<String, PromptError> {
    let re = Regex::new(r"```(?:sql|sqlite|query)?\s*\n?([\s\S]*?)```")?;
    Ok(re
        .captures(raw_response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| raw_response.trim().to_string()))
}

/// Translates questions into SQL with a configurable provider and prompts.
#[derive(Debug, Clone)]
pub struct SqlTranslator {
    ai_provider: Box<dyn AiProvider>,
    system_prompt: String,
    user_prompt: String,
    timeout: Duration,
}

impl SqlTranslator {
    pub fn new(ai_provider: Box<dyn AiProvider>) -> Self {
        Self {
            ai_provider,
            system_prompt: SQL_TRANSLATION_SYSTEM_PROMPT.to_string(),
            user_prompt: SQL_TRANSLATION_USER_PROMPT.to_string(),
            timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECS),
        }
    }

    /// Replaces the prompt templates. The user template may use `{schema}` and `{prompt}`.
    pub fn with_prompts(mut self, system_prompt: String, user_prompt: String) -> Self {
        self.system_prompt = system_prompt;
        self.user_prompt = user_prompt;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Asks the model for a query answering `question` over `schema_description`.
    pub async fn translate(
        &self,
        question: &str,
        schema_description: &str,
    ) -> Result<String, TranslationError> {
        let user_prompt = fill_template(
            &self.user_prompt,
            &[("schema", schema_description), ("prompt", question)],
        );

        debug!(user_prompt = %user_prompt, "--> Sending translation prompt to AI provider");
        let raw_response = tokio::time::timeout(
            self.timeout,
            self.ai_provider.generate(&self.system_prompt, &user_prompt),
        )
        .await
        .map_err(|_| TranslationError::Timeout(self.timeout))??;

        let sql = extract_sql(&raw_response)?;
        info!(sql = %sql, "<-- SQL from AI provider");
        Ok(sql)
    }
}
