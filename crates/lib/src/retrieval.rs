//! # Unstructured Retrieval
//!
//! Answers a question from the caller's visible documents: embed the question, find
//! the nearest chunks the role may see, and ask the model to answer from them.

use crate::{
    access::visible_roles,
    constants::{DEFAULT_AI_TIMEOUT_SECS, DEFAULT_RETRIEVAL_LIMIT, NO_DOCUMENTS_MESSAGE},
    errors::PromptError,
    prompts::{
        fill_template,
        tasks::{RAG_SYNTHESIS_SYSTEM_PROMPT, RAG_SYNTHESIS_USER_PROMPT},
    },
    providers::{
        ai::{generate_embedding, AiProvider},
        db::storage::VectorSearch,
    },
    types::RagAnswer,
};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::{fmt::Debug, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};

pub use crate::providers::ai::embedding::EmbeddingConfig;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding the question failed: {0}")]
    Embedding(PromptError),
    #[error("Vector search failed: {0}")]
    Search(PromptError),
    #[error("Answer synthesis failed: {0}")]
    Synthesis(PromptError),
    #[error("Answer synthesis timed out after {0:?}")]
    Timeout(Duration),
    #[error("Embedding service is not configured")]
    NotConfigured,
}

/// The unstructured path as seen by the orchestrator.
///
/// Implementations must apply the role filter themselves.
#[async_trait]
pub trait DocumentRetriever: Send + Sync + Debug {
    async fn retrieve_and_answer(
        &self,
        question: &str,
        role: &str,
    ) -> Result<RagAnswer, RetrievalError>;
}

/// Embedding similarity search followed by one synthesis call.
#[derive(Debug, Clone)]
pub struct EmbeddingRetriever {
    search: Arc<dyn VectorSearch>,
    ai_provider: Box<dyn AiProvider>,
    embedding: EmbeddingConfig,
    http: ReqwestClient,
    system_prompt: String,
    user_prompt: String,
    limit: u32,
    timeout: Duration,
}

impl EmbeddingRetriever {
    pub fn new(
        search: Arc<dyn VectorSearch>,
        ai_provider: Box<dyn AiProvider>,
        embedding: EmbeddingConfig,
        timeout: Duration,
    ) -> Result<Self, PromptError> {
        let http = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(PromptError::ReqwestClientBuild)?;
        Ok(Self {
            search,
            ai_provider,
            embedding,
            http,
            system_prompt: RAG_SYNTHESIS_SYSTEM_PROMPT.to_string(),
            user_prompt: RAG_SYNTHESIS_USER_PROMPT.to_string(),
            limit: DEFAULT_RETRIEVAL_LIMIT,
            timeout,
        })
    }

    /// Replaces the synthesis prompts. The user template may use `{prompt}` and `{context}`.
    pub fn with_prompts(mut self, system_prompt: String, user_prompt: String) -> Self {
        self.system_prompt = system_prompt;
        self.user_prompt = user_prompt;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }
}

#[async_trait]
impl DocumentRetriever for EmbeddingRetriever {
    async fn retrieve_and_answer(
        &self,
        question: &str,
        role: &str,
    ) -> Result<RagAnswer, RetrievalError> {
        if !self.embedding.is_configured() {
            return Err(RetrievalError::NotConfigured);
        }

        let query_vector = generate_embedding(&self.http, &self.embedding, question)
            .await
            .map_err(RetrievalError::Embedding)?;

        let scope = visible_roles(role);
        let matches = self
            .search
            .vector_search(&query_vector, scope.as_filter(), self.limit)
            .await
            .map_err(RetrievalError::Search)?;

        if matches.is_empty() {
            info!(role = %role, "No visible chunks for question.");
            return Ok(RagAnswer {
                answer: NO_DOCUMENTS_MESSAGE.to_string(),
                sources: Vec::new(),
            });
        }

        let mut sources: Vec<String> = Vec::new();
        for chunk in &matches {
            if !sources.contains(&chunk.filename) {
                sources.push(chunk.filename.clone());
            }
        }
        let context = matches
            .iter()
            .map(|chunk| format!("## {}\n{}", chunk.filename, chunk.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let user_prompt = fill_template(
            &self.user_prompt,
            &[("prompt", question), ("context", &context)],
        );
        debug!(chunks = matches.len(), "--> Sending synthesis prompt to AI provider");

        let answer = tokio::time::timeout(
            self.timeout,
            self.ai_provider.generate(&self.system_prompt, &user_prompt),
        )
        .await
        .map_err(|_| RetrievalError::Timeout(self.timeout))?
        .map_err(RetrievalError::Synthesis)?;

        Ok(RagAnswer {
            answer: answer.trim().to_string(),
            sources,
        })
    }
}
