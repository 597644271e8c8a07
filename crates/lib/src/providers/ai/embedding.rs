//! # Embeddings Provider
//!
//! Generates vector embeddings by calling an external embeddings API. Gemini and
//! OpenAI-compatible endpoints are both supported; the payload shape is chosen from the URL.

use crate::errors::PromptError;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where and how to compute embeddings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub model_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl EmbeddingConfig {
    pub fn new(api_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            model_name: model_name.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_url.trim().is_empty() && !self.model_name.trim().is_empty()
    }
}

// --- OpenAI-compatible request and response structures ---

#[derive(Serialize, Debug)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

// --- Gemini-specific request and response structures ---

#[derive(Serialize, Debug)]
struct GeminiEmbeddingRequest<'a> {
    model: String,
    content: GeminiEmbeddingContent<'a>,
}

#[derive(Serialize, Debug)]
struct GeminiEmbeddingContent<'a> {
    parts: Vec<GeminiEmbeddingPart<'a>>,
}

#[derive(Serialize, Debug)]
struct GeminiEmbeddingPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingValue,
}

#[derive(Deserialize, Debug)]
struct GeminiEmbeddingValue {
    values: Vec<f32>,
}

/// Generates a vector embedding for `input` with the given endpoint configuration.
///
/// The caller supplies the HTTP client so that its timeout applies to embedding calls too.
pub async fn generate_embedding(
    client: &ReqwestClient,
    config: &EmbeddingConfig,
    input: &str,
) -> Result<Vec<f32>, PromptError> {
    let mut request_builder = client.post(&config.api_url);
    let is_gemini = config.api_url.contains("generativelanguage.googleapis.com");

    // --- 1. Construct the appropriate request body and apply auth ---
    if is_gemini {
        // Gemini requires the model name to be prefixed with "models/" in the payload.
        let gemini_model_name = if config.model_name.starts_with("models/") {
            config.model_name.clone()
        } else {
            format!("models/{}", config.model_name)
        };

        let request_body = GeminiEmbeddingRequest {
            model: gemini_model_name,
            content: GeminiEmbeddingContent {
                parts: vec![GeminiEmbeddingPart { text: input }],
            },
        };
        debug!(model = %request_body.model, "--> Sending request to Gemini Embeddings API");
        request_builder = request_builder.json(&request_body);
        if let Some(key) = &config.api_key {
            request_builder = request_builder.header("x-goog-api-key", key);
        }
    } else {
        let request_body = OpenAIEmbeddingRequest {
            model: &config.model_name,
            input,
        };
        debug!(model = %config.model_name, "--> Sending request to OpenAI-compatible Embeddings API");
        request_builder = request_builder.json(&request_body);
        if let Some(key) = &config.api_key {
            request_builder = request_builder.bearer_auth(key);
        }
    }

    // --- 2. Send the request and handle the response ---
    let response = request_builder
        .send()
        .await
        .map_err(PromptError::AiRequest)?;

    if !response.status().is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(PromptError::AiApi(error_text));
    }

    let vector = if is_gemini {
        let gemini_response: GeminiEmbeddingResponse = response
            .json()
            .await
            .map_err(PromptError::AiDeserialization)?;
        gemini_response.embedding.values
    } else {
        let openai_response: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(PromptError::AiDeserialization)?;

        openai_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                PromptError::AiApi("OpenAI-compatible API returned no embeddings".to_string())
            })?
    };

    if vector.is_empty() {
        return Err(PromptError::AiApi("Embedding API returned an empty vector".to_string()));
    }
    Ok(vector)
}

/// Encodes an embedding as little-endian `f32` bytes for BLOB storage.
pub fn embedding_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Renders an embedding as a `vector32('[..]')` literal for turso's vector functions.
pub fn vector_literal(vector: &[f32]) -> String {
    format!(
        "vector32('[{}]')",
        vector
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}
