//! # Unstructured Retrieval Tests
//!
//! Verifies that retrieval embeds the question, searches only chunks the caller's role
//! may see, and synthesizes one answer with its sources.

mod common;

use crate::common::setup_tracing;
use rolerag::{
    constants::NO_DOCUMENTS_MESSAGE, ingest::DocumentIngestor, DocumentRetriever,
    EmbeddingConfig, EmbeddingRetriever, RetrievalError,
};
use rolerag_test_utils::{MockAiProvider, TestSetup, SYNTHESIS_KEY};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

struct RetrievalFixture {
    setup: TestSetup,
    embedding: EmbeddingConfig,
    _server: MockServer,
    _dir: TempDir,
}

/// Uploads one shared and one finance document, both embedded by a mock endpoint.
async fn fixture() -> RetrievalFixture {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.5, 0.5, 0.1] }]
        })))
        .mount(&server)
        .await;
    let embedding = EmbeddingConfig::new(format!("{}/embed", server.uri()), "mock-embedder");

    let setup = TestSetup::new().await.expect("test setup");
    setup.add_role("finance").await.unwrap();
    let dir = TempDir::new().unwrap();
    let ingestor = DocumentIngestor::new(
        setup.app_store.clone(),
        setup.tabular_store.clone(),
        setup.locks.clone(),
        dir.path(),
        embedding.clone(),
        TIMEOUT,
    )
    .unwrap();
    let shared = ingestor
        .ingest_upload("holidays.md", "general", b"The office closes on public holidays.")
        .await
        .unwrap();
    let restricted = ingestor
        .ingest_upload("forecast.md", "finance", b"Revenue forecast is confidential.")
        .await
        .unwrap();
    assert!(shared.embedded && restricted.embedded);

    RetrievalFixture {
        setup,
        embedding,
        _server: server,
        _dir: dir,
    }
}

fn retriever(fixture: &RetrievalFixture, ai: &MockAiProvider) -> EmbeddingRetriever {
    EmbeddingRetriever::new(
        Arc::new(fixture.setup.app_store.clone()),
        Box::new(ai.clone()),
        fixture.embedding.clone(),
        TIMEOUT,
    )
    .unwrap()
}

/// Tests that the shared role's answer is built only from shared chunks.
#[tokio::test]
async fn test_general_role_only_sees_shared_chunks() {
    setup_tracing();
    // 1. Arrange
    let fixture = fixture().await;
    let ai = MockAiProvider::new();
    ai.add_response(SYNTHESIS_KEY, "The office closes on public holidays.");
    let retriever = retriever(&fixture, &ai);

    // 2. Act
    let answer = retriever
        .retrieve_and_answer("When is the office closed?", "general")
        .await
        .expect("retrieval should succeed");

    // 3. Assert
    assert_eq!(answer.answer, "The office closes on public holidays.");
    assert_eq!(answer.sources, vec!["holidays.md".to_string()]);
    let calls = ai.get_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1.contains("public holidays"));
    assert!(!calls[0].1.contains("Revenue forecast"));
}

/// Tests that placeholder text inside a question is passed through verbatim.
#[tokio::test]
async fn test_question_placeholders_are_not_expanded() {
    setup_tracing();
    // 1. Arrange
    let fixture = fixture().await;
    let ai = MockAiProvider::new();
    ai.add_response(SYNTHESIS_KEY, "It is a template marker.");
    let retriever = retriever(&fixture, &ai);

    // 2. Act
    retriever
        .retrieve_and_answer("What does {context} mean?", "general")
        .await
        .expect("retrieval should succeed");

    // 3. Assert
    let calls = ai.get_calls();
    assert_eq!(calls.len(), 1);
    let user_prompt = &calls[0].1;
    assert!(user_prompt.contains("What does {context} mean?"));
    assert_eq!(user_prompt.matches("The office closes on public holidays.").count(), 1);
}

/// Tests that a custom role sees its own chunks plus shared ones.
#[tokio::test]
async fn test_custom_role_sees_own_and_shared_chunks() {
    setup_tracing();
    // 1. Arrange
    let fixture = fixture().await;
    let ai = MockAiProvider::new();
    ai.add_response(SYNTHESIS_KEY, "Both documents apply.");
    let retriever = retriever(&fixture, &ai);

    // 2. Act
    let answer = retriever
        .retrieve_and_answer("What should I know?", "FINANCE")
        .await
        .unwrap();

    // 3. Assert
    let mut sources = answer.sources.clone();
    sources.sort();
    assert_eq!(sources, vec!["forecast.md", "holidays.md"]);
}

/// Tests that a role with no visible chunks gets the fixed message and no model call.
#[tokio::test]
async fn test_no_visible_chunks_returns_fixed_message() {
    setup_tracing();
    // 1. Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [1.0, 0.0] }]
        })))
        .mount(&server)
        .await;
    let setup = TestSetup::new().await.expect("test setup");
    let ai = MockAiProvider::new();
    let retriever = EmbeddingRetriever::new(
        Arc::new(setup.app_store.clone()),
        Box::new(ai.clone()),
        EmbeddingConfig::new(server.uri(), "mock-embedder"),
        TIMEOUT,
    )
    .unwrap();

    // 2. Act
    let answer = retriever
        .retrieve_and_answer("Anything?", "general")
        .await
        .unwrap();

    // 3. Assert
    assert_eq!(answer.answer, NO_DOCUMENTS_MESSAGE);
    assert!(answer.sources.is_empty());
    assert!(ai.get_calls().is_empty());
}

/// Tests the error paths: missing embedding configuration and a failing synthesis call.
#[tokio::test]
async fn test_retrieval_errors() {
    setup_tracing();
    // 1. Arrange
    let fixture = fixture().await;
    let ai = MockAiProvider::new();
    ai.add_error(SYNTHESIS_KEY, "quota exceeded");
    let unconfigured = EmbeddingRetriever::new(
        Arc::new(fixture.setup.app_store.clone()),
        Box::new(ai.clone()),
        EmbeddingConfig::default(),
        TIMEOUT,
    )
    .unwrap();
    let failing = retriever(&fixture, &ai);

    // 2. Act
    let not_configured = unconfigured.retrieve_and_answer("q", "general").await;
    let synthesis = failing.retrieve_and_answer("q", "general").await;

    // 3. Assert
    assert!(matches!(not_configured, Err(RetrievalError::NotConfigured)));
    assert!(matches!(synthesis, Err(RetrievalError::Synthesis(_))));
}
