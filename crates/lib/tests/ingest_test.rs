//! # Document Upload Tests
//!
//! Exercises the upload pipeline against in-memory stores, a temporary upload
//! directory, and a mock embeddings endpoint.

mod common;

use crate::common::setup_tracing;
use rolerag::{
    allowed_tables,
    ingest::{DocumentIngestor, IngestError},
    registry::find_document,
    EmbeddingConfig,
};
use rolerag_test_utils::TestSetup;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn embedding_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3] }]
        }))
    } else {
        ResponseTemplate::new(status).set_body_string("embedding backend down")
    };
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

fn ingestor(setup: &TestSetup, dir: &TempDir, embedding: EmbeddingConfig) -> DocumentIngestor {
    DocumentIngestor::new(
        setup.app_store.clone(),
        setup.tabular_store.clone(),
        setup.locks.clone(),
        dir.path(),
        embedding,
        TIMEOUT,
    )
    .expect("ingestor should build")
}

fn embedding_config(server: &MockServer) -> EmbeddingConfig {
    EmbeddingConfig::new(format!("{}/v1/embeddings", server.uri()), "mock-embedder")
}

/// Tests that a CSV upload becomes a registered table, a document record, and embedded chunks.
#[tokio::test]
async fn test_csv_upload_creates_table_and_embeds() {
    setup_tracing();
    // 1. Arrange
    let setup = TestSetup::new().await.expect("test setup");
    setup.add_role("finance").await.unwrap();
    let dir = TempDir::new().unwrap();
    let server = embedding_server(200).await;
    let ingestor = ingestor(&setup, &dir, embedding_config(&server));
    let csv = "Employee,Salary,Start Date\nAlice,5000,2020-01-01\nBob,6000.5,2021-03-01\n";

    // 2. Act
    let report = ingestor
        .ingest_upload("Q3 Salaries.csv", "FINANCE", csv.as_bytes())
        .await
        .expect("upload should succeed");

    // 3. Assert
    assert_eq!(report.role, "finance", "Role is stored with its canonical spelling");
    assert_eq!(report.table_name.as_deref(), Some("q3_salaries"));
    assert_eq!(report.rows_ingested, 2);
    assert!(report.embedded);
    assert!(report.chunks >= 1);
    assert!(dir.path().join("finance").join("Q3 Salaries.csv").exists());

    assert_eq!(setup.row_count("q3_salaries").await.unwrap(), 2);
    let finance_tables = allowed_tables(&setup.tabular_store.db, "finance").await.unwrap();
    assert!(finance_tables.contains("q3_salaries"));
    let general_tables = allowed_tables(&setup.tabular_store.db, "general").await.unwrap();
    assert!(!general_tables.contains("q3_salaries"));

    let record = find_document(&setup.app_store.db, "Q3 Salaries.csv", "Finance")
        .await
        .unwrap()
        .expect("document record");
    assert!(record.embedded);
    assert_eq!(record.column_headers, vec!["Employee", "Salary", "Start Date"]);
}

/// Tests that re-uploading the same CSV replaces the table instead of appending to it.
#[tokio::test]
async fn test_reupload_replaces_table_contents() {
    setup_tracing();
    // 1. Arrange
    let setup = TestSetup::new().await.expect("test setup");
    let dir = TempDir::new().unwrap();
    let ingestor = ingestor(&setup, &dir, EmbeddingConfig::default());
    ingestor
        .ingest_upload("policies.csv", "general", b"policy,days\nleave,20\nsick,10\n")
        .await
        .unwrap();

    // 2. Act
    let report = ingestor
        .ingest_upload("policies.csv", "general", b"policy,days\nleave,25\n")
        .await
        .unwrap();

    // 3. Assert
    assert_eq!(report.rows_ingested, 1);
    assert_eq!(setup.row_count("policies").await.unwrap(), 1);
    let documents = ingestor.visible_documents("general").await.unwrap();
    assert_eq!(documents.len(), 1, "The old record is replaced");
    assert_eq!(documents[0].id, report.document_id);
}

/// Tests that an upload without an embeddings endpoint is stored but left pending.
#[tokio::test]
async fn test_markdown_upload_without_embedding_is_pending() {
    setup_tracing();
    // 1. Arrange
    let setup = TestSetup::new().await.expect("test setup");
    let dir = TempDir::new().unwrap();
    let ingestor = ingestor(&setup, &dir, EmbeddingConfig::default());

    // 2. Act
    let report = ingestor
        .ingest_upload("handbook.md", "general", b"# Handbook\n\nBe kind.\n\nShip often.")
        .await
        .unwrap();
    let pending = ingestor.embed_pending().await;

    // 3. Assert
    assert!(!report.embedded);
    assert!(report.table_name.is_none());
    assert_eq!(report.rows_ingested, 0);
    assert!(matches!(pending, Err(IngestError::EmbeddingNotConfigured)));
    let record = ingestor
        .document(&report.document_id)
        .await
        .unwrap()
        .expect("document record");
    assert!(!record.embedded);
}

/// Tests that a failed embedding leaves the document pending until a later batch run.
#[tokio::test]
async fn test_failed_embedding_recovers_with_embed_pending() {
    setup_tracing();
    // 1. Arrange
    let setup = TestSetup::new().await.expect("test setup");
    setup.add_role("HR").await.unwrap();
    let dir = TempDir::new().unwrap();
    let broken = embedding_server(500).await;
    let report = ingestor(&setup, &dir, embedding_config(&broken))
        .ingest_upload("onboarding.md", "hr", b"Welcome aboard.\n\nBadges are issued on day one.")
        .await
        .expect("upload succeeds even when embedding fails");
    assert!(!report.embedded);

    let healthy = embedding_server(200).await;
    let recovering = ingestor(&setup, &dir, embedding_config(&healthy));

    // 2. Act
    let embedded = recovering.embed_pending().await.unwrap();

    // 3. Assert
    assert_eq!(embedded, 1);
    let record = recovering.document(&report.document_id).await.unwrap().unwrap();
    assert!(record.embedded);
    assert_eq!(recovering.embed_pending().await.unwrap(), 0);
}

/// Tests the upload rejections: unknown role, unsupported type, and a header-only CSV.
#[tokio::test]
async fn test_upload_rejections() {
    setup_tracing();
    // 1. Arrange
    let setup = TestSetup::new().await.expect("test setup");
    let dir = TempDir::new().unwrap();
    let ingestor = ingestor(&setup, &dir, EmbeddingConfig::default());

    // 2. Act
    let unknown_role = ingestor
        .ingest_upload("notes.md", "marketing", b"hello")
        .await;
    let unsupported = ingestor
        .ingest_upload("deck.pdf", "general", b"%PDF")
        .await;
    let header_only = ingestor
        .ingest_upload("empty.csv", "general", b"a,b\n")
        .await;

    // 3. Assert
    assert!(matches!(unknown_role, Err(IngestError::UnknownRole(_))));
    assert!(matches!(unsupported, Err(IngestError::UnsupportedFileType(_))));
    assert!(matches!(header_only, Err(IngestError::NoData)));
}

/// Tests that a rejected upload leaves nothing behind on disk or in the stores.
#[tokio::test]
async fn test_rejected_upload_writes_nothing() {
    setup_tracing();
    // 1. Arrange
    let setup = TestSetup::new().await.expect("test setup");
    let dir = TempDir::new().unwrap();
    let ingestor = ingestor(&setup, &dir, EmbeddingConfig::default());

    // 2. Act
    let header_only = ingestor
        .ingest_upload("empty.csv", "general", b"a,b\n")
        .await;
    let not_utf8 = ingestor
        .ingest_upload("notes.md", "general", &[0xff, 0xfe, 0x00, 0x41])
        .await;
    let blank = ingestor
        .ingest_upload("blank.md", "general", b"  \n\n  ")
        .await;

    // 3. Assert
    assert!(matches!(header_only, Err(IngestError::NoData)));
    assert!(matches!(not_utf8, Err(IngestError::InvalidUtf8)));
    assert!(matches!(blank, Err(IngestError::EmptyContent)));
    for filename in ["empty.csv", "notes.md", "blank.md"] {
        assert!(
            !dir.path().join("general").join(filename).exists(),
            "{filename} should not be stored"
        );
        assert!(find_document(&setup.app_store.db, filename, "general")
            .await
            .unwrap()
            .is_none());
    }
    assert!(allowed_tables(&setup.tabular_store.db, "general")
        .await
        .unwrap()
        .is_empty());
}

/// Tests that document listings follow the role visibility rules.
#[tokio::test]
async fn test_visible_documents_follow_role_scope() {
    setup_tracing();
    // 1. Arrange
    let setup = TestSetup::new().await.expect("test setup");
    setup.add_role("finance").await.unwrap();
    let dir = TempDir::new().unwrap();
    let ingestor = ingestor(&setup, &dir, EmbeddingConfig::default());
    ingestor
        .ingest_upload("shared.md", "general", b"Shared notes.")
        .await
        .unwrap();
    ingestor
        .ingest_upload("budget.md", "finance", b"Budget notes.")
        .await
        .unwrap();

    // 2. Act
    let names = |docs: Vec<rolerag::types::DocumentRecord>| {
        let mut names: Vec<String> = docs.into_iter().map(|d| d.filename).collect();
        names.sort();
        names
    };
    let general = names(ingestor.visible_documents("general").await.unwrap());
    let finance = names(ingestor.visible_documents("Finance").await.unwrap());
    let privileged = names(ingestor.visible_documents("C-Level").await.unwrap());

    // 3. Assert
    assert_eq!(general, vec!["shared.md"]);
    assert_eq!(finance, vec!["budget.md", "shared.md"]);
    assert_eq!(privileged, vec!["budget.md", "shared.md"]);
}
