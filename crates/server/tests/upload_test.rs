//! # Upload Endpoint Tests
//!
//! Covers upload permissions, CSV table registration, document visibility, and
//! re-embedding of pending documents.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{TestApp, ADMIN};
use httpmock::Method;
use serde_json::Value;

const SALARIES_CSV: &[u8] = b"employee,salary\nAlice,5000\nBob,6000\n";

fn string_list(body: &Value, key: &str) -> Vec<String> {
    let mut values: Vec<String> = body[key]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    values.sort();
    values
}

#[tokio::test]
async fn test_admin_uploads_csv_for_another_role() -> Result<()> {
    // --- 1. Arrange ---
    let app = TestApp::spawn().await?;
    let embeddings = app.mock_embeddings();
    app.seed_user("fiona", "ledger", "finance").await?;
    app.seed_user("gus", "shared", "general").await?;

    // --- 2. Act ---
    let response = app
        .upload(ADMIN, "finance_salaries.csv", Some("finance"), SALARIES_CSV)
        .await?;

    // --- 3. Assert ---
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["table_name"], "finance_salaries");
    assert_eq!(body["rows_ingested"], 2);
    assert_eq!(body["role"], "finance");
    assert_eq!(body["embedded"], true);
    assert!(embeddings.hits() >= 1);
    assert!(app
        .upload_dir
        .join("finance")
        .join("finance_salaries.csv")
        .exists());

    let finance_tables: Value = app.get(("fiona", "ledger"), "/tables").await?.json().await?;
    assert_eq!(string_list(&finance_tables, "tables"), vec!["finance_salaries"]);
    let general_tables: Value = app.get(("gus", "shared"), "/tables").await?.json().await?;
    assert!(string_list(&general_tables, "tables").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_users_upload_only_for_their_own_role() -> Result<()> {
    // --- 1. Arrange ---
    let app = TestApp::spawn().await?;
    app.mock_embeddings();
    app.seed_user("dana", "s3cret", "HR").await?;
    core_access::ensure_role(&app.app_state.app_store.db, "finance").await?;

    // --- 2. Act ---
    let foreign = app
        .upload(("dana", "s3cret"), "budget.md", Some("finance"), b"Budget")
        .await?;
    let own = app
        .upload(("dana", "s3cret"), "onboarding.md", None, b"Welcome to HR.")
        .await?;

    // --- 3. Assert ---
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
    assert_eq!(own.status(), StatusCode::OK);
    let body: Value = own.json().await?;
    assert_eq!(body["role"], "HR");
    assert!(body.get("table_name").is_none() || body["table_name"].is_null());
    Ok(())
}

#[tokio::test]
async fn test_invalid_uploads_are_bad_requests() -> Result<()> {
    // --- 1. Arrange ---
    let app = TestApp::spawn().await?;

    // --- 2. Act ---
    let wrong_type = app
        .upload(ADMIN, "deck.pdf", Some("general"), b"%PDF-1.4")
        .await?;
    let unknown_role = app
        .upload(ADMIN, "notes.md", Some("marketing"), b"notes")
        .await?;
    let missing_file = app
        .client
        .post(app.url("/upload-docs"))
        .basic_auth(ADMIN.0, Some(ADMIN.1))
        .multipart(reqwest::multipart::Form::new().text("role", "general"))
        .send()
        .await?;

    // --- 3. Assert ---
    assert_eq!(wrong_type.status(), StatusCode::BAD_REQUEST);
    assert_eq!(unknown_role.status(), StatusCode::BAD_REQUEST);
    assert_eq!(missing_file.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_document_listing_follows_role_visibility() -> Result<()> {
    // --- 1. Arrange ---
    let app = TestApp::spawn().await?;
    app.mock_embeddings();
    app.seed_user("dana", "s3cret", "HR").await?;
    app.seed_user("gus", "shared", "general").await?;
    app.upload(ADMIN, "handbook.md", Some("general"), b"Shared handbook.")
        .await?;
    app.upload(ADMIN, "reviews.md", Some("HR"), b"Review cycle notes.")
        .await?;
    app.upload(ADMIN, "strategy.md", Some("C-Level"), b"Board strategy.")
        .await?;

    // --- 2. Act ---
    let general: Value = app.get(("gus", "shared"), "/documents").await?.json().await?;
    let hr: Value = app.get(("dana", "s3cret"), "/documents").await?.json().await?;
    let admin: Value = app.get(ADMIN, "/documents").await?.json().await?;

    // --- 3. Assert ---
    let filenames = |body: &Value| {
        let mut names: Vec<String> = body["documents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["filename"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        names
    };
    assert_eq!(filenames(&general), vec!["handbook.md"]);
    assert_eq!(filenames(&hr), vec!["handbook.md", "reviews.md"]);
    assert_eq!(
        filenames(&admin),
        vec!["handbook.md", "reviews.md", "strategy.md"]
    );
    Ok(())
}

#[tokio::test]
async fn test_reindex_embeds_pending_documents() -> Result<()> {
    // --- 1. Arrange ---
    let app = TestApp::spawn().await?;
    let mut outage = app.mock_server.mock(|when, then| {
        when.method(Method::POST).path("/v1/embeddings");
        then.status(503).body("embedding service unavailable");
    });
    let upload: Value = app
        .upload(ADMIN, "policy.md", Some("general"), b"Remote work is allowed.")
        .await?
        .json()
        .await?;
    assert_eq!(upload["embedded"], false);
    outage.delete();
    app.mock_embeddings();

    // --- 2. Act ---
    let response = app
        .client
        .post(app.url("/documents/reindex"))
        .basic_auth(ADMIN.0, Some(ADMIN.1))
        .send()
        .await?;

    // --- 3. Assert ---
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["embedded"], 1);
    let documents: Value = app.get(ADMIN, "/documents").await?.json().await?;
    assert_eq!(documents["documents"][0]["embedded"], true);
    Ok(())
}

#[tokio::test]
async fn test_reindex_without_embedding_model_is_rejected() -> Result<()> {
    // --- 1. Arrange ---
    let app = TestApp::spawn_with_embedding(false).await?;

    // --- 2. Act ---
    let response = app
        .client
        .post(app.url("/documents/reindex"))
        .basic_auth(ADMIN.0, Some(ADMIN.1))
        .send()
        .await?;

    // --- 3. Assert ---
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
