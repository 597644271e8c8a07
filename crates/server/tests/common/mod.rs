//! # Common Test Utilities
//!
//! `TestApp` spawns a real server on a random port with temporary databases and
//! upload directory, and points every model and embedding call at an
//! `httpmock::MockServer`.

#![allow(unused)]

use anyhow::Result;
use axum::serve;
use httpmock::{Method, Mock, MockServer};
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use rolerag_server::{
    config, router,
    state::{build_app_state, AppState},
};
use rolerag_test_utils::{CLASSIFICATION_KEY, SYNTHESIS_KEY, TEST_PASSWORD_COST, TRANSLATION_KEY};
use serde_json::json;
use std::{fs, net::SocketAddr, path::PathBuf};
use tempfile::{tempdir, TempDir};
use tokio::{net::TcpListener, task::JoinHandle};

pub const ADMIN: (&str, &str) = ("admin", "admin123");

/// A harness for end-to-end testing of the Axum server.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub mock_server: MockServer,
    pub app_state: AppState,
    pub upload_dir: PathBuf,
    _temp_dir: TempDir,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestApp {
    /// Spawns the server with an embedding endpoint on the mock server.
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with_embedding(true).await
    }

    /// Spawns the server, optionally without any embedding model.
    pub async fn spawn_with_embedding(embedding: bool) -> Result<Self> {
        dotenvy::dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();

        let mock_server = MockServer::start();
        let temp_dir = tempdir()?;
        let upload_dir = temp_dir.path().join("uploads");
        let embedding_url = if embedding {
            mock_server.url("/v1/embeddings")
        } else {
            String::new()
        };

        let config_path = temp_dir.path().join("config.yml");
        let config_content = format!(
            r#"
port: 0
db_url: "{}"
structured_db_url: "{}"
upload_dir: "{}"
ai_timeout_secs: 5
password_cost: {TEST_PASSWORD_COST}
admin:
  username: "{}"
  password: "{}"
embedding:
  api_url: "{embedding_url}"
  model_name: "mock-embedding-model"
providers:
  default:
    provider: "local"
    api_url: "{}"
    api_key: null
    model_name: "mock-chat-model"
"#,
            temp_dir.path().join("app.db").display(),
            temp_dir.path().join("tables.db").display(),
            upload_dir.display(),
            ADMIN.0,
            ADMIN.1,
            mock_server.url("/v1/chat/completions"),
        );
        fs::write(&config_path, config_content)?;

        let config = config::get_config(config_path.to_str())?;
        let app_state = build_app_state(config).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let router_state = app_state.clone();
        let server_handle = tokio::spawn(async move {
            let app = router::create_router(router_state);
            let server = serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Ok(Self {
            address,
            client: Client::new(),
            mock_server,
            app_state,
            upload_dir,
            _temp_dir: temp_dir,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    /// Creates a role and a user directly in the application store.
    pub async fn seed_user(&self, username: &str, password: &str, role: &str) -> Result<()> {
        let db = &self.app_state.app_store.db;
        core_access::ensure_role(db, role).await?;
        core_access::create_user(db, username, password, role, TEST_PASSWORD_COST).await?;
        Ok(())
    }

    /// Answers chat completions whose body contains `key` with `content`.
    pub fn mock_chat(&self, key: &str, content: &str) -> Mock<'_> {
        self.mock_server.mock(|when, then| {
            when.method(Method::POST)
                .path("/v1/chat/completions")
                .body_contains(key);
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            }));
        })
    }

    pub fn mock_classification(&self, label: &str) -> Mock<'_> {
        self.mock_chat(CLASSIFICATION_KEY, label)
    }

    pub fn mock_translation(&self, sql: &str) -> Mock<'_> {
        self.mock_chat(TRANSLATION_KEY, sql)
    }

    pub fn mock_synthesis(&self, answer: &str) -> Mock<'_> {
        self.mock_chat(SYNTHESIS_KEY, answer)
    }

    /// Answers every embedding request with the same vector.
    pub fn mock_embeddings(&self) -> Mock<'_> {
        self.mock_server.mock(|when, then| {
            when.method(Method::POST).path("/v1/embeddings");
            then.status(200)
                .json_body(json!({ "data": [{ "embedding": [0.3, 0.4, 0.5] }] }));
        })
    }

    /// Posts a multipart upload as `credentials`.
    pub async fn upload(
        &self,
        credentials: (&str, &str),
        filename: &str,
        role: Option<&str>,
        data: &[u8],
    ) -> Result<Response> {
        let mut form = Form::new().part(
            "file",
            Part::bytes(data.to_vec()).file_name(filename.to_string()),
        );
        if let Some(role) = role {
            form = form.text("role", role.to_string());
        }
        Ok(self
            .client
            .post(self.url("/upload-docs"))
            .basic_auth(credentials.0, Some(credentials.1))
            .multipart(form)
            .send()
            .await?)
    }

    /// Posts a chat question as `credentials`.
    pub async fn chat(&self, credentials: (&str, &str), question: &str) -> Result<Response> {
        Ok(self
            .client
            .post(self.url("/chat"))
            .basic_auth(credentials.0, Some(credentials.1))
            .json(&json!({ "question": question }))
            .send()
            .await?)
    }

    pub async fn get(&self, credentials: (&str, &str), path: &str) -> Result<Response> {
        Ok(self
            .client
            .get(self.url(path))
            .basic_auth(credentials.0, Some(credentials.1))
            .send()
            .await?)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
