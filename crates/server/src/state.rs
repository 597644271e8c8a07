//! # Application State
//!
//! This module defines the shared application state (`AppState`) and the logic
//! for building it at startup. The `AppState` holds the configuration, both
//! stores, the instantiated AI providers, and the chat and ingestion services
//! built from them.

use crate::config::{
    AppConfig, QUERY_CLASSIFICATION_TASK, RAG_SYNTHESIS_TASK, SQL_TRANSLATION_TASK,
};
use rolerag::{
    executor::StructuredExecutor,
    providers::{
        ai::{gemini::GeminiProvider, local::LocalAiProvider, AiProvider},
        db::sqlite::SqliteProvider,
    },
    ChatOrchestrator, DocumentIngestor, EmbeddingRetriever, QueryClassifier, SqlTranslator,
    TableLocks,
};
use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};
use tracing::info;

/// A fully resolved task configuration with non-optional fields.
#[derive(Clone, Debug)]
pub struct ResolvedTask {
    pub provider: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// The shared application state, accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration, loaded from `config.yml`.
    pub config: Arc<AppConfig>,
    /// Users, roles, documents and chunks.
    pub app_store: Arc<SqliteProvider>,
    /// Ingested CSV tables and their registrations.
    pub tabular_store: Arc<SqliteProvider>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub ingestor: Arc<DocumentIngestor>,
}

/// Instantiates an AI provider client for each entry in the `providers` section.
fn build_ai_providers(
    config: &AppConfig,
    timeout: Duration,
) -> anyhow::Result<HashMap<String, Box<dyn AiProvider>>> {
    let mut ai_providers = HashMap::new();
    for (name, provider_config) in &config.providers {
        let provider: Box<dyn AiProvider> = match provider_config.provider.as_str() {
            "gemini" => {
                let api_key = provider_config
                    .api_key
                    .clone()
                    .filter(|key| !key.is_empty())
                    .ok_or_else(|| {
                        anyhow::anyhow!("api_key is required for gemini provider '{name}'")
                    })?;
                // If api_url is not provided in config, construct it from the model name.
                let api_url = provider_config.api_url.clone().unwrap_or_else(|| {
                    format!(
                        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                        provider_config.model_name
                    )
                });
                Box::new(GeminiProvider::new(api_url, api_key, timeout)?)
            }
            "local" => {
                let api_url = provider_config.api_url.clone().ok_or_else(|| {
                    anyhow::anyhow!(
                        "api_url is required for local provider '{name}'. Please set LOCAL_AI_API_URL in your .env file."
                    )
                })?;
                Box::new(LocalAiProvider::new(
                    api_url,
                    provider_config.api_key.clone().filter(|key| !key.is_empty()),
                    Some(provider_config.model_name.clone()),
                    timeout,
                )?)
            }
            _ => {
                return Err(anyhow::anyhow!(
                    "Unsupported AI provider type '{}' for provider '{}'",
                    provider_config.provider,
                    name
                ));
            }
        };
        ai_providers.insert(name.clone(), provider);
    }
    Ok(ai_providers)
}

/// Validates and resolves every configured task.
fn resolve_tasks(config: &AppConfig) -> anyhow::Result<HashMap<String, ResolvedTask>> {
    let mut resolved_tasks = HashMap::new();
    for (name, task_config) in &config.tasks {
        let provider = task_config.provider.clone().ok_or_else(|| {
            anyhow::anyhow!("Resolved task '{name}' is missing required 'provider' field")
        })?;
        let system_prompt = task_config.system_prompt.clone().ok_or_else(|| {
            anyhow::anyhow!("Resolved task '{name}' is missing required 'system_prompt' field")
        })?;
        let user_prompt = task_config.user_prompt.clone().ok_or_else(|| {
            anyhow::anyhow!("Resolved task '{name}' is missing required 'user_prompt' field")
        })?;

        resolved_tasks.insert(
            name.clone(),
            ResolvedTask {
                provider,
                system_prompt,
                user_prompt,
            },
        );
    }
    Ok(resolved_tasks)
}

/// Looks up a task and the provider it names.
fn task_provider<'a>(
    tasks: &'a HashMap<String, ResolvedTask>,
    providers: &HashMap<String, Box<dyn AiProvider>>,
    task_name: &str,
) -> anyhow::Result<(&'a ResolvedTask, Box<dyn AiProvider>)> {
    let task = tasks
        .get(task_name)
        .ok_or_else(|| anyhow::anyhow!("Task '{task_name}' is not configured"))?;
    let provider = providers.get(&task.provider).cloned().ok_or_else(|| {
        anyhow::anyhow!(
            "Task '{task_name}' uses provider '{}', which is not configured",
            task.provider
        )
    })?;
    Ok((task, provider))
}

/// Opens a store, creating the parent directory of a file-backed database.
async fn open_store(db_url: &str) -> anyhow::Result<SqliteProvider> {
    if db_url != ":memory:" {
        if let Some(parent) = Path::new(db_url).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(SqliteProvider::new(db_url).await?)
}

/// Builds the shared application state from the configuration.
///
/// This function initializes all necessary services:
/// - an AI provider client for each entry in the `providers` section;
/// - the application and tabular stores, with their schemas;
/// - the sentinel roles and the default admin user;
/// - the chat orchestrator and the document ingestor.
pub async fn build_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let timeout = Duration::from_secs(config.ai_timeout_secs.max(1));
    let ai_providers = build_ai_providers(&config, timeout)?;
    let tasks = resolve_tasks(&config)?;

    let app_store = open_store(&config.db_url).await?;
    app_store.initialize_schema().await?;
    info!(db_path = %config.db_url, "Initialized application store (SQLite).");

    let tabular_store = open_store(&config.structured_db_url).await?;
    tabular_store.initialize_tabular_schema().await?;
    info!(db_path = %config.structured_db_url, "Initialized tabular store (SQLite).");

    core_access::ensure_default_admin(
        &app_store.db,
        &config.admin.username,
        &config.admin.password,
        config.password_cost,
    )
    .await?;

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let embedding = config
        .embedding
        .clone()
        .with_api_key(config.embedding.api_key.clone());
    if !embedding.is_configured() {
        tracing::warn!("No embedding model configured; document retrieval is disabled.");
    }

    let locks = TableLocks::new();

    let (classification, classification_provider) =
        task_provider(&tasks, &ai_providers, QUERY_CLASSIFICATION_TASK)?;
    let classifier = QueryClassifier::new(classification_provider)
        .with_prompts(
            classification.system_prompt.clone(),
            classification.user_prompt.clone(),
        )
        .with_timeout(timeout);

    let (translation, translation_provider) =
        task_provider(&tasks, &ai_providers, SQL_TRANSLATION_TASK)?;
    let translator = SqlTranslator::new(translation_provider)
        .with_prompts(
            translation.system_prompt.clone(),
            translation.user_prompt.clone(),
        )
        .with_timeout(timeout);

    let (synthesis, synthesis_provider) =
        task_provider(&tasks, &ai_providers, RAG_SYNTHESIS_TASK)?;
    let retriever = EmbeddingRetriever::new(
        Arc::new(app_store.clone()),
        synthesis_provider,
        embedding.clone(),
        timeout,
    )?
    .with_prompts(synthesis.system_prompt.clone(), synthesis.user_prompt.clone())
    .with_limit(config.retrieval_limit);

    let orchestrator = ChatOrchestrator::builder()
        .classifier(classifier)
        .translator(translator)
        .executor(StructuredExecutor::new(
            Box::new(tabular_store.clone()),
            locks.clone(),
        ))
        .retriever(Arc::new(retriever))
        .app_store(app_store.clone())
        .tabular_store(tabular_store.clone())
        .build()?;

    let ingestor = DocumentIngestor::new(
        app_store.clone(),
        tabular_store.clone(),
        locks,
        &config.upload_dir,
        embedding,
        timeout,
    )?;

    Ok(AppState {
        config: Arc::new(config),
        app_store: Arc::new(app_store),
        tabular_store: Arc::new(tabular_store),
        orchestrator: Arc::new(orchestrator),
        ingestor: Arc::new(ingestor),
    })
}
