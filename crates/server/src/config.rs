//! # Application Configuration
//!
//! This module defines the configuration structure for the `rolerag-server` and
//! provides the logic for loading it from a `config.yml` file and environment
//! variables.

use config::{
    Config as ConfigBuilder, Environment, File, FileFormat, Value as ConfigValue,
    ValueKind as ConfigValueKind,
};
use regex::Regex;
use rolerag::{
    constants::{
        DEFAULT_AI_TIMEOUT_SECS, DEFAULT_DB_FILE, DEFAULT_RETRIEVAL_LIMIT,
        DEFAULT_STRUCTURED_DB_FILE, DEFAULT_UPLOAD_DIR,
    },
    prompts::tasks::*,
    EmbeddingConfig,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use tracing::info;

/// Task names, as used under `tasks:` in the config file.
pub const QUERY_CLASSIFICATION_TASK: &str = "query_classification";
pub const SQL_TRANSLATION_TASK: &str = "sql_translation";
pub const RAG_SYNTHESIS_TASK: &str = "rag_synthesis";

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    #[serde(default = "default_port")]
    pub port: u16,
    /// The application store: users, roles, documents and chunks. Loaded from `DB_URL`.
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// The tabular store holding one table per ingested CSV. Loaded from `STRUCTURED_DB_URL`.
    #[serde(default = "default_structured_db_url")]
    pub structured_db_url: String,
    /// Uploaded files are kept under `<upload_dir>/<role>/<filename>`.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Upper bound on every model and embedding call.
    #[serde(default = "default_ai_timeout_secs")]
    pub ai_timeout_secs: u64,
    /// How many chunks retrieval passes to answer synthesis.
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: u32,
    /// The bcrypt cost for new password hashes.
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,

    /// The bootstrap user seeded on startup with the privileged role.
    #[serde(default)]
    pub admin: AdminConfig,
    /// Configuration for the text embedding model. Retrieval is disabled when unset.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// A map of named, reusable AI provider configurations.
    pub providers: HashMap<String, ProviderConfig>,
    /// A map of tasks, each specifying a provider and prompts.
    pub tasks: HashMap<String, TaskConfig>,
}

fn default_port() -> u16 {
    9090
}
fn default_db_url() -> String {
    DEFAULT_DB_FILE.to_string()
}
fn default_structured_db_url() -> String {
    DEFAULT_STRUCTURED_DB_FILE.to_string()
}
fn default_upload_dir() -> String {
    DEFAULT_UPLOAD_DIR.to_string()
}
fn default_ai_timeout_secs() -> u64 {
    DEFAULT_AI_TIMEOUT_SECS
}
fn default_retrieval_limit() -> u32 {
    DEFAULT_RETRIEVAL_LIMIT
}
fn default_password_cost() -> u32 {
    core_access::DEFAULT_PASSWORD_COST
}

#[derive(Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    #[serde(default = "default_admin_password")]
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: default_admin_password(),
        }
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_admin_username() -> String {
    "admin".to_string()
}
fn default_admin_password() -> String {
    "admin123".to_string()
}

/// A reusable configuration for a specific AI provider instance.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// The type of provider (e.g., "gemini", "local").
    pub provider: String,
    /// The API URL. Optional for providers like Gemini where it can be derived.
    pub api_url: Option<String>,
    /// The API key, which can be null for local providers.
    pub api_key: Option<String>,
    pub model_name: String,
}

/// Defines the prompts and provider for a specific application task.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaskConfig {
    /// The key of the provider to use from the `providers` map.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
}

/// Constructs a `config::Value` map of the default tasks from the library.
/// This serves as the base layer of configuration.
fn build_default_tasks() -> HashMap<String, ConfigValue> {
    let tasks = vec![
        (
            QUERY_CLASSIFICATION_TASK,
            (
                "default",
                QUERY_CLASSIFICATION_SYSTEM_PROMPT,
                QUERY_CLASSIFICATION_USER_PROMPT,
            ),
        ),
        (
            SQL_TRANSLATION_TASK,
            (
                "default",
                SQL_TRANSLATION_SYSTEM_PROMPT,
                SQL_TRANSLATION_USER_PROMPT,
            ),
        ),
        (
            RAG_SYNTHESIS_TASK,
            (
                "default",
                RAG_SYNTHESIS_SYSTEM_PROMPT,
                RAG_SYNTHESIS_USER_PROMPT,
            ),
        ),
    ];

    tasks
        .into_iter()
        .map(|(name, (provider, sys, user))| {
            let mut table = HashMap::new();
            table.insert("provider".to_string(), ConfigValue::from(provider));
            table.insert("system_prompt".to_string(), ConfigValue::from(sys));
            table.insert("user_prompt".to_string(), ConfigValue::from(user));
            (
                name.to_string(),
                ConfigValue::new(None, ConfigValueKind::Table(table)),
            )
        })
        .collect()
}

// Reads a file and substitutes `${VAR}` with the environment value (empty if unset).
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")
        .map_err(|e| ConfigError::General(e.to_string()))?;
    let expanded_content = re.replace_all(&content, |caps: &regex::Captures| {
        let var_name = &caps["var"];
        env::var(var_name).unwrap_or_default()
    });

    Ok(Some(expanded_content.to_string()))
}

/// Loads the application configuration from a file and environment variables.
///
/// - Top-level keys like `port` and `db_url` are overridden by `PORT` and `DB_URL`.
/// - Nested keys are overridden by `ROLERAG_...` variables (e.g., `ROLERAG_EMBEDDING__API_URL`).
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let base_path = env!("CARGO_MANIFEST_DIR");
    let mut builder = ConfigBuilder::builder()
        // Layer 1: Programmatic defaults from the library.
        .set_default("tasks", build_default_tasks())?;

    // Layer 2: Main Config (with Fallback)
    let main_config_path = if let Some(override_path) = config_path_override {
        override_path.to_string()
    } else {
        let user_config_path = format!("{base_path}/config.yml");
        if std::path::Path::new(&user_config_path).exists() {
            info!("Loading user-defined configuration from '{user_config_path}'.");
            user_config_path
        } else {
            let provider = env::var("AI_PROVIDER").unwrap_or_else(|_| "local".to_string());
            let fallback_path = format!("{base_path}/config.{provider}.yml");
            info!("'{user_config_path}' not found. Falling back to '{fallback_path}' based on AI_PROVIDER='{provider}'.");
            fallback_path
        }
    };

    let main_content = read_and_substitute(&main_config_path)?
        .ok_or_else(|| ConfigError::NotFound(format!("Main config file not found at '{main_config_path}'. Please ensure 'config.yml' exists or your AI_PROVIDER is set to load a valid template ('local' or 'gemini').")))?;
    builder = builder.add_source(File::from_str(&main_content, FileFormat::Yaml));

    // Layer 3: User Prompt Overrides (Optional)
    let user_prompt_path = format!("{base_path}/prompt.yml");
    if let Some(user_prompts_content) = read_and_substitute(&user_prompt_path)? {
        info!("Loading user prompt overrides from '{user_prompt_path}'.");
        builder = builder.add_source(File::from_str(&user_prompts_content, FileFormat::Yaml));
    }

    let settings = builder
        // Layer 4: Load environment variables for top-level keys like PORT.
        .add_source(Environment::default())
        // Layer 5: Load prefixed environment variables for deeper overrides.
        .add_source(
            Environment::with_prefix("ROLERAG")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    Ok(config)
}
