//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` has defaults, so a minimal config file is:
//!
//! ```toml
//! [db]
//! path = "./data/chats.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_welcome")]
    pub welcome_message: String,
    #[serde(default = "default_personality")]
    pub personality: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            welcome_message: default_welcome(),
            personality: default_personality(),
        }
    }
}

fn default_title() -> String {
    "SmartBot Pro".to_string()
}
fn default_welcome() -> String {
    "Hello! I'm SmartBot Pro. How can I assist you today?".to_string()
}
fn default_personality() -> String {
    "friendly".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_key")]
    pub default: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_model_retries")]
    pub max_retries: u32,
    #[serde(default = "default_catalog")]
    pub catalog: BTreeMap<String, ModelEntry>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model_key(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
            timeout_secs: default_model_timeout(),
            max_retries: default_model_retries(),
            catalog: default_catalog(),
        }
    }
}

/// One selectable model in `[model.catalog.<key>]`.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_model_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_model_key() -> String {
    "flan-t5-base".to_string()
}
fn default_max_new_tokens() -> u32 {
    150
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_repetition_penalty() -> f32 {
    1.1
}
fn default_model_timeout() -> u64 {
    60
}
fn default_model_retries() -> u32 {
    2
}
fn default_model_provider() -> String {
    "ollama".to_string()
}

fn default_catalog() -> BTreeMap<String, ModelEntry> {
    let mut catalog = BTreeMap::new();
    catalog.insert(
        "flan-t5-base".to_string(),
        ModelEntry {
            name: "Google FLAN-T5 Base".to_string(),
            description: "Versatile instruction-following model".to_string(),
            provider: "ollama".to_string(),
            model_id: "flan-t5-base".to_string(),
            url: None,
        },
    );
    catalog.insert(
        "flan-t5-small".to_string(),
        ModelEntry {
            name: "Google FLAN-T5 Small".to_string(),
            description: "Faster, smaller version".to_string(),
            provider: "ollama".to_string(),
            model_id: "flan-t5-small".to_string(),
            url: None,
        },
    );
    catalog
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_max_history")]
    pub max_history_length: usize,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_context_max_chars")]
    pub context_max_chars: usize,
    /// Live sessions untouched for this long are dropped. `0` keeps them forever.
    #[serde(default = "default_idle_session_minutes")]
    pub idle_session_minutes: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_length: default_max_history(),
            context_window: default_context_window(),
            context_max_chars: default_context_max_chars(),
            idle_session_minutes: default_idle_session_minutes(),
        }
    }
}

fn default_max_history() -> usize {
    20
}
fn default_context_window() -> usize {
    6
}
fn default_context_max_chars() -> usize {
    500
}
fn default_idle_session_minutes() -> u64 {
    720
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_min_index_chars")]
    pub min_index_chars: usize,
    #[serde(default = "default_text_search_limit")]
    pub text_search_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: default_max_results(),
            snippet_chars: default_snippet_chars(),
            max_context_chars: default_max_context_chars(),
            min_index_chars: default_min_index_chars(),
            text_search_limit: default_text_search_limit(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_results() -> usize {
    3
}
fn default_snippet_chars() -> usize {
    200
}
fn default_max_context_chars() -> usize {
    1000
}
fn default_min_index_chars() -> usize {
    10
}
fn default_text_search_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    ["txt", "md", "py", "js", "json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// In-code defaults for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            app: AppConfig::default(),
            db: DbConfig {
                path: PathBuf::from("./data/smartbot.sqlite"),
            },
            model: ModelConfig::default(),
            chat: ChatConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
            uploads: UploadsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate model
    if config.model.max_new_tokens == 0 {
        anyhow::bail!("model.max_new_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.model.temperature) {
        anyhow::bail!("model.temperature must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&config.model.top_p) {
        anyhow::bail!("model.top_p must be in [0.0, 1.0]");
    }
    if config.model.catalog.contains_key("fallback") {
        anyhow::bail!(
            "[model.catalog] key 'fallback' is reserved for the built-in rule-based model"
        );
    }
    for (key, entry) in &config.model.catalog {
        match entry.provider.as_str() {
            "ollama" | "openai" | "fallback" => {}
            other => anyhow::bail!(
                "Unknown provider '{}' for model '{}'. Must be ollama, openai, or fallback.",
                other,
                key
            ),
        }
    }
    if config.model.default != "fallback" && !config.model.catalog.contains_key(&config.model.default)
    {
        anyhow::bail!(
            "model.default '{}' is not in [model.catalog] (or 'fallback')",
            config.model.default
        );
    }

    // Validate chat
    if config.chat.max_history_length == 0 {
        anyhow::bail!("chat.max_history_length must be > 0");
    }

    // Validate retrieval
    if config.retrieval.max_results == 0 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    crate::logging::parse_level(&config.logging.level)
        .with_context(|| "Invalid logging.level")?;

    Ok(())
}
