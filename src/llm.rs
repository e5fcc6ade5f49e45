//! Language model backends and the manager that routes chat turns to them.
//!
//! Inference is delegated to an external runtime over HTTP:
//!
//! - [`OllamaModel`] calls `POST {url}/api/generate` (non-streaming).
//! - [`OpenAiCompatibleModel`] calls `POST {url}/v1/chat/completions`.
//! - [`FallbackModel`] answers from a fixed rule table and is always available.
//!
//! [`ModelManager`] owns one backend per `[model.catalog]` entry plus the
//! fallback, tracks which one is selected, and turns backend failures into
//! canned replies so a chat turn always produces a message.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::{ModelConfig, ModelEntry};
use crate::prompt::{extract_answer, question_prompt};

pub const FALLBACK_KEY: &str = "fallback";

pub const UNAVAILABLE_REPLY: &str = "Sorry, the AI model is not available right now.";
pub const ERROR_REPLY: &str = "Sorry, I encountered an error while processing your request.";
pub const EMPTY_REPLY: &str = "I'm not sure how to respond to that.";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("model request failed: {0}")]
    Request(String),
}

impl ModelError {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ModelError::Unavailable(e.to_string())
        } else {
            ModelError::Request(e.to_string())
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Catalog key this backend is registered under.
    fn key(&self) -> &str;
    /// Backend family: `"ollama"`, `"openai"` or `"fallback"`.
    fn provider(&self) -> &'static str;
    async fn generate(&self, prompt: &str, context: &str) -> Result<String, ModelError>;
    async fn is_available(&self) -> bool;
}

/// Sampling settings shared by every HTTP backend.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl From<&ModelConfig> for GenerationParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            repetition_penalty: config.repetition_penalty,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Reachability probe: any HTTP response counts, only transport failures do not.
async fn ping(url: &str) -> bool {
    let Ok(client) = http_client(5) else {
        return false;
    };
    client.get(url).send().await.is_ok()
}

fn finish_answer(raw: &str) -> String {
    let answer = extract_answer(raw);
    if answer.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        answer
    }
}

/// Send with exponential backoff on 429, 5xx, and transport errors.
async fn send_with_retry(
    request: reqwest::RequestBuilder,
    max_retries: u32,
    url: &str,
) -> Result<reqwest::Response, ModelError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(attempt, delay_secs = delay.as_secs(), "retrying model request");
            tokio::time::sleep(delay).await;
        }

        let req = request
            .try_clone()
            .ok_or_else(|| ModelError::Request("request body is not cloneable".to_string()))?;

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    let body = response.text().await.unwrap_or_default();
                    warn!(url, status = %status, attempt, "model endpoint busy or failing");
                    last_err = Some(ModelError::Request(format!("{}: {}", status, body)));
                    continue;
                }
                return check_status(response).await;
            }
            Err(e) => {
                error!(url, error = %e, attempt, "model request failed (transport)");
                last_err = Some(ModelError::from_transport(e));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| ModelError::Request("model request failed after retries".to_string())))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %body, "model endpoint returned an error");
    if status == reqwest::StatusCode::NOT_FOUND {
        Err(ModelError::Unavailable(format!("{}: {}", status, body)))
    } else {
        Err(ModelError::Request(format!("{}: {}", status, body)))
    }
}

// ============ Ollama ============

pub struct OllamaModel {
    key: String,
    model_id: String,
    url: String,
    params: GenerationParams,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaModel {
    pub fn new(key: &str, entry: &ModelEntry, params: GenerationParams) -> Result<Self> {
        Ok(Self {
            key: key.to_string(),
            model_id: entry.model_id.clone(),
            url: entry
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client(params.timeout_secs)?,
            params,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn key(&self) -> &str {
        &self.key
    }

    fn provider(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, context: &str) -> Result<String, ModelError> {
        let payload = GenerateRequest {
            model: &self.model_id,
            prompt: question_prompt(prompt, context),
            stream: false,
            options: GenerateOptions {
                num_predict: self.params.max_new_tokens,
                temperature: self.params.temperature,
                top_p: self.params.top_p,
                repeat_penalty: self.params.repetition_penalty,
            },
        };

        debug!(model = %self.model_id, prompt_len = payload.prompt.len(), "sending generate request");

        let request = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&payload);

        let parsed = send_with_retry(request, self.params.max_retries, &self.url)
            .await?
            .json::<GenerateResponse>()
            .await
            .map_err(|e| ModelError::Request(format!("failed to parse response body: {e}")))?;

        Ok(finish_answer(&parsed.response))
    }

    async fn is_available(&self) -> bool {
        ping(&self.url).await
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiCompatibleModel {
    key: String,
    model_id: String,
    url: String,
    api_key: Option<String>,
    params: GenerationParams,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleModel {
    /// The bearer key comes from `OPENAI_API_KEY` when set; keyless local servers work without it.
    pub fn new(key: &str, entry: &ModelEntry, params: GenerationParams) -> Result<Self> {
        Ok(Self {
            key: key.to_string(),
            model_id: entry.model_id.clone(),
            url: entry
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            client: http_client(params.timeout_secs)?,
            params,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn key(&self) -> &str {
        &self.key
    }

    fn provider(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &str, context: &str) -> Result<String, ModelError> {
        let payload = ChatCompletionRequest {
            model: &self.model_id,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: question_prompt(prompt, context),
            }],
            max_tokens: self.params.max_new_tokens,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
        };

        debug!(model = %self.model_id, "sending chat completion request");

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let parsed = send_with_retry(req, self.params.max_retries, &self.url)
            .await?
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ModelError::Request(format!("failed to parse response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(finish_answer(&text))
    }

    async fn is_available(&self) -> bool {
        ping(&self.url).await
    }
}

// ============ Fallback ============

static FALLBACK_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)what.*2\s*\+\s*2|2\s*\+\s*2", "4"),
        (r"(?i)what.*5\s*\*\s*5|5\s*\*\s*5", "25"),
        (r"(?i)what.*10\s*-\s*3|10\s*-\s*3", "7"),
        (r"(?i)capital.*india", "New Delhi is the capital of India."),
        (r"(?i)capital.*france", "Paris is the capital of France."),
        (r"(?i)capital.*japan", "Tokyo is the capital of Japan."),
        (
            r"(?i)after.*a|letter.*after.*a",
            "B comes after A in the alphabet.",
        ),
        (
            r"(?i)hello|hi|hey",
            "Hello! I'm running in basic mode. How can I help you?",
        ),
        (r"(?i)how.*you", "I'm doing well, thank you for asking!"),
        (
            r"(?i)weather",
            "I don't have access to current weather data. Please check a weather service.",
        ),
        (
            r"(?i)photosynthesis",
            "Photosynthesis is the process by which plants use sunlight, water, and carbon dioxide to create glucose and oxygen.",
        ),
        (
            r"(?i)gravity",
            "Gravity is the force that attracts objects toward each other, keeping us on Earth's surface.",
        ),
    ]
    .into_iter()
    .map(|(pattern, reply)| (Regex::new(pattern).expect("valid regex"), reply))
    .collect()
});

/// Rule-based replies for when no real model is reachable.
///
/// Catalog entries with `provider = "fallback"` register one of these under
/// their own key.
#[derive(Debug, Clone)]
pub struct FallbackModel {
    key: String,
}

impl Default for FallbackModel {
    fn default() -> Self {
        Self::new(FALLBACK_KEY)
    }
}

impl FallbackModel {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }

    /// First matching rule, else a keyword-based default. Never empty.
    pub fn reply(prompt: &str) -> &'static str {
        if let Some((_, reply)) = FALLBACK_RULES.iter().find(|(re, _)| re.is_match(prompt)) {
            return *reply;
        }

        let lower = prompt.to_lowercase();
        if ["hello", "hi", "hey"].iter().any(|w| lower.contains(w)) {
            "Hello! I'm currently in basic mode. How can I assist you today?"
        } else if ["help", "what", "how"].iter().any(|w| lower.contains(w)) {
            "I'm here to help! I can answer basic questions about math, geography, and general knowledge."
        } else if prompt.contains('?') {
            "That's an interesting question! Unfortunately, I'm running in basic mode and may not have the full answer."
        } else {
            "I understand you're trying to communicate with me. I'm currently in basic mode with limited capabilities."
        }
    }
}

#[async_trait]
impl LanguageModel for FallbackModel {
    fn key(&self) -> &str {
        &self.key
    }

    fn provider(&self) -> &'static str {
        "fallback"
    }

    async fn generate(&self, prompt: &str, _context: &str) -> Result<String, ModelError> {
        Ok(Self::reply(prompt).to_string())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// ============ Manager ============

/// UI label for a model key.
pub fn display_name(key: &str) -> String {
    match key {
        "flan-t5-base" => "FLAN-T5 Base (Recommended)".to_string(),
        "flan-t5-small" => "FLAN-T5 Small (Fast)".to_string(),
        "dialogpt" => "DialoGPT (Conversational)".to_string(),
        FALLBACK_KEY => "Basic Mode".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub key: String,
    pub display_name: String,
    pub name: String,
    pub description: String,
    pub provider: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub current_model: String,
    pub current_display_name: String,
    pub current_available: bool,
    pub available_models: Vec<String>,
    pub model_count: usize,
}

pub struct ModelManager {
    models: BTreeMap<String, Arc<dyn LanguageModel>>,
    entries: BTreeMap<String, ModelEntry>,
    fallback: Arc<dyn LanguageModel>,
    current: RwLock<String>,
}

impl ModelManager {
    /// Build one backend per catalog entry and select `config.default`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let params = GenerationParams::from(config);
        let mut models: Vec<Arc<dyn LanguageModel>> = Vec::new();

        for (key, entry) in &config.catalog {
            let model: Arc<dyn LanguageModel> = match entry.provider.as_str() {
                "ollama" => Arc::new(OllamaModel::new(key, entry, params.clone())?),
                "openai" => Arc::new(OpenAiCompatibleModel::new(key, entry, params.clone())?),
                "fallback" => Arc::new(FallbackModel::new(key)),
                other => anyhow::bail!("Unknown model provider '{}' for '{}'", other, key),
            };
            models.push(model);
        }

        let mut manager = Self::with_models(models, &config.default);
        manager.entries = config.catalog.clone();
        Ok(manager)
    }

    /// Register pre-built backends. An unknown `default` selects the fallback.
    pub fn with_models(models: Vec<Arc<dyn LanguageModel>>, default: &str) -> Self {
        let models: BTreeMap<String, Arc<dyn LanguageModel>> = models
            .into_iter()
            .map(|m| (m.key().to_string(), m))
            .collect();

        let current = if models.contains_key(default) {
            default.to_string()
        } else {
            FALLBACK_KEY.to_string()
        };

        Self {
            models,
            entries: BTreeMap::new(),
            fallback: Arc::new(FallbackModel::default()),
            current: RwLock::new(current),
        }
    }

    /// Select a model by key. Returns `false` for unknown keys.
    pub fn set_model(&self, key: &str) -> bool {
        if key != FALLBACK_KEY && !self.models.contains_key(key) {
            return false;
        }
        match self.current.write() {
            Ok(mut current) => *current = key.to_string(),
            Err(poisoned) => *poisoned.into_inner() = key.to_string(),
        }
        true
    }

    pub fn current_key(&self) -> String {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Catalog keys followed by `"fallback"`.
    pub fn available_models(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.models.keys().cloned().collect();
        keys.push(FALLBACK_KEY.to_string());
        keys
    }

    fn model(&self, key: &str) -> Arc<dyn LanguageModel> {
        self.models
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Generate with the selected model. Failures become canned replies.
    pub async fn generate(&self, prompt: &str, context: &str) -> String {
        let key = self.current_key();
        let model = self.model(&key);

        match model.generate(prompt, context).await {
            Ok(reply) => reply,
            Err(ModelError::Unavailable(e)) => {
                warn!(model = %key, error = %e, "model unavailable");
                UNAVAILABLE_REPLY.to_string()
            }
            Err(ModelError::Request(e)) => {
                warn!(model = %key, error = %e, "model generation failed");
                ERROR_REPLY.to_string()
            }
        }
    }

    pub async fn status(&self) -> ModelStatus {
        let key = self.current_key();
        let current_available = self.model(&key).is_available().await;
        ModelStatus {
            current_display_name: display_name(&key),
            current_model: key,
            current_available,
            available_models: self.available_models(),
            model_count: self.models.len(),
        }
    }

    /// Catalog details for every selectable model, probing each for reachability.
    pub async fn model_infos(&self) -> Vec<ModelInfo> {
        let mut infos = Vec::with_capacity(self.models.len() + 1);
        for key in self.available_models() {
            let model = self.model(&key);
            let (name, description) = match self.entries.get(&key) {
                Some(entry) => (entry.name.clone(), entry.description.clone()),
                None if key == FALLBACK_KEY => (
                    "Basic Mode".to_string(),
                    "Rule-based answers, always available".to_string(),
                ),
                None => (key.clone(), String::new()),
            };
            infos.push(ModelInfo {
                display_name: display_name(&key),
                provider: model.provider().to_string(),
                available: model.is_available().await,
                key,
                name,
                description,
            });
        }
        infos
    }
}
