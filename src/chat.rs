//! Chat orchestration.
//!
//! [`ChatService`] ties the layers together for one chat turn:
//!
//! 1. sanitize the user's text and append it to the live session,
//! 2. gather context: snippets from saved chats when retrieval is on,
//!    otherwise the recent turns of the current conversation,
//! 3. generate a reply with the selected model,
//! 4. clean the reply, apply the personality, and append it.
//!
//! It also owns saving, loading and deleting persisted chats, keeping the
//! vector index in step with the store, and text file uploads.

use anyhow::Context;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::llm::ModelManager;
use crate::models::{ChatSession, Message, MessageKind};
use crate::rag::RagService;
use crate::session::SessionManager;
use crate::store::ChatStore;
use crate::text::{
    add_personality, clean_response, format_file_size, generate_short_id, sanitize_text,
    take_chars, validate_file_size,
};
use crate::{db, migrate};

/// Starter prompts offered on an empty chat.
pub const EXAMPLE_PROMPTS: [&str; 6] = [
    "What is 25 * 4?",
    "What is the capital of France?",
    "Explain photosynthesis in simple terms",
    "Write a short poem about technology",
    "What comes after the letter 'Z'?",
    "How does gravity work?",
];

/// Characters of an uploaded file echoed into the conversation.
const UPLOAD_MESSAGE_PREVIEW: usize = 200;
/// Characters of an uploaded file returned to the caller.
const UPLOAD_PREVIEW: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("saved chat not found: {0}")]
    SavedChatNotFound(String),
    #[error("file is too large: {size} exceeds the {max} limit")]
    FileTooLarge { size: String, max: String },
    #[error("unsupported file type: '{0}'")]
    UnsupportedFileType(String),
    #[error("file is not valid UTF-8 text")]
    InvalidEncoding,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ChatError {
    fn from(e: sqlx::Error) -> Self {
        ChatError::Internal(e.into())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadOutcome {
    pub filename: String,
    pub size: usize,
    pub size_display: String,
    pub preview: String,
    pub message: Message,
}

pub struct ChatService {
    config: Arc<Config>,
    store: ChatStore,
    rag: RagService,
    sessions: SessionManager,
    models: ModelManager,
}

impl ChatService {
    /// Assemble a service over an already-migrated pool.
    pub fn new(
        config: Arc<Config>,
        pool: SqlitePool,
        models: ModelManager,
        provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        let store = ChatStore::new(pool);
        let rag = RagService::new(
            store.clone(),
            provider,
            config.retrieval.clone(),
            config.embedding.batch_size,
        );
        let sessions = SessionManager::new(&config.app, &config.chat, &models.current_key());

        Self {
            config,
            store,
            rag,
            sessions,
            models,
        }
    }

    /// Connect, migrate, and build the model and embedding backends from `config`.
    ///
    /// A misconfigured embedding provider degrades retrieval to text search
    /// instead of failing startup.
    pub async fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply(&pool).await?;

        let models =
            ModelManager::from_config(&config.model).context("Failed to set up language models")?;

        let provider = if config.embedding.is_enabled() {
            match embedding::create_provider(&config.embedding) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding provider unavailable, using text search");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            db = %config.db.path.display(),
            model = %models.current_key(),
            vector_search = provider.is_some(),
            "chat service ready"
        );

        Ok(Self::new(config, pool, models, provider))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn rag(&self) -> &RagService {
        &self.rag
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    /// Run one chat turn and return the bot's reply.
    ///
    /// `use_rag` overrides `[retrieval] enabled` for this turn.
    pub async fn send(
        &self,
        session_id: &str,
        input: &str,
        use_rag: Option<bool>,
    ) -> ChatResult<Message> {
        let text = sanitize_text(input);
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.sessions.exists(session_id).await {
            return Err(ChatError::SessionNotFound(session_id.to_string()));
        }

        self.sessions
            .add_message(session_id, text.clone(), MessageKind::User, None)
            .await;

        let use_rag = use_rag.unwrap_or(self.config.retrieval.enabled);
        let retrieved = if use_rag {
            self.rag.context_block(&text).await
        } else {
            None
        };
        let used_retrieval = retrieved.is_some();
        let context = match retrieved {
            Some(block) => block,
            None => self.sessions.conversation_context(session_id).await,
        };

        let raw = self.models.generate(&text, &context).await;
        let reply = add_personality(&clean_response(&raw), &self.config.app.personality);

        let metadata = serde_json::json!({
            "model": self.models.current_key(),
            "retrieval": used_retrieval,
        });
        let message = self
            .sessions
            .add_message(session_id, reply, MessageKind::Bot, Some(metadata))
            .await;

        tracing::debug!(
            session_id,
            model = %self.models.current_key(),
            retrieval = used_retrieval,
            reply_len = message.content.len(),
            "chat turn complete"
        );
        Ok(message)
    }

    /// Persist a live session and refresh its vectors.
    ///
    /// Indexing failures are logged; the save itself still succeeds.
    pub async fn save(
        &self,
        session_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ChatResult<ChatSession> {
        let mut session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))?;

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| session.name.clone())
            .unwrap_or_else(|| {
                format!("Chat {}", session.created_at.format("%Y-%m-%d %H:%M"))
            });
        let description = description.unwrap_or_default();

        self.store.save_session(&session, &name, description).await?;
        session.name = Some(name);
        self.sessions.replace(session.clone()).await;

        match self.rag.index_session(session_id).await {
            Ok(indexed) => tracing::debug!(session_id, indexed, "saved chat indexed"),
            Err(e) => tracing::warn!(session_id, error = %e, "failed to index saved chat"),
        }

        Ok(session)
    }

    /// Load a saved chat into the live session map under its own id.
    pub async fn load(&self, saved_id: &str) -> ChatResult<ChatSession> {
        let session = self
            .store
            .load_session(saved_id)
            .await?
            .ok_or_else(|| ChatError::SavedChatNotFound(saved_id.to_string()))?;
        self.sessions.replace(session.clone()).await;
        Ok(session)
    }

    /// Delete a saved chat and its vectors. The live copy, if any, is left open.
    pub async fn delete(&self, saved_id: &str) -> ChatResult<()> {
        if !self.store.delete_session(saved_id).await? {
            return Err(ChatError::SavedChatNotFound(saved_id.to_string()));
        }
        if let Err(e) = self.rag.remove_session(saved_id).await {
            tracing::warn!(session_id = saved_id, error = %e, "failed to remove chat from index");
        }
        Ok(())
    }

    /// Attach a text file to a session as a system message.
    pub async fn upload(
        &self,
        session_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> ChatResult<UploadOutcome> {
        if !self.sessions.exists(session_id).await {
            return Err(ChatError::SessionNotFound(session_id.to_string()));
        }

        let max = self.config.uploads.max_file_size;
        if !validate_file_size(bytes.len(), max) {
            return Err(ChatError::FileTooLarge {
                size: format_file_size(bytes.len() as u64),
                max: format_file_size(max as u64),
            });
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !self
            .config
            .uploads
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        {
            return Err(ChatError::UnsupportedFileType(filename.to_string()));
        }

        let content = std::str::from_utf8(bytes).map_err(|_| ChatError::InvalidEncoding)?;

        let message_text = format!(
            "📁 File uploaded: {}\n\nContent preview:\n{}...",
            filename,
            take_chars(content, UPLOAD_MESSAGE_PREVIEW)
        );
        let metadata = serde_json::json!({
            "upload_id": generate_short_id(),
            "filename": filename,
            "size": bytes.len(),
        });
        let message = self
            .sessions
            .add_message(session_id, message_text, MessageKind::System, Some(metadata))
            .await;

        let preview = if content.chars().count() > UPLOAD_PREVIEW {
            format!("{}...", take_chars(content, UPLOAD_PREVIEW))
        } else {
            content.to_string()
        };

        tracing::info!(session_id, filename, size = bytes.len(), "file uploaded");
        Ok(UploadOutcome {
            filename: filename.to_string(),
            size: bytes.len(),
            size_display: format_file_size(bytes.len() as u64),
            preview,
            message,
        })
    }
}
