//! Live, in-memory chat sessions.
//!
//! A [`SessionManager`] holds every conversation currently open in a browser
//! tab or CLI invocation, keyed by session id, together with that session's
//! [`UserPreferences`]. Nothing here touches SQLite; persistence happens only
//! when a session is explicitly saved through [`crate::chat::ChatService`].

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::{AppConfig, ChatConfig};
use crate::models::{ChatSession, Message, MessageKind, Theme, UserPreferences};

/// Partial preference update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesPatch {
    pub theme: Option<Theme>,
    pub preferred_model: Option<String>,
    pub auto_scroll: Option<bool>,
    pub show_timestamps: Option<bool>,
    pub enable_sound: Option<bool>,
    pub export_format: Option<String>,
}

impl PreferencesPatch {
    fn apply(self, prefs: &mut UserPreferences) {
        if let Some(theme) = self.theme {
            prefs.theme = theme;
        }
        if let Some(model) = self.preferred_model {
            prefs.preferred_model = model;
        }
        if let Some(v) = self.auto_scroll {
            prefs.auto_scroll = v;
        }
        if let Some(v) = self.show_timestamps {
            prefs.show_timestamps = v;
        }
        if let Some(v) = self.enable_sound {
            prefs.enable_sound = v;
        }
        if let Some(format) = self.export_format {
            prefs.export_format = format;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub bot_messages: usize,
    pub total_characters: usize,
    pub session_duration_minutes: f64,
    pub created_at: String,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, ChatSession>>,
    preferences: RwLock<HashMap<String, UserPreferences>>,
    welcome_message: String,
    default_model: String,
    max_history_length: usize,
    context_window: usize,
    context_max_chars: usize,
    idle_ttl: Option<Duration>,
}

impl SessionManager {
    pub fn new(app: &AppConfig, chat: &ChatConfig, default_model: &str) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            preferences: RwLock::new(HashMap::new()),
            welcome_message: app.welcome_message.clone(),
            default_model: default_model.to_string(),
            max_history_length: chat.max_history_length.max(1),
            context_window: chat.context_window,
            context_max_chars: chat.context_max_chars,
            idle_ttl: (chat.idle_session_minutes > 0)
                .then(|| Duration::minutes(chat.idle_session_minutes as i64)),
        }
    }

    fn fresh_session(&self, id: String) -> ChatSession {
        let mut session = ChatSession::new(id, self.default_model.clone());
        session.add_message(Message::new(MessageKind::Bot, self.welcome_message.clone()));
        session
    }

    /// Open a new session with a fresh id and the welcome message.
    ///
    /// Idle sessions are evicted first.
    pub async fn create_session(&self) -> ChatSession {
        self.evict_idle().await;
        let session = self.fresh_session(uuid::Uuid::new_v4().to_string());
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        tracing::debug!(session_id = %session.id, "created chat session");
        session
    }

    pub async fn get(&self, id: &str) -> Option<ChatSession> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Append a message, opening the session first if it does not exist.
    ///
    /// Only the newest `max_history_length` messages are retained.
    pub async fn add_message(
        &self,
        id: &str,
        content: impl Into<String>,
        kind: MessageKind,
        metadata: Option<serde_json::Value>,
    ) -> Message {
        let mut message = Message::new(kind, content);
        if let Some(metadata) = metadata {
            message = message.with_metadata(metadata);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| self.fresh_session(id.to_string()));
        session.add_message(message.clone());

        let overflow = session.messages.len().saturating_sub(self.max_history_length);
        if overflow > 0 {
            session.messages.drain(..overflow);
        }
        message
    }

    /// Messages of a session, or only the last `limit` of them.
    pub async fn messages(&self, id: &str, limit: Option<usize>) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        match (sessions.get(id), limit) {
            (Some(s), Some(limit)) => s.recent_messages(limit).to_vec(),
            (Some(s), None) => s.messages.clone(),
            (None, _) => Vec::new(),
        }
    }

    /// Reset a session to just the welcome message, keeping its id.
    pub async fn clear(&self, id: &str) -> ChatSession {
        let session = self.fresh_session(id.to_string());
        self.sessions
            .write()
            .await
            .insert(id.to_string(), session.clone());
        session
    }

    /// Install `session` as the live copy under its own id.
    pub async fn replace(&self, session: ChatSession) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    /// Drop a live session and its preferences. Returns `true` if it existed.
    pub async fn remove(&self, id: &str) -> bool {
        self.preferences.write().await.remove(id);
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drop sessions whose last update is older than the idle TTL.
    /// Returns how many were removed.
    pub async fn evict_idle(&self) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };
        let cutoff = Utc::now() - ttl;

        let expired: Vec<String> = {
            let mut sessions = self.sessions.write().await;
            let expired: Vec<String> = sessions
                .values()
                .filter(|s| s.updated_at < cutoff)
                .map(|s| s.id.clone())
                .collect();
            for id in &expired {
                sessions.remove(id);
            }
            expired
        };
        if expired.is_empty() {
            return 0;
        }

        let mut preferences = self.preferences.write().await;
        for id in &expired {
            preferences.remove(id);
        }
        tracing::debug!(evicted = expired.len(), "evicted idle chat sessions");
        expired.len()
    }

    pub async fn preferences(&self, id: &str) -> UserPreferences {
        self.preferences
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Apply a partial update and return the result. A theme change is mirrored
    /// onto the live session.
    pub async fn update_preferences(&self, id: &str, patch: PreferencesPatch) -> UserPreferences {
        let theme = patch.theme;

        let updated = {
            let mut all = self.preferences.write().await;
            let prefs = all.entry(id.to_string()).or_default();
            patch.apply(prefs);
            prefs.clone()
        };

        if let Some(theme) = theme {
            if let Some(session) = self.sessions.write().await.get_mut(id) {
                session.theme = theme;
            }
        }
        updated
    }

    /// Recent turns rendered for the model prompt; empty for unknown sessions.
    pub async fn conversation_context(&self, id: &str) -> String {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|s| s.context(self.context_window, self.context_max_chars))
            .unwrap_or_default()
    }

    pub async fn stats(&self, id: &str) -> Option<SessionStats> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(id)?;

        let minutes = (Utc::now() - session.created_at).num_milliseconds() as f64 / 60_000.0;
        Some(SessionStats {
            total_messages: session.messages.len(),
            user_messages: session.count_kind(MessageKind::User),
            bot_messages: session.count_kind(MessageKind::Bot),
            total_characters: session
                .messages
                .iter()
                .map(|m| m.content.chars().count())
                .sum(),
            session_duration_minutes: (minutes * 10.0).round() / 10.0,
            created_at: session.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_history: usize) -> SessionManager {
        let chat = ChatConfig {
            max_history_length: max_history,
            ..Default::default()
        };
        SessionManager::new(&AppConfig::default(), &chat, "fallback")
    }

    #[tokio::test]
    async fn test_create_session_has_welcome() {
        let m = manager(20);
        let s = m.create_session().await;
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].kind, MessageKind::Bot);
        assert_eq!(
            s.messages[0].content,
            "Hello! I'm SmartBot Pro. How can I assist you today?"
        );
        assert!(m.exists(&s.id).await);
    }

    #[tokio::test]
    async fn test_add_message_creates_missing_session() {
        let m = manager(20);
        m.add_message("new-id", "hi", MessageKind::User, None).await;
        let msgs = m.messages("new-id", None).await;
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].content, "hi");
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let m = manager(4);
        let s = m.create_session().await;
        for i in 0..6 {
            m.add_message(&s.id, format!("m{}", i), MessageKind::User, None)
                .await;
        }
        let msgs = m.messages(&s.id, None).await;
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].content, "m2");
        assert_eq!(msgs[3].content, "m5");
    }

    #[tokio::test]
    async fn test_messages_limit() {
        let m = manager(20);
        let s = m.create_session().await;
        m.add_message(&s.id, "a", MessageKind::User, None).await;
        m.add_message(&s.id, "b", MessageKind::Bot, None).await;
        let last = m.messages(&s.id, Some(1)).await;
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].content, "b");
        assert!(m.messages("missing", Some(3)).await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_keeps_id() {
        let m = manager(20);
        let s = m.create_session().await;
        m.add_message(&s.id, "a", MessageKind::User, None).await;
        let cleared = m.clear(&s.id).await;
        assert_eq!(cleared.id, s.id);
        assert_eq!(cleared.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_update_preferences_partial() {
        let m = manager(20);
        let s = m.create_session().await;
        let patch: PreferencesPatch =
            serde_json::from_str(r#"{"theme":"dark","bogus":1,"show_timestamps":true}"#).unwrap();
        let prefs = m.update_preferences(&s.id, patch).await;
        assert_eq!(prefs.theme, Theme::Dark);
        assert!(prefs.show_timestamps);
        assert!(prefs.auto_scroll);
        assert_eq!(m.get(&s.id).await.unwrap().theme, Theme::Dark);
        assert_eq!(m.preferences(&s.id).await, prefs);
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let m = manager(20);
        let s = m.create_session().await;
        m.add_message(&s.id, "hey", MessageKind::User, None).await;
        let stats = m.stats(&s.id).await.unwrap();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.bot_messages, 1);
        assert_eq!(
            stats.total_characters,
            "Hello! I'm SmartBot Pro. How can I assist you today?".len() + 3
        );
        assert!(m.stats("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_conversation_context() {
        let m = manager(20);
        let s = m.create_session().await;
        m.add_message(&s.id, "What is Rust?", MessageKind::User, None)
            .await;
        let ctx = m.conversation_context(&s.id).await;
        assert!(ctx.starts_with("Assistant: Hello!"));
        assert!(ctx.ends_with("User: What is Rust?"));
        assert_eq!(m.conversation_context("missing").await, "");
    }

    #[tokio::test]
    async fn test_conversation_context_honours_window() {
        let chat = ChatConfig {
            context_window: 2,
            ..Default::default()
        };
        let m = SessionManager::new(&AppConfig::default(), &chat, "fallback");
        let s = m.create_session().await;
        for i in 0..3 {
            m.add_message(&s.id, format!("m{}", i), MessageKind::User, None)
                .await;
        }
        let ctx = m.conversation_context(&s.id).await;
        assert_eq!(ctx, "User: m1\nUser: m2");
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let m = manager(20);
        let mut stale = m.create_session().await;
        m.update_preferences(
            &stale.id,
            PreferencesPatch {
                show_timestamps: Some(true),
                ..Default::default()
            },
        )
        .await;
        stale.updated_at = Utc::now() - Duration::days(2);
        m.replace(stale.clone()).await;

        let fresh = m.create_session().await;
        assert!(!m.exists(&stale.id).await);
        assert!(!m.preferences(&stale.id).await.show_timestamps);
        assert!(m.exists(&fresh.id).await);
        assert_eq!(m.len().await, 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_keeps_sessions() {
        let chat = ChatConfig {
            idle_session_minutes: 0,
            ..Default::default()
        };
        let m = SessionManager::new(&AppConfig::default(), &chat, "fallback");
        let mut old = m.create_session().await;
        old.updated_at = Utc::now() - Duration::days(30);
        m.replace(old.clone()).await;

        assert_eq!(m.evict_idle().await, 0);
        m.create_session().await;
        assert!(m.exists(&old.id).await);
    }

    #[tokio::test]
    async fn test_remove_drops_session_and_preferences() {
        let m = manager(20);
        let s = m.create_session().await;
        assert!(m.remove(&s.id).await);
        assert!(!m.exists(&s.id).await);
        assert!(!m.remove(&s.id).await);
    }
}
