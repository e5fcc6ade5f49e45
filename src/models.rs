//! Core data models used throughout SmartBot.
//!
//! These types represent the messages, sessions, preferences, and search
//! hits that flow between the chat service, the SQLite store, the retrieval
//! layer, and the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Bot,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::User => "user",
            MessageKind::Bot => "bot",
            MessageKind::System => "system",
        }
    }

    /// Label used in text and markdown exports.
    pub fn speaker(&self) -> &'static str {
        match self {
            MessageKind::User => "You",
            MessageKind::Bot => "Bot",
            MessageKind::System => "System",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageKind::User),
            "bot" => Ok(MessageKind::Bot),
            "system" => Ok(MessageKind::System),
            other => anyhow::bail!("unknown message kind: '{}'", other),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

impl Message {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: empty_object(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Colour theme selected for the chat page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Dark,
    Blue,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::Default, Theme::Dark, Theme::Blue];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Default => "default",
            Theme::Dark => "dark",
            Theme::Blue => "blue",
        }
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Theme::Default),
            "dark" => Ok(Theme::Dark),
            "blue" => Ok(Theme::Blue),
            other => anyhow::bail!("unknown theme: '{}'", other),
        }
    }
}

/// A conversation: an ordered list of messages plus presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub theme: Theme,
    pub model_name: String,
}

impl ChatSession {
    pub fn new(id: impl Into<String>, model_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            theme: Theme::Default,
            model_name: model_name.into(),
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// The last `count` messages (all of them when there are fewer).
    pub fn recent_messages(&self, count: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    /// Render the last `count` messages as `User:` / `Assistant:` lines.
    ///
    /// When the rendering is longer than `max_chars`, only the last
    /// `max_chars` characters are kept.
    pub fn context(&self, count: usize, max_chars: usize) -> String {
        let context = self
            .recent_messages(count)
            .iter()
            .map(|m| {
                let prefix = if m.kind == MessageKind::User {
                    "User: "
                } else {
                    "Assistant: "
                };
                format!("{}{}", prefix, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let len = context.chars().count();
        if len > max_chars {
            context.chars().skip(len - max_chars).collect()
        } else {
            context
        }
    }

    pub fn count_kind(&self, kind: MessageKind) -> usize {
        self.messages.iter().filter(|m| m.kind == kind).count()
    }
}

/// Per-session user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub theme: Theme,
    pub preferred_model: String,
    pub auto_scroll: bool,
    pub show_timestamps: bool,
    pub enable_sound: bool,
    pub export_format: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::Default,
            preferred_model: "flan-t5-base".to_string(),
            auto_scroll: true,
            show_timestamps: false,
            enable_sound: false,
            export_format: "txt".to_string(),
        }
    }
}

/// Listing row for a saved chat.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
}

/// A message matched by substring search over saved chats.
#[derive(Debug, Clone, Serialize)]
pub struct MessageHit {
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: String,
    pub session_id: String,
    pub session_name: String,
}

/// Where a retrieved context snippet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    VectorSearch,
    TextSearch,
}

/// A prior-conversation snippet retrieved to enrich a prompt.
#[derive(Debug, Clone, Serialize)]
pub struct ContextHit {
    pub content: String,
    pub session_id: String,
    pub session_name: Option<String>,
    pub kind: MessageKind,
    pub timestamp: String,
    pub relevance: f64,
    pub source: HitSource,
}
