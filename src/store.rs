//! SQLite persistence for saved chats.
//!
//! [`ChatStore`] wraps a [`SqlitePool`] and maps session save/load/list/delete
//! and message search onto the `chat_sessions` and `messages` tables created
//! by [`crate::migrate`].
//!
//! Timestamps are stored as RFC 3339 strings with fixed microsecond precision
//! so that lexical ordering in SQL matches chronological ordering.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::models::{ChatSession, Message, MessageHit, MessageKind, SessionSummary, Theme};

/// Aggregate counts over the saved chats.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DbStats {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub latest_activity: Option<String>,
}

#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp in database: {}", s))?
        .with_timezone(&Utc))
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl ChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a session under `name`, replacing any previous copy and all of its messages.
    pub async fn save_session(
        &self,
        session: &ChatSession,
        name: &str,
        description: &str,
    ) -> Result<()> {
        let metadata = serde_json::json!({
            "theme": session.theme.as_str(),
            "model_name": session.model_name,
        });

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chat_sessions (id, name, description, created_at, updated_at,
                                       message_count, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at,
                message_count = excluded.message_count,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&session.id)
        .bind(name)
        .bind(description)
        .bind(format_ts(&session.created_at))
        .bind(format_ts(&session.updated_at))
        .bind(session.messages.len() as i64)
        .bind(metadata.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        for (position, message) in session.messages.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO messages (id, session_id, position, content, kind, created_at, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&message.id)
            .bind(&session.id)
            .bind(position as i64)
            .bind(&message.content)
            .bind(message.kind.as_str())
            .bind(format_ts(&message.timestamp))
            .bind(message.metadata.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            session_id = %session.id,
            messages = session.messages.len(),
            "saved chat session"
        );
        Ok(())
    }

    /// Load a saved session with its messages in conversation order.
    pub async fn load_session(&self, id: &str) -> Result<Option<ChatSession>> {
        let row = sqlx::query(
            "SELECT id, name, created_at, updated_at, metadata_json FROM chat_sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let metadata_json: String = row.get("metadata_json");
        let metadata: serde_json::Value =
            serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({}));
        let model_name = metadata
            .get("model_name")
            .and_then(|v| v.as_str())
            .unwrap_or("flan-t5-base")
            .to_string();
        let theme = metadata
            .get("theme")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Theme>().ok())
            .unwrap_or_default();

        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        let message_rows = sqlx::query(
            "SELECT id, content, kind, created_at, metadata_json FROM messages \
             WHERE session_id = ? ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(message_rows.len());
        for m in &message_rows {
            let kind: String = m.get("kind");
            let ts: String = m.get("created_at");
            let meta: String = m.get("metadata_json");
            messages.push(Message {
                id: m.get("id"),
                kind: kind.parse::<MessageKind>()?,
                content: m.get("content"),
                timestamp: parse_ts(&ts)?,
                metadata: serde_json::from_str(&meta).unwrap_or(serde_json::json!({})),
            });
        }

        Ok(Some(ChatSession {
            id: row.get("id"),
            name: Some(row.get("name")),
            messages,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
            theme,
            model_name,
        }))
    }

    /// All saved sessions, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at, updated_at, message_count \
             FROM chat_sessions ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SessionSummary {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
                message_count: row.get("message_count"),
            })
            .collect())
    }

    /// Delete a session and its messages. Returns `true` if a session row was removed.
    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Messages first (foreign key)
        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Case-insensitive substring search across all saved messages, newest first.
    pub async fn search_messages(&self, query: &str, limit: i64) -> Result<Vec<MessageHit>> {
        let rows = sqlx::query(
            r#"
            SELECT m.content, m.kind, m.created_at, s.name, s.id
            FROM messages m
            JOIN chat_sessions s ON m.session_id = s.id
            WHERE m.content LIKE ? ESCAPE '\'
            ORDER BY m.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(like_pattern(query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.get("kind");
            hits.push(MessageHit {
                content: row.get("content"),
                kind: kind.parse()?,
                timestamp: row.get("created_at"),
                session_name: row.get("name"),
                session_id: row.get("id"),
            });
        }
        Ok(hits)
    }

    pub async fn statistics(&self) -> Result<DbStats> {
        let total_sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_sessions")
            .fetch_one(&self.pool)
            .await?;
        let total_messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        let latest_activity: Option<String> = sqlx::query_scalar(
            "SELECT updated_at FROM chat_sessions ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(DbStats {
            total_sessions,
            total_messages,
            latest_activity,
        })
    }
}
