//! Retrieval over saved conversations.
//!
//! Saved messages are embedded into the `message_vectors` table (one row per
//! message, keyed by `"{session_id}_{position}"`) and ranked by cosine
//! similarity at query time. Without an embedding provider, or when vector
//! search fails, retrieval degrades to the store's substring search.
//!
//! The retrieved snippets are folded into a prompt by
//! [`RagService::build_context_prompt`]:
//!
//! ```text
//! Context from previous conversations:
//! Relevant information from previous conversations:
//! 1. <snippet>
//! 2. <snippet>
//!
//! Current question: <query>
//!
//! Please answer the current question, using the context above if relevant:
//! ```

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::Row;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::{ContextHit, HitSource, MessageKind};
use crate::store::{format_ts, ChatStore};
use crate::text::{calculate_similarity, take_chars};

/// Relevance assigned to substring-search hits, which carry no score.
const TEXT_SEARCH_RELEVANCE: f64 = 0.5;

/// Word overlap at or above which a hit repeats an earlier one.
const NEAR_DUPLICATE: f64 = 0.9;

/// Messages kept from each end of a conversation in [`RagService::session_summary`].
const SUMMARY_EDGE: usize = 3;
const SUMMARY_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct RagStats {
    pub vector_search_available: bool,
    pub embedding_model: Option<String>,
    pub indexed_documents: i64,
    pub total_sessions: i64,
    pub total_messages: i64,
    pub latest_activity: Option<String>,
}

pub struct RagService {
    store: ChatStore,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    config: RetrievalConfig,
    batch_size: usize,
}

struct PendingMessage {
    doc_id: String,
    position: i64,
    kind: MessageKind,
    content: String,
    created_at: String,
    hash: String,
}

impl RagService {
    /// `provider = None` means text search only.
    pub fn new(
        store: ChatStore,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        config: RetrievalConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            batch_size: batch_size.max(1),
        }
    }

    pub fn vector_search_available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed the substantial messages of a saved session.
    ///
    /// Returns `false` when vector search is unavailable, the session does not
    /// exist, or none of its messages is long enough to index.
    pub async fn index_session(&self, session_id: &str) -> Result<bool> {
        let Some(provider) = &self.provider else {
            return Ok(false);
        };
        let Some(session) = self.store.load_session(session_id).await? else {
            return Ok(false);
        };

        let model = provider.model_name().to_string();
        let pool = self.store.pool();

        let qualifying: Vec<PendingMessage> = session
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.content.trim().chars().count() > self.config.min_index_chars)
            .map(|(i, m)| PendingMessage {
                doc_id: format!("{}_{}", session_id, i),
                position: i as i64,
                kind: m.kind,
                content: m.content.clone(),
                created_at: format_ts(&m.timestamp),
                hash: hash_text(&m.content),
            })
            .collect();

        // Drop rows for messages that no longer exist or no longer qualify
        sqlx::query("DELETE FROM message_vectors WHERE session_id = ? AND position >= ?")
            .bind(session_id)
            .bind(session.messages.len() as i64)
            .execute(pool)
            .await?;
        for (i, m) in session.messages.iter().enumerate() {
            if m.content.trim().chars().count() <= self.config.min_index_chars {
                sqlx::query("DELETE FROM message_vectors WHERE doc_id = ?")
                    .bind(format!("{}_{}", session_id, i))
                    .execute(pool)
                    .await?;
            }
        }

        if qualifying.is_empty() {
            return Ok(false);
        }

        let mut pending = Vec::new();
        for item in qualifying {
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT hash FROM message_vectors WHERE doc_id = ? AND model = ?",
            )
            .bind(&item.doc_id)
            .bind(&model)
            .fetch_optional(pool)
            .await?;

            if existing.as_deref() != Some(item.hash.as_str()) {
                pending.push(item);
            }
        }

        let mut embedded = 0usize;
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.content.clone()).collect();
            let vectors = provider.embed(&texts).await?;
            if vectors.len() != batch.len() {
                anyhow::bail!(
                    "embedding provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                );
            }

            for (item, vec) in batch.iter().zip(vectors.iter()) {
                self.upsert_vector(session_id, item, &model, vec).await?;
                embedded += 1;
            }
        }

        tracing::debug!(session_id, embedded, model = %model, "indexed chat session");
        Ok(true)
    }

    async fn upsert_vector(
        &self,
        session_id: &str,
        item: &PendingMessage,
        model: &str,
        vec: &[f32],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO message_vectors (doc_id, session_id, position, kind, content,
                                         created_at, model, dims, hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(doc_id) DO UPDATE SET
                session_id = excluded.session_id,
                position = excluded.position,
                kind = excluded.kind,
                content = excluded.content,
                created_at = excluded.created_at,
                model = excluded.model,
                dims = excluded.dims,
                hash = excluded.hash,
                embedding = excluded.embedding
            "#,
        )
        .bind(&item.doc_id)
        .bind(session_id)
        .bind(item.position)
        .bind(item.kind.as_str())
        .bind(&item.content)
        .bind(&item.created_at)
        .bind(model)
        .bind(vec.len() as i64)
        .bind(&item.hash)
        .bind(embedding::vec_to_blob(vec))
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    /// Index every saved session; returns how many were indexed.
    pub async fn index_all(&self) -> Result<usize> {
        if self.provider.is_none() {
            return Ok(0);
        }

        let mut indexed = 0;
        for summary in self.store.list_sessions().await? {
            match self.index_session(&summary.id).await {
                Ok(true) => indexed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(session_id = %summary.id, error = %e, "failed to index session")
                }
            }
        }
        Ok(indexed)
    }

    /// The most relevant prior messages for `query`.
    pub async fn relevant_context(&self, query: &str, max_results: usize) -> Vec<ContextHit> {
        if let Some(provider) = &self.provider {
            match self.vector_search(provider.as_ref(), query, max_results).await {
                Ok(hits) => return hits,
                Err(e) => {
                    tracing::warn!(error = %e, "vector search failed, falling back to text search")
                }
            }
        }

        match self.text_search(query, max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "text search failed");
                Vec::new()
            }
        }
    }

    async fn vector_search(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ContextHit>> {
        let query_vec = embedding::embed_query(provider, query).await?;

        // Fetch all vectors and compute cosine similarity in Rust
        let rows = sqlx::query(
            r#"
            SELECT v.session_id, v.kind, v.content, v.created_at, v.embedding, s.name
            FROM message_vectors v
            LEFT JOIN chat_sessions s ON s.id = v.session_id
            WHERE v.model = ?
            "#,
        )
        .bind(provider.model_name())
        .fetch_all(self.store.pool())
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let kind: String = row.get("kind");
            hits.push(ContextHit {
                content: row.get("content"),
                session_id: row.get("session_id"),
                session_name: row.get("name"),
                kind: kind.parse()?,
                timestamp: row.get("created_at"),
                relevance: embedding::cosine_similarity(&query_vec, &vec) as f64,
                source: HitSource::VectorSearch,
            });
        }

        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut hits = drop_near_duplicates(hits);
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn text_search(&self, query: &str, max_results: usize) -> Result<Vec<ContextHit>> {
        let limit = (max_results as i64).min(self.config.text_search_limit);
        let hits = self.store.search_messages(query, limit).await?;
        Ok(drop_near_duplicates(
            hits.into_iter()
                .map(|h| ContextHit {
                    content: h.content,
                    session_id: h.session_id,
                    session_name: Some(h.session_name),
                    kind: h.kind,
                    timestamp: h.timestamp,
                    relevance: TEXT_SEARCH_RELEVANCE,
                    source: HitSource::TextSearch,
                })
                .collect(),
        ))
    }

    /// Wrap `query` with snippets from prior conversations, or return it unchanged
    /// when nothing relevant is found.
    pub async fn build_context_prompt(&self, query: &str, max_context_chars: usize) -> String {
        let hits = self.relevant_context(query, self.config.max_results).await;
        format_context_prompt(query, &hits, self.config.snippet_chars, max_context_chars)
    }

    /// Snippets relevant to `query` as a numbered block, for use as model context.
    pub async fn context_block(&self, query: &str) -> Option<String> {
        let hits = self.relevant_context(query, self.config.max_results).await;
        format_context_block(&hits, self.config.snippet_chars, self.config.max_context_chars)
    }

    /// The first and last few messages of a saved session, one line each, joined by `" | "`.
    pub async fn session_summary(&self, session_id: &str) -> Result<String> {
        let Some(session) = self.store.load_session(session_id).await? else {
            return Ok(String::new());
        };

        let messages = &session.messages;
        let key_messages: Vec<_> = if messages.len() <= SUMMARY_EDGE * 2 {
            messages.iter().collect()
        } else {
            messages[..SUMMARY_EDGE]
                .iter()
                .chain(messages[messages.len() - SUMMARY_EDGE..].iter())
                .collect()
        };

        Ok(key_messages
            .iter()
            .map(|m| {
                let label = if m.kind == MessageKind::User {
                    "User"
                } else {
                    "Bot"
                };
                format!("{}: {}", label, take_chars(&m.content, SUMMARY_CHARS))
            })
            .collect::<Vec<_>>()
            .join(" | "))
    }

    /// Delete a session's vectors. Returns `true` if any rows were removed.
    pub async fn remove_session(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM message_vectors WHERE session_id = ?")
            .bind(session_id)
            .execute(self.store.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn statistics(&self) -> Result<RagStats> {
        let db = self.store.statistics().await?;
        let indexed_documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM message_vectors")
            .fetch_one(self.store.pool())
            .await?;

        Ok(RagStats {
            vector_search_available: self.vector_search_available(),
            embedding_model: self.provider.as_ref().map(|p| p.model_name().to_string()),
            indexed_documents,
            total_sessions: db.total_sessions,
            total_messages: db.total_messages,
            latest_activity: db.latest_activity,
        })
    }
}

/// The numbered snippet block, or `None` when there are no hits.
///
/// Each snippet is cut to `snippet_chars` and the whole block to
/// `max_context_chars`, with `"..."` marking every cut.
pub fn format_context_block(
    hits: &[ContextHit],
    snippet_chars: usize,
    max_context_chars: usize,
) -> Option<String> {
    if hits.is_empty() {
        return None;
    }

    let mut parts = vec!["Relevant information from previous conversations:".to_string()];
    for (i, hit) in hits.iter().enumerate() {
        let content = if hit.content.chars().count() > snippet_chars {
            format!("{}...", take_chars(&hit.content, snippet_chars))
        } else {
            hit.content.clone()
        };
        parts.push(format!("{}. {}", i + 1, content));
    }

    let context = parts.join("\n");
    if context.chars().count() > max_context_chars {
        Some(format!("{}...", take_chars(&context, max_context_chars)))
    } else {
        Some(context)
    }
}

/// Render the context-enhanced prompt for a set of hits.
pub fn format_context_prompt(
    query: &str,
    hits: &[ContextHit],
    snippet_chars: usize,
    max_context_chars: usize,
) -> String {
    match format_context_block(hits, snippet_chars, max_context_chars) {
        Some(context) => format!(
            "Context from previous conversations:\n{}\n\nCurrent question: {}\n\n\
             Please answer the current question, using the context above if relevant:",
            context, query
        ),
        None => query.to_string(),
    }
}

/// Keep the first of any hits whose contents are near-identical.
fn drop_near_duplicates(hits: Vec<ContextHit>) -> Vec<ContextHit> {
    let mut kept: Vec<ContextHit> = Vec::with_capacity(hits.len());
    for hit in hits {
        if !kept
            .iter()
            .any(|k| calculate_similarity(&k.content, &hit.content) >= NEAR_DUPLICATE)
        {
            kept.push(hit);
        }
    }
    kept
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(content: &str) -> ContextHit {
        ContextHit {
            content: content.to_string(),
            session_id: "s".to_string(),
            session_name: None,
            kind: MessageKind::User,
            timestamp: String::new(),
            relevance: 0.5,
            source: HitSource::TextSearch,
        }
    }

    #[test]
    fn test_near_duplicates_dropped() {
        let hits = vec![
            hit("Hello! How can I help?"),
            hit("hello! how can I help?"),
            hit("Gravity pulls things together"),
        ];
        let kept = drop_near_duplicates(hits);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].content, "Hello! How can I help?");
        assert_eq!(kept[1].content, "Gravity pulls things together");
    }

    #[test]
    fn test_no_hits_returns_query() {
        assert_eq!(format_context_prompt("why?", &[], 200, 1000), "why?");
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = format_context_prompt("What is Rust?", &[hit("Rust is a language")], 200, 1000);
        assert_eq!(
            prompt,
            "Context from previous conversations:\n\
             Relevant information from previous conversations:\n\
             1. Rust is a language\n\n\
             Current question: What is Rust?\n\n\
             Please answer the current question, using the context above if relevant:"
        );
    }

    #[test]
    fn test_snippets_truncated() {
        let long = "x".repeat(250);
        let prompt = format_context_prompt("q", &[hit(&long)], 200, 1000);
        assert!(prompt.contains(&format!("1. {}...", "x".repeat(200))));
        assert!(!prompt.contains(&"x".repeat(201)));
    }

    #[test]
    fn test_context_block_capped() {
        let hits: Vec<ContextHit> = (0..3).map(|_| hit(&"y".repeat(200))).collect();
        let prompt = format_context_prompt("q", &hits, 200, 100);
        let block = prompt
            .strip_prefix("Context from previous conversations:\n")
            .unwrap()
            .split("\n\nCurrent question:")
            .next()
            .unwrap();
        assert_eq!(block.chars().count(), 103);
        assert!(block.ends_with("..."));
    }

    #[test]
    fn test_block_numbering() {
        let block = format_context_block(&[hit("first one"), hit("second one")], 200, 1000);
        assert_eq!(
            block.as_deref(),
            Some("Relevant information from previous conversations:\n1. first one\n2. second one")
        );
        assert!(format_context_block(&[], 200, 1000).is_none());
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_text("abc"), hash_text("abc"));
        assert_ne!(hash_text("abc"), hash_text("abd"));
    }
}
