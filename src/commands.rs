//! CLI command implementations.
//!
//! Each `run_*` function backs one `smartbot` subcommand and prints its
//! results to stdout. They build the same [`ChatService`] the web server
//! uses, so the CLI sees exactly what the browser sees.

use anyhow::{bail, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

use crate::chat::ChatService;
use crate::config::Config;
use crate::export::{self, ExportFormat};
use crate::models::HitSource;
use crate::text::{format_file_size, truncate_text};

async fn service(config: &Config) -> Result<ChatService> {
    ChatService::from_config(Arc::new(config.clone())).await
}

/// Ask a single question and print the reply.
///
/// With `save`, the exchange is persisted under that name and indexed.
pub async fn run_ask(
    config: &Config,
    prompt: &str,
    model: Option<&str>,
    no_rag: bool,
    save: Option<&str>,
) -> Result<()> {
    let chat = service(config).await?;

    if let Some(key) = model {
        if !chat.models().set_model(key) {
            bail!(
                "unknown model '{}' (available: {})",
                key,
                chat.models().available_models().join(", ")
            );
        }
    }

    let session = chat.sessions().create_session().await;
    let reply = chat.send(&session.id, prompt, Some(!no_rag)).await?;
    println!("{}", reply.content);

    if let Some(name) = save {
        let saved = chat.save(&session.id, Some(name), None).await?;
        eprintln!("Saved chat {}", saved.id);
    }
    Ok(())
}

pub async fn run_sessions_list(config: &Config) -> Result<()> {
    let chat = service(config).await?;
    let sessions = chat.store().list_sessions().await?;

    if sessions.is_empty() {
        println!("No saved chats.");
        return Ok(());
    }

    for s in &sessions {
        println!("{}  {}", s.id, s.name);
        println!("    messages: {}", s.message_count);
        println!("    updated: {}", s.updated_at);
        if !s.description.is_empty() {
            println!("    description: {}", s.description);
        }
        println!();
    }
    println!("{} saved chat(s)", sessions.len());
    Ok(())
}

pub async fn run_session_show(config: &Config, id: &str) -> Result<()> {
    let chat = service(config).await?;
    let Some(session) = chat.store().load_session(id).await? else {
        bail!("saved chat not found: {}", id);
    };

    println!("--- Chat ---");
    println!("id:         {}", session.id);
    println!("name:       {}", session.name.as_deref().unwrap_or(""));
    println!("created_at: {}", session.created_at.to_rfc3339());
    println!("updated_at: {}", session.updated_at.to_rfc3339());
    println!("summary:    {}", chat.rag().session_summary(id).await?);
    println!();

    println!("--- Messages ({}) ---", session.messages.len());
    for m in &session.messages {
        println!("[{}] {}", m.kind.speaker(), m.content);
    }
    Ok(())
}

pub async fn run_session_delete(config: &Config, id: &str) -> Result<()> {
    let chat = service(config).await?;
    chat.delete(id).await?;
    println!("Deleted chat {}", id);
    Ok(())
}

pub async fn run_export(
    config: &Config,
    id: &str,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let chat = service(config).await?;
    let Some(session) = chat.store().load_session(id).await? else {
        bail!("saved chat not found: {}", id);
    };

    let content = export::export_session(&session, format, Utc::now())?;
    export::write_export(&content, output)
}

/// Search saved chats the way a chat turn would, and show the prompt it builds.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let chat = service(config).await?;
    let rag = chat.rag();
    let limit = limit.unwrap_or(rag.config().max_results);

    let hits = rag.relevant_context(query, limit).await;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let via = match hit.source {
            HitSource::VectorSearch => "vector",
            HitSource::TextSearch => "text",
        };
        println!(
            "{}. [{:.2}] {} ({})",
            i + 1,
            hit.relevance,
            hit.session_name.as_deref().unwrap_or(&hit.session_id),
            via
        );
        println!("    {}: {}", hit.kind.speaker(), truncate_text(&hit.content, 200, "..."));
        println!("    at: {}", hit.timestamp);
        println!();
    }

    println!("--- Prompt ---");
    println!(
        "{}",
        crate::rag::format_context_prompt(
            query,
            &hits,
            rag.config().snippet_chars,
            rag.config().max_context_chars
        )
    );
    Ok(())
}

pub async fn run_index_rebuild(config: &Config) -> Result<()> {
    let chat = service(config).await?;
    if !chat.rag().vector_search_available() {
        println!("index rebuild");
        println!("  vector search disabled; configure [embedding] to build an index");
        return Ok(());
    }

    let indexed = chat.rag().index_all().await?;
    let stats = chat.rag().statistics().await?;
    println!("index rebuild");
    println!("  chats indexed: {}", indexed);
    println!("  vectors stored: {}", stats.indexed_documents);
    Ok(())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let chat = service(config).await?;
    let stats = chat.rag().statistics().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("SmartBot Database Stats");
    println!("=======================");
    println!();
    println!("  Database:        {}", config.db.path.display());
    println!("  Size:            {}", format_file_size(db_size));
    println!();
    println!("  Saved chats:     {}", stats.total_sessions);
    println!("  Messages:        {}", stats.total_messages);
    println!(
        "  Latest activity: {}",
        stats.latest_activity.as_deref().unwrap_or("never")
    );
    println!();
    println!(
        "  Vector search:   {}",
        if stats.vector_search_available {
            "enabled"
        } else {
            "disabled (text search)"
        }
    );
    if let Some(model) = &stats.embedding_model {
        println!("  Embedding model: {}", model);
    }
    println!("  Indexed:         {}", stats.indexed_documents);
    Ok(())
}

pub async fn run_models(config: &Config) -> Result<()> {
    let chat = service(config).await?;
    let current = chat.models().current_key();

    for info in chat.models().model_infos().await {
        let marker = if info.key == current { "*" } else { " " };
        println!(
            "{} {:<16} {:<8} {}",
            marker,
            info.key,
            info.provider,
            if info.available { "available" } else { "offline" }
        );
        if !info.description.is_empty() {
            println!("    {}", info.description);
        }
    }
    Ok(())
}
