//! Export a conversation as plain text, Markdown, or JSON.
//!
//! Used by the `export` CLI command and the `/api/sessions/{id}/export`
//! download endpoint.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::str::FromStr;

use crate::models::ChatSession;
use crate::text::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Md,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Md => "md",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Md => "text/markdown; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" => Ok(ExportFormat::Txt),
            "md" => Ok(ExportFormat::Md),
            "json" => Ok(ExportFormat::Json),
            other => anyhow::bail!("unknown export format: '{}' (expected txt, md, or json)", other),
        }
    }
}

/// Render `session` in `format`, stamping the header with `now`.
///
/// A session without messages exports as an empty string.
pub fn export_session(
    session: &ChatSession,
    format: ExportFormat,
    now: DateTime<Utc>,
) -> Result<String> {
    if session.messages.is_empty() {
        return Ok(String::new());
    }

    let out = match format {
        ExportFormat::Json => serde_json::to_string_pretty(session)?,
        ExportFormat::Txt => {
            let mut lines = vec![
                format!("Chat Session Export - {}", format_timestamp(&now, true)),
                "=".repeat(50),
            ];
            for m in &session.messages {
                lines.push(format!(
                    "[{}] {}: {}",
                    format_timestamp(&m.timestamp, false),
                    m.kind.speaker(),
                    m.content
                ));
            }
            lines.join("\n")
        }
        ExportFormat::Md => {
            let mut lines = vec![
                "# Chat Session Export".to_string(),
                format!("**Date:** {}", format_timestamp(&now, true)),
                String::new(),
            ];
            for m in &session.messages {
                lines.push(format!(
                    "**[{}] {}:** {}",
                    format_timestamp(&m.timestamp, false),
                    m.kind.speaker(),
                    m.content
                ));
                lines.push(String::new());
            }
            lines.join("\n")
        }
    };
    Ok(out)
}

/// Download name such as `chat_20240309_070501.md`.
pub fn export_filename(format: ExportFormat, now: DateTime<Utc>) -> String {
    format!("chat_{}.{}", now.format("%Y%m%d_%H%M%S"), format.extension())
}

/// Write an export to `output`, or to stdout when no path is given.
pub fn write_export(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, content)?;
            eprintln!("Exported chat to {}", path.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
