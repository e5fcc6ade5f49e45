//! # SmartBot
//!
//! A self-hosted chat assistant backed by a small local language model,
//! with SQLite persistence and retrieval over previously saved chats.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Browser  │──▶│  HTTP (axum) │──▶│ ChatService  │
//! │  / CLI   │   │   server     │   │  sessions    │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │
//!                 ┌────────────────────────┼───────────────────┐
//!                 ▼                        ▼                   ▼
//!          ┌────────────┐          ┌──────────────┐     ┌────────────┐
//!          │ ModelMgr   │          │ RagService   │────▶│  SQLite    │
//!          │ Ollama/OAI │          │ vectors+text │     │ ChatStore  │
//!          │ fallback   │          └──────────────┘     └────────────┘
//!          └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! smartbot init                       # create database
//! smartbot serve                      # open http://127.0.0.1:8501
//! smartbot ask "What is 25 * 4?"      # one-off question
//! smartbot sessions list              # saved chats
//! smartbot search "photosynthesis"    # retrieval preview
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`store`] | Saved chat persistence |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`rag`] | Indexing and retrieval over saved chats |
//! | [`llm`] | Language model backends and selection |
//! | [`session`] | Live in-memory sessions and preferences |
//! | [`chat`] | Chat turn orchestration |
//! | [`server`] / [`ui`] | HTTP API and the browser client |
//! | [`commands`] | CLI command implementations |

pub mod chat;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod rag;
pub mod server;
pub mod session;
pub mod store;
pub mod text;
pub mod theme;
pub mod ui;
