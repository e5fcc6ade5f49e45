//! # SmartBot CLI (`smartbot`)
//!
//! Starts the web chat server and exposes the saved-chat store, retrieval,
//! and models on the command line.
//!
//! ## Usage
//!
//! ```bash
//! smartbot --config ./config/smartbot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `smartbot init` | Create the SQLite database and run schema migrations |
//! | `smartbot serve` | Start the web chat server |
//! | `smartbot ask "<prompt>"` | Ask one question and print the reply |
//! | `smartbot sessions list` | List saved chats |
//! | `smartbot sessions show <id>` | Print a saved chat |
//! | `smartbot sessions delete <id>` | Delete a saved chat and its vectors |
//! | `smartbot export <id>` | Export a saved chat as txt, md, or json |
//! | `smartbot search "<query>"` | Show what retrieval finds for a query |
//! | `smartbot index rebuild` | Re-embed every saved chat |
//! | `smartbot stats` | Database and index overview |
//! | `smartbot models` | List configured models and their availability |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use smartbot::{commands, config, logging, migrate, server};

/// SmartBot: a self-hosted chat assistant with memory of past conversations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/smartbot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "smartbot",
    about = "SmartBot: a self-hosted chat assistant with memory of past conversations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist, built-in defaults are used and the
    /// database lives at `./data/smartbot.sqlite`.
    #[arg(long, global = true, default_value = "./config/smartbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the web chat server on `[server].bind`.
    Serve,

    /// Ask a single question and print the reply.
    Ask {
        /// The question.
        prompt: String,

        /// Model key from `[model.catalog]`, or `fallback`.
        #[arg(long)]
        model: Option<String>,

        /// Answer without consulting saved chats.
        #[arg(long)]
        no_rag: bool,

        /// Save the exchange as a chat with this name.
        #[arg(long)]
        save: Option<String>,
    },

    /// Manage saved chats.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Export a saved chat.
    Export {
        /// Saved chat id.
        id: String,

        /// Output format: `txt`, `md`, or `json`.
        #[arg(long, default_value = "txt")]
        format: String,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Search saved chats and show the context prompt a chat turn would use.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show database and index statistics.
    Stats,

    /// List configured models and whether they are reachable.
    Models,
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List saved chats, most recently updated first.
    List,
    /// Print a saved chat with its summary.
    Show {
        /// Saved chat id.
        id: String,
    },
    /// Delete a saved chat and its vectors.
    Delete {
        /// Saved chat id.
        id: String,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Re-embed every saved chat, skipping unchanged messages.
    Rebuild,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        config::Config::minimal()
    };

    logging::init(&cfg.logging.level)?;
    if !cli.config.exists() {
        tracing::info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask {
            prompt,
            model,
            no_rag,
            save,
        } => {
            commands::run_ask(&cfg, &prompt, model.as_deref(), no_rag, save.as_deref()).await?;
        }
        Commands::Sessions { action } => match action {
            SessionsAction::List => commands::run_sessions_list(&cfg).await?,
            SessionsAction::Show { id } => commands::run_session_show(&cfg, &id).await?,
            SessionsAction::Delete { id } => commands::run_session_delete(&cfg, &id).await?,
        },
        Commands::Export { id, format, output } => {
            commands::run_export(&cfg, &id, &format, output.as_deref()).await?;
        }
        Commands::Search { query, limit } => {
            commands::run_search(&cfg, &query, limit).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Rebuild => commands::run_index_rebuild(&cfg).await?,
        },
        Commands::Stats => {
            commands::run_stats(&cfg).await?;
        }
        Commands::Models => {
            commands::run_models(&cfg).await?;
        }
    }

    Ok(())
}
