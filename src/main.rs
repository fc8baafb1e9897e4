//! # kbdesk CLI (`kbd`)
//!
//! Ask questions against the knowledge base, browse history, rerun answers,
//! and inspect cited fragments from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! kbd --config ./config/kbd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbd login <email>` | Sign in and keep the session token |
//! | `kbd logout` | Sign out and forget the token |
//! | `kbd register <email>` | Create an account |
//! | `kbd me` | Show or update the signed-in profile |
//! | `kbd passwd` | Change the password |
//! | `kbd ask "<question>"` | Ask once and print the answer with sources |
//! | `kbd history` | List past questions |
//! | `kbd show <query_id>` | Show every version of a past question |
//! | `kbd rerun <query_id>` | Generate a new answer version |
//! | `kbd export <version_id>` | Save a version as PDF |
//! | `kbd search "<q>"` | Full-text search over published documents |
//! | `kbd doc [<doc_id> | <link>]` | List documents, open one, or follow a `/doc/` link |
//! | `kbd chat` | Interactive thread with a live evidence panel |
//!
//! Logging goes to stderr and is controlled by `KBD_LOG` (or `RUST_LOG`),
//! e.g. `KBD_LOG=kbdesk=debug kbd ask "..."`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use kbdesk::api::ApiClient;
use kbdesk::history::ShowOptions;
use kbdesk::session::SessionHandle;
use kbdesk::{account, chat, config, docs, history};

/// kbdesk: question answering over a document knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means defaults; `KBD_API_URL` overrides the server.
#[derive(Parser)]
#[command(name = "kbd", version, about = "Terminal client for the knowledge-base assistant")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in. The password is read from KBD_PASSWORD or prompted for.
    Login {
        email: String,
    },

    /// Sign out and forget the stored token.
    Logout,

    /// Create an account.
    Register {
        email: String,

        /// Display name; prompted for when omitted.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show the signed-in user, or change the display name.
    Me {
        #[arg(long)]
        display_name: Option<String>,
    },

    /// Change the password.
    Passwd,

    /// Ask a question and print the answer with its evidence.
    Ask {
        question: String,
    },

    /// List past questions, newest first.
    History {
        /// Maximum number of entries (defaults to `[history].limit`).
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show a past question with all answer versions.
    Show {
        query_id: i64,

        /// Make this version number active (default: latest).
        #[arg(long = "version")]
        version_no: Option<u32>,

        /// Select source S<n> of the active version.
        #[arg(long = "source")]
        source_no: Option<u32>,

        /// Only show the selected source in the evidence panel.
        #[arg(long)]
        selected: bool,
    },

    /// Generate a new answer version for a past question.
    Rerun {
        query_id: i64,
    },

    /// Save an answer version as PDF.
    Export {
        version_id: i64,

        /// Output path (default: answer-<version_id>.pdf).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full-text search over published documents.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// List published documents, open one, or show a fragment in context.
    Doc {
        /// Document id, or a `/doc/{id}?chunk={chunk_id}` link from an evidence card.
        target: Option<String>,

        /// Fragment to show between its neighbours.
        #[arg(long = "chunk", requires = "target")]
        chunk_id: Option<i64>,
    },

    /// Interactive chat with a live evidence panel.
    Chat,

    /// Print shell completions.
    Completions {
        shell: Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("KBD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't need config or a session
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "kbd", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    kbdesk::render::init_color(cfg.display.use_color());
    let session = SessionHandle::open(&cfg.session.resolved_path())?;
    let client = ApiClient::new(&cfg.api, session)?;
    tracing::debug!(base_url = %cfg.api.base_url, "client ready");

    match cli.command {
        Commands::Login { email } => {
            account::run_login(&client, &email).await?;
        }
        Commands::Logout => {
            account::run_logout(&client).await?;
        }
        Commands::Register { email, name } => {
            account::run_register(&client, &email, name).await?;
        }
        Commands::Me { display_name } => {
            account::run_me(&client, display_name).await?;
        }
        Commands::Passwd => {
            account::run_passwd(&client).await?;
        }
        Commands::Ask { question } => {
            account::require_access(client.session(), false)?;
            chat::run_ask(&client, &question).await?;
        }
        Commands::History { limit } => {
            account::require_access(client.session(), false)?;
            history::run_history(&cfg, &client, limit).await?;
        }
        Commands::Show {
            query_id,
            version_no,
            source_no,
            selected,
        } => {
            account::require_access(client.session(), false)?;
            let options = ShowOptions {
                version_no,
                source_no,
                selected_only: selected,
            };
            history::run_show(&client, query_id, &options).await?;
        }
        Commands::Rerun { query_id } => {
            account::require_access(client.session(), false)?;
            history::run_rerun(&client, query_id).await?;
        }
        Commands::Export { version_id, output } => {
            account::require_access(client.session(), false)?;
            history::run_export(&client, version_id, output).await?;
        }
        Commands::Search { query, limit } => {
            account::require_access(client.session(), false)?;
            docs::run_search(&cfg, &client, &query, limit).await?;
        }
        Commands::Doc { target, chunk_id } => {
            account::require_access(client.session(), false)?;
            docs::run_doc(&client, target.as_deref(), chunk_id).await?;
        }
        Commands::Chat => {
            account::require_access(client.session(), false)?;
            chat::run_chat(&client).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
