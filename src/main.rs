use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mnemo::cli;
use mnemo::config::MnemoConfig;
use mnemo::service::MemoryService;

#[derive(Parser)]
#[command(name = "mnemo", version, about = "Conversational memory — hybrid session recall and sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the memory store and default config
    Init,
    /// Show store counts, size, and sync state
    Status,
    /// List sessions, newest first
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Only archived sessions
        #[arg(long)]
        archived: bool,
    },
    /// Lexical search over session titles, summaries, and keywords
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Archive (or unarchive) a session
    Archive {
        id: String,
        #[arg(long)]
        undo: bool,
    },
    /// Delete a session and all its messages
    Delete { id: String },
    /// Export all sessions and messages as JSON to stdout
    Export,
    /// Recall relevant past sessions
    Recall {
        /// Explicit query text (omit to recall nothing — the library derives
        /// context queries from an active session)
        #[arg(long)]
        query: Option<String>,
        /// Override the configured max result count
        #[arg(long)]
        limit: Option<usize>,
        /// Include recent messages from each recalled session
        #[arg(long)]
        context: bool,
    },
    /// Reconcile with the configured replica
    Sync {
        #[command(subcommand)]
        action: Option<SyncAction>,
        /// Re-upload sessions that are already synced
        #[arg(long)]
        force: bool,
    },
    /// Re-index one session
    Index { id: String },
    /// Index every session that was never indexed
    IndexAll {
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Show per-session sync state and recent log entries
    Status,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.mnemo/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = MnemoConfig::load()?;

    // Initialize tracing with the configured log level, to stderr so stdout
    // stays clean for exported JSON.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Init => {
            cli::init(&config)?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
        command => {
            let service = MemoryService::open(config)?;
            match command {
                Command::Status => cli::status::status(&service)?,
                Command::List { limit, archived } => {
                    let filter = if archived { Some(true) } else { None };
                    cli::sessions::list(&service, limit, filter)?;
                }
                Command::Search { query, limit } => {
                    cli::sessions::search(&service, &query, limit)?;
                }
                Command::Archive { id, undo } => {
                    cli::sessions::archive(&service, &id, undo)?;
                }
                Command::Delete { id } => {
                    cli::sessions::delete(&service, &id)?;
                }
                Command::Export => cli::export::export(&service)?,
                Command::Recall {
                    query,
                    limit,
                    context,
                } => {
                    cli::recall::recall(&service, query, limit, context).await?;
                }
                Command::Sync { action, force } => match action {
                    Some(SyncAction::Status) => cli::sync::sync_status(&service, 20)?,
                    None => cli::sync::sync_now(&service, force).await?,
                },
                Command::Index { id } => {
                    let outcome = service.index_session(&id, true).await?;
                    println!("Indexed {id}: {outcome:?}");
                }
                Command::IndexAll { limit } => {
                    let count = service.index_all(limit).await?;
                    println!("Indexed {count} sessions.");
                }
                Command::Init | Command::Model { .. } => unreachable!(),
            }
            service.close().await?;
        }
    }

    Ok(())
}
