//! agendacache - a headless shell for shared agendas.
//!
//! Every command reads the offline cache first and refreshes it from the
//! backend when reachable, so listing commands keep working without a
//! connection.

mod app;

use std::io;
use std::path::{Path, PathBuf};

use agendacache_core::Config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Log file prefix inside the state directory
const LOG_FILE_PREFIX: &str = "agendacache.log";

#[derive(Parser, Debug)]
#[command(name = "agendacache")]
#[command(about = "Shared agendas from the terminal, online or offline")]
#[command(version)]
struct Args {
    /// Print machine-readable JSON instead of text where supported
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Create an account
    Signup {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        username: String,
    },
    /// Sign out and wipe the offline cache
    Logout,
    /// Show session, connectivity and cache state
    Status,
    /// List your agendas with urgent and completed items
    Agendas,
    /// Show one agenda
    Agenda { id: String },
    /// Show a profile (your own when no id is given)
    Profile {
        user_id: Option<String>,
        /// Keep polling comments and reactions for this many seconds
        #[arg(long)]
        follow: Option<u64>,
    },
    /// Create an agenda
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Join an agenda with its join key
    Join { id: String, key: String },
    /// Leave an agenda
    Leave { id: String },
    /// Delete an agenda you own
    Delete { id: String },
    /// Add a section to an agenda
    Section { agenda_id: String, name: String },
    /// Add an item to a section
    Add {
        agenda_id: String,
        section_id: String,
        title: String,
        /// RFC 3339 deadline, e.g. 2026-11-01T18:00:00Z
        #[arg(long)]
        deadline: Option<String>,
    },
    /// Delete an item
    Remove { element_id: String },
    /// Mark an item urgent for you
    Urgent {
        element_id: String,
        #[arg(long)]
        off: bool,
    },
    /// Mark an item completed for you
    Done {
        element_id: String,
        #[arg(long)]
        undo: bool,
    },
    /// Comment on an agenda
    Comment { agenda_id: String, text: String },
    /// Drop cached agendas older than a day
    Cleanup,
    /// Permanently delete your account
    DeleteAccount {
        #[arg(long)]
        yes: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_dir = Config::default()
        .base_dir()
        .unwrap_or_else(|_| PathBuf::from("."));
    let _log_guard = init_tracing(&log_dir);
    info!("agendacache starting");

    let mut app = App::new().await?;
    let result = app.run(args.command, args.json).await;

    info!("agendacache shutting down");
    result
}
