//! # Audit Log Search CLI (`logsearch`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `logsearch init` | Create the SQLite database and schema |
//! | `logsearch serve` | Tail the audit log and serve `GET /api/logs` |
//! | `logsearch sync` | Run a single ingestion pass over the log file |
//! | `logsearch search` | Query stored entries from the command line |
//!
//! ## Examples
//!
//! ```bash
//! logsearch --config ./config/logsearch.toml init
//! logsearch serve
//! logsearch search --level ERROR --keyword "login or timeout"
//! logsearch search --start-time "2024-01-01 00:00:00" --order desc --limit 20
//! ```

use audit_logsearch::{config, migrate, server, service, tail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Audit log search: tails an append-only audit log into SQLite and serves
/// filtered keyword search.
#[derive(Parser)]
#[command(name = "logsearch", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/logsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Tail the audit log and start the HTTP query server.
    ///
    /// Runs until interrupted with Ctrl-C.
    Serve,

    /// Ingest the current contents of the audit log once and exit.
    Sync,

    /// Search stored log entries.
    Search {
        /// Exact level to match (case-sensitive), e.g. `ERROR`.
        #[arg(long)]
        level: Option<String>,

        /// Inclusive lower bound, `YYYY-MM-DD HH:MM:SS`.
        #[arg(long)]
        start_time: Option<String>,

        /// Inclusive upper bound, `YYYY-MM-DD HH:MM:SS`.
        #[arg(long)]
        end_time: Option<String>,

        /// Keyword expression: `a and b`, `a or b`, or a plain substring.
        #[arg(long)]
        keyword: Option<String>,

        /// Sort by timestamp: `asc` or `desc`.
        #[arg(long)]
        order: Option<String>,

        /// Maximum number of entries to print.
        #[arg(long)]
        limit: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Sync => {
            tail::run_sync(&cfg).await?;
        }
        Commands::Search {
            level,
            start_time,
            end_time,
            keyword,
            order,
            limit,
        } => {
            let params = service::SearchParams {
                level,
                start_time,
                end_time,
                keyword,
                order,
                limit,
            };
            service::run_search(&cfg, &params).await?;
        }
    }

    Ok(())
}
