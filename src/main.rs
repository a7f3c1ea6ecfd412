//! # Flog CLI (`flog`)
//!
//! The `flog` binary is the primary interface for Flog, a file-backed
//! blogging backend. It provides commands for database initialization,
//! content reconciliation, index statistics, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! flog --config ./flog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `flog init` | Create the content directory, SQLite database, and schema |
//! | `flog sync` | Reconcile the content directory into the index |
//! | `flog serve` | Start the HTTP API server |
//! | `flog stats` | Print index statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database and content directory
//! flog init --config ./flog.toml
//!
//! # Preview what a sync would change
//! flog sync --dry-run --config ./flog.toml
//!
//! # Reconcile Markdown files into the index
//! flog sync --config ./flog.toml
//!
//! # Serve the API
//! flog serve --config ./flog.toml
//! ```

mod comments;
mod config;
mod db;
mod fingerprint;
mod front_matter;
mod migrate;
mod models;
mod platform;
mod posts;
mod scanner;
mod server;
mod stats;
mod sync;
#[cfg(test)]
mod test_util;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Flog CLI — a file-backed blogging backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `flog.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "flog",
    about = "Flog — a file-backed blogging backend",
    version,
    long_about = "Flog treats a directory of Markdown files as the source of truth for a blog: \
    each run of `flog sync` reconciles the directory into a SQLite index, and `flog serve` \
    exposes the index over a JSON API with comments, categories, and an admin surface."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./flog.toml`. Content, database, server, and site
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./flog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the content directory and database schema.
    ///
    /// Creates the content root, the SQLite database file, all required
    /// tables (posts, comments, platform), and seeds the site metadata row
    /// from `[site]`. This command is idempotent — running it multiple
    /// times is safe.
    Init,

    /// Reconcile the content directory into the index.
    ///
    /// Scans the content root for Markdown files, diffs them against the
    /// indexed posts by path and content hash, and applies the resulting
    /// creates, updates, and deletes in one transaction. Posts whose files
    /// have disappeared are removed along with their comments.
    Sync {
        /// Show what would change without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// public and admin JSON endpoints.
    Serve,

    /// Print index statistics.
    ///
    /// Shows post, comment, and view counts, the category breakdown, and
    /// the most recent posts and comments.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            std::fs::create_dir_all(&cfg.content.root)?;
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            platform::ensure_platform(&pool, &cfg.site).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync { dry_run } => {
            sync::run_sync_cli(&cfg, dry_run).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
