//! # notesort CLI
//!
//! The `notesort` binary drives the four pipeline stages and lets you
//! inspect their snapshots.
//!
//! ## Usage
//!
//! ```bash
//! notesort --config ./config/notesort.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `notesort ingest` | Capture inbox notes into `notes.json` and move the sources |
//! | `notesort extract` | Classify every note into `extractions.json` |
//! | `notesort normalize` | Consolidate raw labels into `taxonomy.json` |
//! | `notesort index` | Build `index.json` from extractions and taxonomy |
//! | `notesort run` | All of the above, in order |
//! | `notesort status` | Snapshot overview and consistency audit |
//! | `notesort show [category]` | Browse the category index |
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. `RUST_LOG` sets the filter
//! (default `notesort=info`); `LOG_FORMAT=json` switches to JSON lines.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notesort::progress::ProgressMode;
use notesort::{config, extraction, index, ingest, normalize, pipeline, show, status};

/// notesort: turn a pile of free-text notes into a category-indexed
/// knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/notesort.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "notesort",
    about = "notesort: turn a pile of free-text notes into a category-indexed knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/notesort.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture notes from the inbox.
    ///
    /// Reads every matching source, numbers the notes from 0, writes the
    /// note snapshot and moves the sources to the processed area. An empty
    /// inbox leaves the existing snapshot untouched.
    Ingest {
        /// List what would be ingested without writing or moving anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Classify every note into content fragments with raw category labels.
    Extract {
        /// Override `classifier.concurrency` (calls in flight).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Consolidate the raw label vocabulary into a canonical taxonomy.
    Normalize,

    /// Build the category index from extractions and taxonomy.
    Index,

    /// Run ingest, extract, normalize and index in order.
    Run {
        /// Override `classifier.concurrency` (calls in flight).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show snapshot status and check cross-stage consistency.
    Status,

    /// List categories, or print the entries of one category.
    Show {
        /// Canonical category name (case-insensitive).
        category: Option<String>,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notesort=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Extract { concurrency } => {
            extraction::run_extract(&cfg, concurrency, progress.as_ref()).await?;
        }
        Commands::Normalize => {
            normalize::run_normalize(&cfg).await?;
        }
        Commands::Index => {
            index::run_index(&cfg).await?;
        }
        Commands::Run { concurrency } => {
            pipeline::run_all(&cfg, concurrency, progress.as_ref()).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Show { category, json } => {
            show::run_show(&cfg, category.as_deref(), json).await?;
        }
    }

    Ok(())
}
