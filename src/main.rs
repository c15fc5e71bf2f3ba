//! # Flightdeck CLI (`fdk`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fdk ingest <folder>...` | Index every `*.json` file in the folders |
//! | `fdk query "<prompt>" [--out PATH]` | Retrieve and extract matching records |
//! | `fdk export --airline A --training-type T --out PATH` | Write matching records to Parquet |
//!
//! Settings come from `--config` (default `./config/fdk.toml`), a `.env`
//! file and the environment. Set `RUST_LOG=debug` for detailed logs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use flightdeck::{config, ingest, query};

/// Flightdeck: search and normalize pilot training records.
#[derive(Parser)]
#[command(
    name = "fdk",
    about = "Flightdeck: semantic search and normalized extraction over pilot training JSON records",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Defaults to `./config/fdk.toml` when present. Environment variables
    /// override file settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index and manifest from JSON files.
    ///
    /// Each folder is scanned non-recursively for `*.json` files.
    Ingest {
        /// Folders to scan.
        #[arg(required = true)]
        folders: Vec<PathBuf>,
    },

    /// Run a natural-language query.
    ///
    /// Prints a table, or writes Parquet when `--out` ends in `.parquet`.
    Query {
        /// The request, e.g. "Show me AirTransat training records".
        prompt: String,

        /// Output file.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Export records for one airline and training type to Parquet.
    Export {
        #[arg(long)]
        airline: String,

        #[arg(long)]
        training_type: String,

        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { folders } => {
            ingest::run_ingest(&cfg, &folders).await?;
        }
        Commands::Query { prompt, out } => {
            query::run_query(&cfg, &prompt, out).await?;
        }
        Commands::Export {
            airline,
            training_type,
            out,
        } => {
            query::run_export(&cfg, &airline, &training_type, &out).await?;
        }
    }

    Ok(())
}
