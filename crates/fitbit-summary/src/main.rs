use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fitbit_summary::cli::commands::{self, ingest::IngestArgs, StoreTarget};
use fitbit_summary::cli::OutputFormat;
use fitbit_summary::config::IngestConfig;
use fitbit_summary::ingest::DEFAULT_CONCURRENCY;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fitbit-summary")]
#[command(author, version, about = "Aggregate Fitbit exports into daily summary rows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate export files and upsert one row per usage id and date
    Ingest {
        /// Only list objects under this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Maximum number of objects to list
        #[arg(long)]
        limit: Option<usize>,
        /// Groups extracted in parallel
        #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Extract rows without writing them
        #[arg(long)]
        dry_run: bool,
        /// Read exports from a local directory instead of the storage bucket
        #[arg(long)]
        local: Option<PathBuf>,
        /// Write to a local SQLite database (default path when no value is given)
        #[arg(long)]
        sqlite: Option<Option<PathBuf>>,
        /// Do not print per-group progress
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show summary rows for a usage id
    Summary {
        /// Usage id
        #[arg(short, long)]
        usage_id: String,
        /// Start date (YYYY-MM-DD), inclusive
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: Option<String>,
        /// Read from a local SQLite database (default path when no value is given)
        #[arg(long)]
        sqlite: Option<Option<PathBuf>>,
    },
    /// List usage ids present in the summary table
    Users {
        /// Read from a local SQLite database (default path when no value is given)
        #[arg(long)]
        sqlite: Option<Option<PathBuf>>,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> fitbit_summary::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = match IngestConfig::from_env() {
        Ok(config) => match cli.command {
            Commands::Ingest {
                prefix,
                limit,
                concurrency,
                dry_run,
                local,
                sqlite,
                quiet,
            } => {
                let args = IngestArgs {
                    prefix,
                    limit,
                    concurrency,
                    dry_run,
                    local,
                    store: Some(StoreTarget::from_flag(sqlite)),
                    progress: !quiet,
                };
                commands::ingest(&config, args).await
            }
            Commands::Summary {
                usage_id,
                from,
                to,
                sqlite,
            } => {
                let target = StoreTarget::from_flag(sqlite);
                commands::summary(&config, &target, usage_id, from, to, cli.format).await
            }
            Commands::Users { sqlite } => {
                commands::users(&config, &StoreTarget::from_flag(sqlite), cli.format).await
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", fitbit_summary::error::format_user_error(&e));
        std::process::exit(1);
    }

    Ok(())
}
