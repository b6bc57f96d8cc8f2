//! Cairn CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(about = "Configuration-as-code workspace inspector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Workspace root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and merge all sources, reporting syntax errors and conflicts
    Check,
    /// Rebuild the stored state from the sources
    Index,
    /// Show the stored state
    State {
        /// List every element with its source paths
        #[arg(short, long)]
        list: bool,

        /// Report sources not updated within this many hours
        #[arg(long)]
        stale_hours: Option<i64>,
    },
    /// Delete the stored state
    Clear,
    /// Show version
    Version,
}

const LOG_TARGETS: &[&str] = &["cairn", "cairn_core", "cairn_parser", "cairn_merge", "cairn_fetch"];

/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS.iter().map(|t| format!("{t}={level}")).collect();
        tracing_subscriber::EnvFilter::new(directives.join(","))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!(root = %cli.root.display(), "cairn {}", env!("CARGO_PKG_VERSION"));

    let root = cli.root;
    match cli.command {
        Commands::Check => commands::check(root).await,
        Commands::Index => commands::index(root).await,
        Commands::State { list, stale_hours } => commands::state(root, list, stale_hours),
        Commands::Clear => commands::clear(root),
        Commands::Version => {
            println!("cairn {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
