//! MedLit CLI — tiered biomedical literature search from the terminal.

mod commands;
mod render;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// MedLit: evidence-aware biomedical literature search
#[derive(Parser, Debug)]
#[command(name = "medlit", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (for `.medlit/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Keyword vocabulary file (TOML or JSON) replacing the built-in tables
    #[arg(long)]
    vocabulary: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Search the literature
    Search {
        /// Free-text query
        query: String,

        /// Maximum number of results (defaults to the configured value)
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Restrict to these sources (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        sources: Option<Vec<String>>,

        /// Print the result set as JSON
        #[arg(long)]
        json: bool,

        /// Also print the tier state transitions
        #[arg(long)]
        trace: bool,
    },
    /// Show how a query is classified
    Analyze {
        query: String,

        #[arg(long)]
        json: bool,
    },
    /// Show the tiered search strategy without searching
    Plan {
        query: String,

        #[arg(short, long, value_delimiter = ',')]
        sources: Option<Vec<String>>,

        #[arg(long)]
        json: bool,
    },
    /// List the configured literature sources
    Sources,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("org", "medlit", "medlit")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "medlit.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = medlit_core::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(path) = cli.vocabulary {
        config.vocabulary_path = Some(path);
    }
    if !medlit_core::config::config_exists(Some(&workspace)) {
        tracing::debug!("No configuration file found, using defaults");
    }

    commands::handle_command(cli.command, config).await
}
