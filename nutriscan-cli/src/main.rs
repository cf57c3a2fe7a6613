//! nutriscan CLI: serve the food classifier over HTTP, provision the model,
//! or classify a single image from disk.

mod commands;

use clap::Parser;
use nutriscan_core::config::LoggingConfig;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// nutriscan: identify food ingredients in photos and look up their nutrition
#[derive(Parser, Debug)]
#[command(name = "nutriscan", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory holding `nutriscan.toml`, `data/` and `models/`
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug, PartialEq)]
pub(crate) enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Verify the model artifact, downloading it if missing or corrupt
    FetchModel,
    /// Classify one image file and print the JSON result
    Classify {
        /// Path to the image
        image: PathBuf,
        /// Leave the re-encoded image out of the output
        #[arg(long)]
        no_echo: bool,
    },
}

/// Install stderr and JSON file logging. The returned guard flushes the file
/// writer on drop and must live until exit.
fn init_logging(cli: &Cli, config: &LoggingConfig) -> Option<WorkerGuard> {
    let stderr_filter = match cli.verbose {
        0 if cli.quiet => EnvFilter::new("error"),
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    // JSON file layer for structured logging
    let (json_layer, guard) = if config.file_logging
        && std::fs::create_dir_all(&config.log_dir).is_ok()
    {
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "nutriscan.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());
    let mut config = nutriscan_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    commands::anchor_paths(&mut config, &workspace);

    let _guard = init_logging(&cli, &config.logging);

    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });
    commands::handle_command(command, config).await
}
