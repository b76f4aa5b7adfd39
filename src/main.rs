//! CLI entry point for book-courier.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

mod app_config;
mod cli;
mod progress;
mod prompt;
mod runtime;

use app_config::{Settings, load_default_file_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_default_file_config()?;
    match (&loaded.path, &loaded.config) {
        (Some(path), Some(_)) => debug!(path = %path.display(), "Loaded config file"),
        (Some(path), None) => debug!(path = %path.display(), "No config file; using defaults"),
        (None, _) => debug!("No config directory; using defaults"),
    }
    let settings = Settings::resolve(&args, loaded.config.as_ref())?;
    let credentials = runtime::load_credentials();
    debug!(?settings, ?credentials, "Settings resolved");

    info!("Book courier starting");
    runtime::run(&args, &settings, &credentials).await
}
