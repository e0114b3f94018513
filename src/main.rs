// ABOUTME: Main entry point for dockmate
//
// Binary: dockmate
// Usage: dockmate <COMMAND>
// - list / watch: resource lists, once or live
// - inspect / rm: single resources
// - container / image: lifecycle, export and run
// - logs / shell: container output and interactive shells

use anyhow::{Context, Result};
use clap::Parser;
use dockmate::app::Dockmate;
use dockmate::cli::{self, Commands};
use dockmate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    setup_panic_handler();

    let args = cli::Cli::parse();
    let config = AppConfig::load()?;

    let app = Dockmate::new(config);
    app.startup()
        .await
        .context("Docker is not available. Is the daemon running?")?;

    let result = match args.command {
        Commands::List(list_args) => cli::list::execute(&app, list_args, args.format).await,
        Commands::Watch(watch_args) => cli::watch::execute(&app, watch_args, args.format).await,
        Commands::Inspect(resource) => cli::manage::inspect(&app, resource).await,
        Commands::Rm(resource) => cli::manage::remove(&app, resource, args.format).await,
        Commands::Container(command) => cli::manage::container(&app, command, args.format).await,
        Commands::Image(command) => cli::manage::image(&app, command, args.format).await,
        Commands::Logs(logs_args) => cli::logs::execute(&app, logs_args, args.format).await,
        Commands::Shell(shell_args) => cli::shell::execute(&app, shell_args, args.format).await,
    };

    app.shutdown().await;
    result
}

fn setup_logging() {
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use tracing_subscriber::prelude::*;

    // Create log directory if it doesn't exist
    let log_dir = dirs::home_dir()
        .map(|home| home.join(".dockmate").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".dockmate/logs"));

    let _ = std::fs::create_dir_all(&log_dir);

    // JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "dockmate-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dockmate=info".into());

    match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(file)
                    .with_ansi(false),
            )
            .with(filter)
            .init(),
        Err(e) => {
            eprintln!("Could not open log file {}: {}", log_file.display(), e);
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(false),
                )
                .with(filter)
                .init();
        }
    }
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs in ~/.dockmate/logs for more details.");
    }));
}
