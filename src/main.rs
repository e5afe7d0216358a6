use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod infrastructure;
mod runtime;
mod ui;

use cli::{Cli, Commands};
use commands::{config_cmd, down, status, up, validate};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false) // Disable ANSI escape codes for cleaner output
        .init();

    match cli.command {
        Commands::Validate { file } => {
            validate::execute(file).await?;
        }
        Commands::Config { file } => {
            config_cmd::execute(file).await?;
        }
        Commands::Up { file, state_file } => {
            up::execute(file, state_file).await?;
        }
        Commands::Down { file, volumes } => {
            down::execute(file, volumes).await?;
        }
        Commands::Status { state_file } => {
            status::execute(state_file).await?;
        }
    }

    Ok(())
}
