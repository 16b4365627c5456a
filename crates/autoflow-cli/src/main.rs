//! CLI entry point for autoflow.
//!
//! This binary provides the `autoflow` command with subcommands for
//! generating workflows, running them, serving the message API over
//! stdin/stdout and inspecting provider state.

mod app;
mod cli;
mod commands;
mod config;
mod serve;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; credentials may come from the real environment.
    let _ = dotenvy::dotenv();
    init_tracing(&cli.log_level, cli.json_logs);

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            description,
            provider,
            url,
            output,
        } => commands::cmd_generate(&config, description, provider, url, output).await,
        Commands::Run { workflow, params } => commands::cmd_run(&config, &workflow, params).await,
        Commands::Serve => serve::cmd_serve(&config).await,
        Commands::Stats => commands::cmd_stats(&config),
        Commands::Providers => commands::cmd_providers(&config).await,
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Logs go to stderr so stdout stays reserved for command output.
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
