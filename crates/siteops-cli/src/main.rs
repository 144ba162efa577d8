//! SiteOps CLI - capture field records offline and sync them when the API is
//! reachable.

mod auth;
mod cli;
mod commands;
mod error;
mod network;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::capture::run_capture;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::prune::run_prune;
use crate::commands::queue::run_queue;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "siteops=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let config_path = cli.config;

    match cli.command {
        Some(Commands::Capture { record }) => run_capture(record, &db_path).await?,
        Some(Commands::Queue {
            category,
            pending,
            json,
        }) => run_queue(category, pending, json, &db_path).await?,
        Some(Commands::Status { json }) => {
            run_status(json, &db_path, config_path.as_deref()).await?;
        }
        Some(Commands::Sync { offline }) => {
            run_sync(offline, &db_path, config_path.as_deref()).await?;
        }
        Some(Commands::Watch { recheck_secs }) => {
            run_watch(recheck_secs, &db_path, config_path.as_deref()).await?;
        }
        Some(Commands::Prune { json }) => {
            run_prune(json, &db_path, config_path.as_deref()).await?;
        }
        Some(Commands::Auth { command }) => run_auth(command)?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
