//! mart - Shosha Mart branch replica
//!
//! Serves the local POS API over the branch store and keeps the store in sync
//! with upstream in the background. Every mutation lands locally first.

mod cli;
mod commands;
mod config;
mod error;
mod routes;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::prune::run_prune;
use crate::commands::serve::run_serve;
use crate::commands::summary::run_summary;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::config::SidecarConfig;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mart_sidecar=info".parse().expect("valid directive"))
                .add_directive("mart_core=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let config = SidecarConfig::from_env()?.with_cli(&cli)?;

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => run_serve(bind, &config).await?,
        Commands::Sync { timeout } => run_sync(timeout, &config).await?,
        Commands::Summary { json } => run_summary(json, &config).await?,
        Commands::Prune => run_prune(&config).await?,
        Commands::Conflicts { limit, json } => run_sync_conflicts(limit, json, &config).await?,
    }

    Ok(())
}
