//! # ThinkMesh CLI
//!
//! Command-line shell over the ThinkMesh engine.

mod cli;
mod commands;
mod render;

use clap::Parser;
use thinkmesh_core::EngineConfig;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(windows)]
    let _ = colored::control::set_virtual_terminal(true);

    let cli = Cli::parse();

    // RUST_LOG wins; otherwise warn, or debug with --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?.apply_env_overrides(),
        None => EngineConfig::load()?,
    };
    debug!(loaded_from = ?config.loaded_from, "Configuration loaded");

    match &cli.command {
        Commands::Analyze { task, platform } => {
            commands::analyze::run(task, platform, config, &cli).await?;
        }
        Commands::Run { task, platform, dry_run } => {
            commands::run::run(task, platform, *dry_run, config, &cli).await?;
        }
        Commands::Classify { error } => {
            commands::recover::classify(error, &cli)?;
        }
        Commands::Recover {
            error,
            action,
            attempt,
            platform,
            x,
            y,
            target,
        } => {
            let request = commands::recover::RecoverRequest {
                error,
                action: *action,
                attempt: *attempt,
                platform,
                point: (*x, *y),
                target: target.as_deref(),
            };
            commands::recover::run(request, config, &cli).await?;
        }
        Commands::Config { init, path, save } => {
            let flags = commands::config::ConfigFlags {
                init: *init,
                path: *path,
                save: *save,
            };
            commands::config::run(flags, &config, &cli)?;
        }
    }

    Ok(())
}
