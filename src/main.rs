//! Huddle CLI entry point

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use huddle_core::ConfigManager;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "huddle=info,huddle_core=info";
const VERBOSE_LOG_FILTER: &str = "huddle=debug,huddle_core=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let workspace = match args.workspace {
        Some(workspace) => workspace,
        None => std::env::current_dir().context("cannot determine current dir")?,
    };

    match args.command.unwrap_or(Commands::Chat { notes: Vec::new() }) {
        Commands::Init { force } => cli::handle_init_command(&workspace, force),
        Commands::Ask { prompt, notes } => {
            let manager = load_config(args.config.as_deref(), &workspace)?;
            cli::handle_ask_command(&manager, &workspace, &prompt.join(" "), &notes).await
        }
        Commands::Chat { notes } => {
            let manager = load_config(args.config.as_deref(), &workspace)?;
            cli::handle_chat_command(&manager, &workspace, &notes).await
        }
        Commands::Stats => {
            let manager = load_config(args.config.as_deref(), &workspace)?;
            cli::handle_stats_command(&manager, &workspace).await
        }
    }
}

fn load_config(explicit: Option<&Path>, workspace: &Path) -> Result<ConfigManager> {
    let manager = match explicit {
        Some(path) => ConfigManager::load_from_file(path),
        None => ConfigManager::load_from_workspace(workspace),
    }
    .context("Failed to load configuration")?;

    match manager.config_path() {
        Some(path) => debug!(path = %path.display(), "configuration loaded"),
        None => debug!("no huddle.toml found, using defaults"),
    }
    Ok(manager)
}

/// `RUST_LOG` wins unless `--verbose` is given
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
