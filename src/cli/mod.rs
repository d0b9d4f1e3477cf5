//! Command-line interface module
//!
//! Argument parsing plus one handler per subcommand.

pub mod args;
pub mod ask;
pub mod chat;
pub mod init;
pub mod stats;

pub use args::*;
pub use ask::handle_ask_command;
pub use chat::handle_chat_command;
pub use init::handle_init_command;
pub use stats::handle_stats_command;

use anyhow::{Context, Result};
use console::style;
use huddle_core::{ConfigManager, Orchestrator, RouteResponse, RouteStatus};
use std::path::{Path, PathBuf};

/// Start a runtime from the loaded configuration
pub(crate) fn build_orchestrator(manager: &ConfigManager, workspace: &Path) -> Result<Orchestrator> {
    Orchestrator::builder(manager.config().clone())
        .workspace(workspace)
        .build()
        .context("Failed to start the Huddle runtime")
}

/// Read meeting notes; each blank-line separated block becomes one document
pub(crate) fn load_notes(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut documents = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read notes file: {}", path.display()))?;
        documents.extend(split_notes(&content));
    }
    Ok(documents)
}

fn split_notes(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn print_response(response: &RouteResponse) {
    match response.status {
        RouteStatus::Answered => println!("{}", response.text),
        RouteStatus::NotFound => println!("{}", style(&response.text).yellow()),
        RouteStatus::Guidance => println!("{}", style(&response.text).cyan()),
    }

    let mut footer = format!(
        "{} · {} · {}ms",
        response.source_agent, response.category, response.latency_ms
    );
    if response.served_from_cache {
        footer.push_str(" · cached");
    }
    if response.coalesced {
        footer.push_str(" · batched");
    }
    println!("{}", style(footer).dim());
}
