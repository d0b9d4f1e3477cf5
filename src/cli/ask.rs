use super::{build_orchestrator, load_notes, print_response};
use anyhow::{Result, bail};
use huddle_core::{ConfigManager, RequestContext};
use std::path::{Path, PathBuf};

/// Handle the ask command - route one question and exit
pub async fn handle_ask_command(
    manager: &ConfigManager,
    workspace: &Path,
    prompt: &str,
    notes: &[PathBuf],
) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("No prompt provided. Use: huddle ask \"What did we decide about the launch?\"");
    }

    let mut context = RequestContext::new();
    context.documents = load_notes(notes)?;

    let orchestrator = build_orchestrator(manager, workspace)?;
    let outcome = orchestrator.route(prompt, &context).await;
    orchestrator.shutdown().await;

    print_response(&outcome?);
    Ok(())
}
