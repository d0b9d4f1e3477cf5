use anyhow::{Context, Result};
use console::style;
use huddle_core::HuddleConfig;
use std::path::Path;

/// Handle the init command
pub fn handle_init_command(workspace: &Path, force: bool) -> Result<()> {
    println!("{}", style("Initialize Huddle configuration").blue().bold());
    println!("Workspace: {}", workspace.display());

    let created = HuddleConfig::bootstrap_workspace(workspace, force)
        .with_context(|| "failed to initialize configuration files")?;

    if created.is_empty() {
        println!(
            "{}",
            style("Configuration already present; use --force to overwrite").yellow()
        );
    } else {
        for file in created {
            println!("{} {}", style("created").green(), file);
        }
    }
    Ok(())
}
