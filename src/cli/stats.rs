use super::build_orchestrator;
use anyhow::{Context, Result};
use huddle_core::ConfigManager;
use serde_json::json;
use std::path::Path;

/// Handle the stats command - print a telemetry snapshot of a fresh runtime
pub async fn handle_stats_command(manager: &ConfigManager, workspace: &Path) -> Result<()> {
    let orchestrator = build_orchestrator(manager, workspace)?;
    let config = orchestrator.config();

    let snapshot = json!({
        "config_path": manager.config_path().map(|path| path.display().to_string()),
        "generator": orchestrator.generator_name(),
        "agents": orchestrator.bus().agents(),
        "cache": {
            "enabled": config.cache.enabled,
            "capacity": config.cache.capacity,
            "default_ttl_ms": config.cache.default_ttl_ms,
        },
        "batch": {
            "enabled": config.batch.enabled,
            "window_ms": config.batch.window_ms,
            "max_members": config.batch.max_members,
            "similarity_threshold": config.batch.similarity_threshold,
        },
        "stats": orchestrator.stats(),
    });
    orchestrator.shutdown().await;

    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("failed to serialize stats")?
    );
    Ok(())
}
