use super::{build_orchestrator, load_notes, print_response};
use anyhow::{Context, Result};
use console::style;
use huddle_core::{ConfigManager, ConversationTurn, RequestContext};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Handle the chat command
pub async fn handle_chat_command(
    manager: &ConfigManager,
    workspace: &Path,
    notes: &[PathBuf],
) -> Result<()> {
    let orchestrator = build_orchestrator(manager, workspace)?;
    let mut context = RequestContext::new();
    context.documents = load_notes(notes)?;

    println!("{}", style("Huddle interactive session").blue().bold());
    println!("Generator: {}", orchestrator.generator_name());
    if let Some(path) = manager.config_path() {
        println!("Config: {}", path.display());
    }
    if !context.documents.is_empty() {
        println!("Loaded {} meeting notes", context.documents.len());
    }
    println!("{}", style("Type /stats for telemetry, /quit to exit.").dim());
    println!();

    loop {
        print!("{} ", style("you>").green().bold());
        io::stdout().flush().context("failed to flush stdout")?;

        let mut line = String::new();
        let read = io::stdin()
            .read_line(&mut line)
            .context("failed to read input")?;
        if read == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "/quit" | "/exit" => break,
            "/stats" => {
                let stats = serde_json::to_string_pretty(&orchestrator.stats())?;
                println!("{}", stats);
                continue;
            }
            _ => {}
        }

        match orchestrator.route(input, &context).await {
            Ok(response) => {
                print_response(&response);
                if !input.is_empty() {
                    context.history.push(ConversationTurn::user(input));
                    context
                        .history
                        .push(ConversationTurn::assistant(response.text.clone()));
                }
            }
            Err(err) => eprintln!("{} {}", style("error:").red().bold(), err),
        }
        println!();
    }

    orchestrator.shutdown().await;
    println!("{}", style("Goodbye.").dim());
    Ok(())
}
