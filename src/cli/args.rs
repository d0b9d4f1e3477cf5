//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for huddle
#[derive(Parser, Debug)]
#[command(
    name = "huddle",
    version,
    about = "Meeting assistant that routes questions to retrieval, ideation and analysis agents"
)]
pub struct Cli {
    /// Configuration file path; otherwise huddle.toml is searched in the workspace and home directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace root directory; defaults to current directory
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Route a single question and print the answer
    Ask {
        /// The question to ask
        prompt: Vec<String>,

        /// Meeting notes to ground retrieval on; blank lines separate notes
        #[arg(long = "notes")]
        notes: Vec<PathBuf>,
    },

    /// Interactive session that keeps conversation history
    Chat {
        /// Meeting notes to ground retrieval on; blank lines separate notes
        #[arg(long = "notes")]
        notes: Vec<PathBuf>,
    },

    /// Print a telemetry snapshot as JSON
    Stats,

    /// Write a sample huddle.toml into the workspace
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_notes() {
        let cli = Cli::parse_from([
            "huddle",
            "--verbose",
            "ask",
            "what",
            "did",
            "we",
            "decide",
            "--notes",
            "notes.md",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Ask { prompt, notes }) => {
                assert_eq!(prompt.join(" "), "what did we decide");
                assert_eq!(notes, vec![PathBuf::from("notes.md")]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["huddle", "init", "--force", "--config", "custom.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
    }
}
