//! CLI argument definitions for memberdesk.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// memberdesk -- the membership dashboard assistant.
#[derive(Parser)]
#[command(
    name = "memberdesk",
    version,
    about = "memberdesk -- AI assistant for the membership admin dashboard",
    long_about = "Answers questions about members, subscriptions, contributions and \
                  crowdfunding campaigns by calling the dashboard's tool service through a \
                  rate-limited pool of free language models."
)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./memberdesk.toml when present).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session.
    Chat,

    /// Ask a single question and print the answer.
    Ask {
        /// The question.
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,

        /// Stream the answer as it is generated (no tool calls).
        #[arg(long)]
        stream: bool,
    },

    /// List the tool catalog, or show which tools a message would select.
    Tools {
        /// Message to run tool selection on.
        #[arg(long)]
        select: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_joins_trailing_words() {
        let cli = Cli::try_parse_from(["memberdesk", "-v", "ask", "how", "many", "members"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Ask { text, stream } => {
                assert_eq!(text.join(" "), "how many members");
                assert!(!stream);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["memberdesk", "tools", "--config", "desk.toml", "--select", "revenue"])
                .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("desk.toml")));
        assert!(matches!(cli.command, Commands::Tools { select: Some(s) } if s == "revenue"));
    }
}
