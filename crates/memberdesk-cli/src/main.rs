//! CLI entry point for memberdesk.
//!
//! This binary provides the `memberdesk` command: an interactive chat with
//! the dashboard assistant, one-shot questions, and catalog inspection.

mod cli;
mod helpers;
mod remote_tool;
mod repl;

use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;
use memberdesk_assistant::ToolCatalog;
use memberdesk_assistant::config::AssistantConfig;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::{Services, init_tracing, load_config};
use crate::remote_tool::remote_catalog;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" });

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Chat => repl::cmd_chat(&config).await,
        Commands::Ask { text, stream } => cmd_ask(&config, &text.join(" "), stream).await,
        Commands::Tools { select } => cmd_tools(&config, select.as_deref()),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: ask
// ---------------------------------------------------------------------------

async fn cmd_ask(config: &AssistantConfig, text: &str, stream: bool) -> Result<()> {
    let services = Services::build(config)?;
    let mut orchestrator = services.orchestrator(config);

    let reply = if stream {
        let mut sink = |chunk: &str| {
            print!("{chunk}");
            io::stdout().flush().ok();
        };
        let reply = orchestrator.chat_stream(text, &mut sink).await;
        println!();
        reply
    } else {
        let reply = orchestrator.chat(text).await;
        println!("{}", reply.content);
        reply
    };

    info!(
        tools = reply.tool_calls.len(),
        status = ?reply.status,
        "turn finished"
    );

    if reply.is_error() {
        if stream {
            eprintln!("{}", reply.content);
        }
        anyhow::bail!(
            "turn failed: {}",
            reply.error_detail.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: tools
// ---------------------------------------------------------------------------

fn cmd_tools(config: &AssistantConfig, select: Option<&str>) -> Result<()> {
    let catalog = remote_catalog(config)?;

    match select {
        Some(text) => {
            let clusters = catalog.matched_clusters(text);
            if clusters.is_empty() {
                println!("  clusters: (none, core tools only)");
            } else {
                println!("  clusters: {}", clusters.join(", "));
            }
            for tool in catalog.select(text) {
                println!("  {}", tool.name);
            }
        }
        None => print_catalog(&catalog),
    }
    Ok(())
}

fn print_catalog(catalog: &ToolCatalog) {
    let core = catalog.core_names();
    println!("  {} tools ({} always offered)", catalog.len(), core.len());
    println!();
    for name in catalog.names() {
        let marker = if core.contains(&name) { "*" } else { " " };
        let description = catalog
            .lookup(name)
            .map(|tool| tool.description.clone())
            .unwrap_or_default();
        println!("  {marker} {name:<32} {description}");
    }
}
