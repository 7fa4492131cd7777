//! Interactive chat loop.
//!
//! Lines starting with `/` are session commands; everything else is sent to
//! the assistant as one turn.

use std::io::{self, BufRead, Write};

use memberdesk_assistant::config::AssistantConfig;
use memberdesk_assistant::{ChatMessage, Orchestrator, Role};
use serde_json::{Map, Value};

use crate::helpers::Services;

/// A line the user typed.
#[derive(Debug, PartialEq)]
enum Input {
    Empty,
    Quit,
    Clear,
    History,
    Context(Option<(String, Value)>),
    Help,
    Unknown(String),
    Message(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line == "quit" || line == "exit" {
        return Input::Quit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_owned());
    };

    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "quit" | "exit" => Input::Quit,
        "clear" => Input::Clear,
        "history" => Input::History,
        "help" => Input::Help,
        "context" => Input::Context(parse_assignment(rest.trim())),
        other => Input::Unknown(other.to_owned()),
    }
}

/// Parse `key=value`.  The value is read as JSON when it parses, otherwise
/// as a plain string; an empty value is `null`, which removes the key.
fn parse_assignment(raw: &str) -> Option<(String, Value)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = if value.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()))
    };
    Some((key.to_owned(), value))
}

fn print_help() {
    println!("  /context key=value   set dashboard context (empty value removes the key)");
    println!("  /context             show the current context");
    println!("  /history             show this conversation");
    println!("  /clear               start over (context is kept)");
    println!("  /quit                leave");
}

fn print_reply(reply: &ChatMessage) {
    if !reply.tool_calls.is_empty() {
        let used: Vec<String> = reply
            .tool_results
            .iter()
            .map(|r| {
                if r.is_error() {
                    format!("{} (failed)", r.tool_name)
                } else {
                    r.tool_name.clone()
                }
            })
            .collect();
        println!("  [tools: {}]", used.join(", "));
    }
    println!("\n{}\n", reply.content);
    if let Some(detail) = &reply.error_detail {
        eprintln!("  ({detail})");
    }
}

fn print_history(orchestrator: &Orchestrator) {
    if orchestrator.history().is_empty() {
        println!("  (empty)");
        return;
    }
    for message in orchestrator.history() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        let marker = if message.is_error() { " !" } else { "" };
        println!(
            "  [{}] {who}{marker}: {}",
            message.timestamp.format("%H:%M:%S"),
            message.content
        );
    }
}

fn print_context(orchestrator: &Orchestrator) {
    if orchestrator.context().is_empty() {
        println!("  (no context)");
    }
    for (key, value) in orchestrator.context() {
        println!("  {key} = {value}");
    }
}

/// Run the interactive chat loop until EOF or `/quit`.
pub async fn cmd_chat(config: &AssistantConfig) -> anyhow::Result<()> {
    let services = Services::build(config)?;
    let mut orchestrator = services.orchestrator(config);

    println!();
    println!("  memberdesk assistant v{}", env!("CARGO_PKG_VERSION"));
    println!("  {} tools, {} models", services.catalog.len(), config.gateway.models.len());
    println!("  Type /help for commands, /quit to leave.");
    println!();

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Interrupted. Goodbye!");
            std::process::exit(0);
        }
    });

    let stdin = io::stdin();
    let mut line_buf = String::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.lock().read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                break;
            }
        }

        match parse_input(&line_buf) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => print_help(),
            Input::Clear => {
                orchestrator.clear_history();
                println!("  History cleared.");
            }
            Input::History => print_history(&orchestrator),
            Input::Context(None) => print_context(&orchestrator),
            Input::Context(Some((key, value))) => {
                let mut partial = Map::new();
                partial.insert(key, value);
                orchestrator.set_context(partial);
                print_context(&orchestrator);
            }
            Input::Unknown(name) => println!("  Unknown command /{name}. Type /help."),
            Input::Message(text) => {
                let reply = orchestrator.chat(&text).await;
                print_reply(&reply);
            }
        }
    }

    println!("  Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            parse_input("  how many members?  \n"),
            Input::Message("how many members?".into())
        );
        assert_eq!(parse_input("\n"), Input::Empty);
        assert_eq!(parse_input("exit"), Input::Quit);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_input("/clear"), Input::Clear);
        assert_eq!(parse_input("/history"), Input::History);
        assert_eq!(parse_input("/context"), Input::Context(None));
        assert_eq!(parse_input("/bogus"), Input::Unknown("bogus".into()));
    }

    #[test]
    fn context_values_are_json_or_text() {
        assert_eq!(
            parse_input("/context campaign_id=42"),
            Input::Context(Some(("campaign_id".into(), json!(42))))
        );
        assert_eq!(
            parse_assignment("page = members list"),
            Some(("page".into(), json!("members list")))
        );
        assert_eq!(parse_assignment("page="), Some(("page".into(), Value::Null)));
        assert_eq!(parse_assignment("=5"), None);
        assert_eq!(parse_assignment("page"), None);
    }
}
