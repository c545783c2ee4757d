//! Line-oriented REPL over a `ChatClient`.

use anyhow::bail;
use chatstream_client::{ChatClient, ChatRequest, ClientEvent};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::render::{format_progress, Renderer};

const HELP: &str = "\
  <text>                      send a message
  /stop                       stop the current generation
  /stats                      request memory statistics
  /session <id>               switch session
  /approve <id> [--remember]  approve a tool call
  /deny <id>                  deny a tool call
  /quit                       exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Chat(String),
    Stop,
    Stats,
    Session(String),
    Approve { request_id: String, remember: bool },
    Deny { request_id: String },
    Help,
    Quit,
    Empty,
}

pub fn parse(line: &str) -> anyhow::Result<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ReplCommand::Chat(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("stop", []) => ReplCommand::Stop,
        ("stats", []) => ReplCommand::Stats,
        ("session", [id]) => ReplCommand::Session(id.to_string()),
        ("approve", [id]) if *id != "--remember" => ReplCommand::Approve {
            request_id: id.to_string(),
            remember: false,
        },
        ("approve", [id, "--remember"]) | ("approve", ["--remember", id]) => {
            ReplCommand::Approve {
                request_id: id.to_string(),
                remember: true,
            }
        }
        ("deny", [id]) => ReplCommand::Deny {
            request_id: id.to_string(),
        },
        ("help", []) => ReplCommand::Help,
        ("quit" | "exit", []) => ReplCommand::Quit,
        ("session" | "deny", _) => bail!("usage: /{name} <id>"),
        ("approve", _) => bail!("usage: /approve <id> [--remember]"),
        _ => bail!("unknown command /{name}, try /help"),
    };
    Ok(command)
}

/// Run until `/quit` or end of input.
pub async fn run(client: ChatClient) -> anyhow::Result<()> {
    let render_task = tokio::spawn(render_loop(client.clone()));
    println!("{}", style("type a message, or /help").dim());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", style(e).red());
                continue;
            }
        };
        debug!(
            component = "repl",
            event = "repl.command",
            command = ?command,
            "REPL command"
        );

        let result = match command {
            ReplCommand::Empty => Ok(()),
            ReplCommand::Quit => break,
            ReplCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            ReplCommand::Chat(text) => client.send_message(ChatRequest::new(text)).await,
            ReplCommand::Stop => client.stop().await,
            ReplCommand::Stats => client.request_stats().await,
            ReplCommand::Session(id) => client.set_current_session_id(id).await,
            ReplCommand::Approve {
                request_id,
                remember,
            } => {
                client
                    .handle_tool_confirmation(request_id, true, remember)
                    .await
            }
            ReplCommand::Deny { request_id } => {
                client
                    .handle_tool_confirmation(request_id, false, false)
                    .await
            }
        };
        if let Err(e) = result {
            println!("{}", style(format!("error: {e}")).red());
        }
    }

    render_task.abort();
    Ok(())
}

async fn render_loop(client: ChatClient) {
    let mut events = client.subscribe();
    let mut renderer = Renderer::new();
    print_lines(renderer.render(&client.snapshot()));

    loop {
        match events.recv().await {
            Ok(ClientEvent::StateChanged { .. }) => {
                print_lines(renderer.render(&client.snapshot()));
            }
            Ok(ClientEvent::DownloadProgress(data)) => println!("{}", format_progress(&data)),
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    component = "repl",
                    event = "repl.events_lagged",
                    skipped,
                    "Render loop fell behind"
                );
                print_lines(renderer.render(&client.snapshot()));
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
