//! Turns snapshots into terminal lines.
//!
//! Only what changed since the previous snapshot is printed: newly
//! completed messages, connection flips, a new error, a new pending
//! confirmation.

use std::collections::HashSet;

use chatstream_client::ChatSnapshot;
use chatstream_protocol::{Message, MessageRole, ToolConfirmationRequest};
use console::style;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct Renderer {
    printed: HashSet<String>,
    connected: Option<bool>,
    session_id: Option<String>,
    loading_history: bool,
    error: Option<String>,
    pending: Option<String>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, snapshot: &ChatSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if self.connected != Some(snapshot.is_connected) {
            self.connected = Some(snapshot.is_connected);
            lines.push(if snapshot.is_connected {
                style("● connected").green().to_string()
            } else {
                style("○ disconnected, reconnecting").yellow().to_string()
            });
        }

        if self.session_id.as_deref() != Some(snapshot.session_id.as_str()) {
            self.session_id = Some(snapshot.session_id.clone());
            self.printed.clear();
            lines.push(
                style(format!("session {}", snapshot.session_id))
                    .dim()
                    .to_string(),
            );
        }

        if snapshot.is_loading_history && !self.loading_history {
            lines.push(style("loading history...").dim().to_string());
        }
        self.loading_history = snapshot.is_loading_history;

        for message in snapshot.messages.iter().filter(|m| m.is_complete) {
            if self.printed.insert(message.id.clone()) {
                lines.push(format_message(message));
            }
        }

        if snapshot.error != self.error {
            self.error = snapshot.error.clone();
            if let Some(error) = &snapshot.error {
                lines.push(style(format!("error: {error}")).red().to_string());
            }
        }

        let pending = snapshot
            .pending_confirmation
            .as_ref()
            .map(|p| p.request_id.clone());
        if pending != self.pending {
            self.pending = pending;
            if let Some(request) = &snapshot.pending_confirmation {
                lines.push(format_confirmation(request));
            }
        }

        lines
    }
}

pub fn format_message(message: &Message) -> String {
    let label = match message.role {
        MessageRole::User => style("you".to_string()).cyan().bold(),
        MessageRole::Assistant => style(
            message
                .agent_name
                .clone()
                .unwrap_or_else(|| "assistant".to_string()),
        )
        .green()
        .bold(),
        MessageRole::System => style("system".to_string()).red().bold(),
    };
    format!("{label}> {}", message.content)
}

fn format_confirmation(request: &ToolConfirmationRequest) -> String {
    let mut text = format!(
        "{} {} wants to run with {}",
        style("confirm").magenta().bold(),
        request.tool_name,
        request.tool_args
    );
    if let Some(description) = &request.description {
        text.push_str(&format!(" ({description})"));
    }
    text.push_str(&format!(
        "\n  /approve {id} [--remember]  or  /deny {id}",
        id = request.request_id
    ));
    text
}

pub fn format_progress(data: &Value) -> String {
    style(format!("download {data}")).dim().to_string()
}
