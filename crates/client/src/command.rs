//! Commands sent to the client actor from `ChatClient` handles.

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ClientError;

/// One chat turn as the caller describes it. Session id and default mode
/// are filled in by the actor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    /// Overrides the configured mode for this turn
    pub mode: Option<String>,
    pub attachments: Vec<Value>,
    pub skip_web_search: Option<bool>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Value) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn skip_web_search(mut self, skip: bool) -> Self {
        self.skip_web_search = Some(skip);
        self
    }
}

pub type Reply<T> = oneshot::Sender<T>;

pub enum ClientCommand {
    SendMessage {
        request: ChatRequest,
        reply: Reply<Result<(), ClientError>>,
    },
    Stop {
        reply: Reply<Result<(), ClientError>>,
    },
    RequestStats {
        reply: Reply<Result<(), ClientError>>,
    },
    SetSession {
        session_id: String,
        reply: Reply<()>,
    },
    ToolConfirmation {
        request_id: String,
        approved: bool,
        remember: bool,
        reply: Reply<Result<(), ClientError>>,
    },
    /// Tear down and exit; replies once the link is closed
    Shutdown {
        reply: Reply<()>,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::SendMessage { .. } => "send_message",
            ClientCommand::Stop { .. } => "stop",
            ClientCommand::RequestStats { .. } => "request_stats",
            ClientCommand::SetSession { .. } => "set_session",
            ClientCommand::ToolConfirmation { .. } => "tool_confirmation",
            ClientCommand::Shutdown { .. } => "shutdown",
        }
    }
}
