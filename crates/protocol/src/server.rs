//! Server → Client frames

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::*;

/// Frames sent from the backend to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    // Streaming generation
    #[serde(rename_all = "camelCase")]
    Chunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
    },
    Done,
    Stopped,
    Status,

    // Errors
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    // Auxiliary state
    Stats {
        #[serde(default)]
        data: Value,
    },
    SearchResults {
        #[serde(default)]
        data: Vec<Value>,
    },
    Activity {
        data: ActivityUpdate,
    },
    ToolConfirmationRequest {
        data: ToolConfirmationRequest,
    },

    // Session lifecycle
    /// Entries stay raw so one bad row cannot reject the whole frame; see
    /// `HistoryEntry::decode`.
    #[serde(rename_all = "camelCase")]
    History {
        #[serde(default)]
        messages: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SessionChanged {
        session_id: String,
    },

    // Out-of-band
    DownloadProgress {
        #[serde(default)]
        data: Value,
    },

    /// Any `type` this client does not know about
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    /// Wire name of the frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Chunk { .. } => "chunk",
            ServerFrame::Done => "done",
            ServerFrame::Stopped => "stopped",
            ServerFrame::Status => "status",
            ServerFrame::Error { .. } => "error",
            ServerFrame::Stats { .. } => "stats",
            ServerFrame::SearchResults { .. } => "search_results",
            ServerFrame::Activity { .. } => "activity",
            ServerFrame::ToolConfirmationRequest { .. } => "tool_confirmation_request",
            ServerFrame::History { .. } => "history",
            ServerFrame::SessionChanged { .. } => "session_changed",
            ServerFrame::DownloadProgress { .. } => "download_progress",
            ServerFrame::Unknown => "unknown",
        }
    }
}
