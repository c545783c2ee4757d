//! Core types shared across the protocol

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub is_complete: bool,
}

impl Message {
    /// A completed message with a fresh id and the given timestamp.
    pub fn new(role: MessageRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            role,
            content: content.into(),
            timestamp,
            mode: None,
            agent_name: None,
            node_id: None,
            is_complete: true,
        }
    }
}

/// Tool execution the backend wants the user to confirm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfirmationRequest {
    pub request_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Progress of one agent step within a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    #[serde(alias = "running")]
    Processing,
    #[serde(alias = "done", alias = "complete")]
    Completed,
    #[serde(alias = "failed")]
    Error,
}

/// Payload of an `activity` frame. `id` is the backend's internal step name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityUpdate {
    pub id: String,
    pub status: ActivityStatus,
    #[serde(default)]
    pub message: String,
}

/// One row of the activity log, keyed by display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub agent_name: String,
    pub status: ActivityStatus,
    pub details: String,
    pub step: u32,
}

/// A persisted message as replayed by the backend in a `history` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl HistoryEntry {
    /// Decode one raw entry of a `history` frame.
    pub fn decode(raw: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(raw)
    }

    /// Parsed timestamp, if present and understood.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_ref().and_then(parse_timestamp)
    }

    /// Convert into a completed message, using `fallback` when the
    /// serialized timestamp is missing or unparseable.
    pub fn into_message(self, fallback: DateTime<Utc>) -> Message {
        let timestamp = self.parsed_timestamp().unwrap_or(fallback);
        Message {
            id: self.id.unwrap_or_else(crate::new_id),
            role: self.role,
            content: self.content,
            timestamp,
            mode: self.mode,
            agent_name: self.agent_name,
            node_id: self.node_id,
            is_complete: true,
        }
    }
}

/// Parse a serialized timestamp.
///
/// Accepts RFC 3339 strings, naive ISO-8601 strings (taken as UTC) and
/// integer epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
                return Some(ts.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
