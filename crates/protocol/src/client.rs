//! Client → Server frames

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent from the client to the backend.
///
/// A chat turn carries no `type` key; every other frame is a tagged
/// control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Control(ControlMessage),
    Chat(ChatTurn),
}

/// Tagged control frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Stop,
    GetStats,
    #[serde(rename_all = "camelCase")]
    SetSession {
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolConfirmationResponse {
        request_id: String,
        approved: bool,
    },
}

/// One user turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub message: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_web_search: Option<bool>,
    pub session_id: String,
}

impl ClientFrame {
    pub fn stop() -> Self {
        ClientFrame::Control(ControlMessage::Stop)
    }

    pub fn get_stats() -> Self {
        ClientFrame::Control(ControlMessage::GetStats)
    }

    pub fn set_session(session_id: impl Into<String>) -> Self {
        ClientFrame::Control(ControlMessage::SetSession {
            session_id: session_id.into(),
        })
    }

    pub fn tool_confirmation_response(request_id: impl Into<String>, approved: bool) -> Self {
        ClientFrame::Control(ControlMessage::ToolConfirmationResponse {
            request_id: request_id.into(),
            approved,
        })
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(frame: &ClientFrame) -> Value {
        serde_json::to_value(frame).expect("serialize")
    }

    #[test]
    fn chat_turn_has_no_type_key() {
        let frame = ClientFrame::Chat(ChatTurn {
            message: "hello".to_string(),
            mode: "chat".to_string(),
            attachments: Vec::new(),
            skip_web_search: None,
            session_id: "default".to_string(),
        });
        assert_eq!(
            to_value(&frame),
            json!({"message": "hello", "mode": "chat", "sessionId": "default"})
        );
    }

    #[test]
    fn chat_turn_optional_fields() {
        let frame = ClientFrame::Chat(ChatTurn {
            message: "look".to_string(),
            mode: "agent".to_string(),
            attachments: vec![json!({"name": "a.png"})],
            skip_web_search: Some(true),
            session_id: "s1".to_string(),
        });
        let value = to_value(&frame);
        assert_eq!(value["skipWebSearch"], true);
        assert_eq!(value["attachments"][0]["name"], "a.png");
        assert!(value.get("type").is_none());
    }

    #[test]
    fn control_frames_match_wire_shape() {
        assert_eq!(to_value(&ClientFrame::stop()), json!({"type": "stop"}));
        assert_eq!(to_value(&ClientFrame::get_stats()), json!({"type": "get_stats"}));
        assert_eq!(
            to_value(&ClientFrame::set_session("s9")),
            json!({"type": "set_session", "sessionId": "s9"})
        );
        assert_eq!(
            to_value(&ClientFrame::tool_confirmation_response("r1", false)),
            json!({"type": "tool_confirmation_response", "requestId": "r1", "approved": false})
        );
    }

    #[test]
    fn untagged_decode_prefers_control() {
        let frame: ClientFrame =
            serde_json::from_value(json!({"type": "set_session", "sessionId": "x"}))
                .expect("deserialize");
        assert_eq!(frame, ClientFrame::set_session("x"));
    }
}
