//! Chat state and frame dispatch
//!
//! `ChatState` is owned by the client actor and mutated only from its
//! event loop. Every input returns the effects the actor must carry out
//! (frames to send, notifications to broadcast); the state itself does
//! no IO. Visible changes mark the state dirty and `take_changes` turns
//! them into a new revision.

use chatstream_protocol::{
    ActivityEntry, ClientFrame, HistoryEntry, Message, MessageRole, ServerFrame,
    ToolConfirmationRequest,
};
use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::confirmation::{GateOutcome, ToolConfirmationGate};
use crate::fragment_buffer::{Fragment, FragmentBuffer, PushOutcome};
use crate::session::SessionController;
use crate::transcript::Transcript;

pub const PARSE_ERROR_MESSAGE: &str = "Failed to parse server message";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Read-only view of the chat state, published once per revision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub is_connected: bool,
    pub error: Option<String>,
    pub is_processing: bool,
    pub is_loading_history: bool,
    pub pending_confirmation: Option<ToolConfirmationRequest>,
    pub stats: Option<Value>,
    pub search_results: Vec<Value>,
    pub activity: Vec<ActivityEntry>,
    pub session_id: String,
    pub revision: u64,
}

/// Notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A new snapshot is available
    StateChanged { revision: u64 },
    /// Model download progress, passed through untouched
    DownloadProgress(Value),
}

/// Work the actor performs on behalf of the state
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ClientFrame),
    Notify(ClientEvent),
}

#[derive(Debug)]
pub struct ChatState {
    transcript: Transcript,
    buffer: FragmentBuffer,
    session: SessionController,
    gate: ToolConfirmationGate,
    activity: ActivityLog,
    is_connected: bool,
    is_processing: bool,
    error: Option<String>,
    stats: Option<Value>,
    search_results: Vec<Value>,
    revision: u64,
    dirty: bool,
}

impl ChatState {
    pub fn new(session_id: impl Into<String>, buffer: FragmentBuffer) -> Self {
        Self {
            transcript: Transcript::new(),
            buffer,
            session: SessionController::new(session_id),
            gate: ToolConfirmationGate::new(),
            activity: ActivityLog::new(),
            is_connected: false,
            is_processing: false,
            error: None,
            stats: None,
            search_results: Vec::new(),
            revision: 0,
            dirty: false,
        }
    }

    pub fn session_id(&self) -> &str {
        self.session.current()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn flush_deadline(&self) -> Option<Instant> {
        self.buffer.flush_deadline()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            messages: self.transcript.to_vec(),
            is_connected: self.is_connected,
            error: self.error.clone(),
            is_processing: self.is_processing,
            is_loading_history: self.session.is_loading_history(),
            pending_confirmation: self.gate.pending().cloned(),
            stats: self.stats.clone(),
            search_results: self.search_results.clone(),
            activity: self.activity.entries().to_vec(),
            session_id: self.session.current().to_string(),
            revision: self.revision,
        }
    }

    /// If anything visible changed since the last call, bump the revision
    /// and return the new snapshot.
    pub fn take_changes(&mut self) -> Option<ChatSnapshot> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        self.revision += 1;
        Some(self.snapshot())
    }

    fn touch(&mut self, changed: bool) {
        self.dirty |= changed;
    }

    // -- Inbound -----------------------------------------------------------

    /// Decode one raw text frame and dispatch it. Malformed frames become
    /// a visible error; the stream continues.
    pub fn receive(&mut self, raw: &str, now: Instant) -> Vec<Effect> {
        match serde_json::from_str::<ServerFrame>(raw) {
            Ok(frame) => self.dispatch(frame, now),
            Err(e) => {
                warn!(
                    component = "dispatcher",
                    event = "dispatcher.parse_failed",
                    error = %e,
                    payload_len = raw.len(),
                    "Failed to parse server frame"
                );
                self.error = Some(PARSE_ERROR_MESSAGE.to_string());
                if is_history_frame(raw) && self.session.is_loading_history() {
                    self.session.history_loaded();
                }
                self.touch(true);
                Vec::new()
            }
        }
    }

    pub fn dispatch(&mut self, frame: ServerFrame, now: Instant) -> Vec<Effect> {
        let kind = frame.kind();
        match frame {
            ServerFrame::Chunk {
                message,
                mode,
                agent_name,
                node_id,
            } => {
                let Some(text) = message else {
                    return Vec::new();
                };
                let fragment = Fragment {
                    text,
                    mode,
                    agent_name,
                    node_id,
                };
                let outcome = self.buffer.push(fragment, &mut self.transcript, now);
                self.touch(outcome == PushOutcome::NodeBoundary);
            }

            ServerFrame::Done | ServerFrame::Stopped => {
                let closed = self.buffer.close(&mut self.transcript);
                let was_processing = std::mem::replace(&mut self.is_processing, false);
                self.touch(closed || was_processing);
                debug!(
                    component = "dispatcher",
                    event = "dispatcher.generation_finished",
                    frame = kind,
                    "Generation finished"
                );
            }

            ServerFrame::Status => {}

            ServerFrame::Error { message } => {
                let message = message
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string());
                self.buffer.close(&mut self.transcript);
                warn!(
                    component = "dispatcher",
                    event = "dispatcher.backend_error",
                    error = %message,
                    "Backend reported an error"
                );
                self.transcript
                    .push(Message::new(MessageRole::System, message.clone(), Utc::now()));
                self.error = Some(message);
                self.is_processing = false;
                self.touch(true);
            }

            ServerFrame::Stats { data } => {
                self.stats = Some(data);
                self.touch(true);
            }

            ServerFrame::SearchResults { data } => {
                self.search_results = data;
                self.touch(true);
            }

            ServerFrame::Activity { data } => {
                self.activity.upsert(data);
                self.touch(true);
            }

            ServerFrame::ToolConfirmationRequest { data } => {
                let tool_name = data.tool_name.clone();
                match self.gate.offer(data) {
                    GateOutcome::Surfaced => self.touch(true),
                    GateOutcome::AutoApproved { request_id } => {
                        info!(
                            component = "confirmation",
                            event = "confirmation.auto_approved",
                            request_id = %request_id,
                            tool_name = %tool_name,
                            "Remembered tool approved without prompting"
                        );
                        return vec![Effect::Send(ClientFrame::tool_confirmation_response(
                            request_id, true,
                        ))];
                    }
                }
            }

            ServerFrame::History {
                messages,
                session_id,
            } => {
                if !self.session.accepts_history(session_id.as_deref()) {
                    info!(
                        component = "session",
                        event = "session.history_stale",
                        history_session = session_id.as_deref().unwrap_or_default(),
                        current_session = %self.session.current(),
                        "Ignoring history for another session"
                    );
                    return Vec::new();
                }
                self.apply_history(messages);
            }

            ServerFrame::SessionChanged { session_id } => {
                info!(
                    component = "session",
                    event = "session.changed",
                    session_id = %session_id,
                    "Backend acknowledged session switch"
                );
            }

            ServerFrame::DownloadProgress { data } => {
                return vec![Effect::Notify(ClientEvent::DownloadProgress(data))];
            }

            ServerFrame::Unknown => {
                debug!(
                    component = "dispatcher",
                    event = "dispatcher.unknown_frame",
                    "Ignoring frame of unknown type"
                );
            }
        }
        Vec::new()
    }

    fn apply_history(&mut self, entries: Vec<Value>) {
        let now = Utc::now();
        let messages: Vec<Message> = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| match HistoryEntry::decode(raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(
                        component = "session",
                        event = "session.history_entry_skipped",
                        index,
                        error = %e,
                        "Skipping undecodable history entry"
                    );
                    None
                }
            })
            .map(|entry| {
                if entry.timestamp.is_some() && entry.parsed_timestamp().is_none() {
                    debug!(
                        component = "session",
                        event = "session.history_bad_timestamp",
                        timestamp = ?entry.timestamp,
                        "Unparseable history timestamp, using now"
                    );
                }
                entry.into_message(now)
            })
            .collect();

        info!(
            component = "session",
            event = "session.history_loaded",
            session_id = %self.session.current(),
            message_count = messages.len(),
            "History replaced transcript"
        );
        self.buffer.reset();
        self.transcript.replace(messages);
        self.session.history_loaded();
        self.touch(true);
    }

    /// Flush buffered fragments if the coalescing deadline has passed.
    pub fn flush_due(&mut self, now: Instant) {
        if self.buffer.is_due(now) {
            let flushed = self.buffer.flush(&mut self.transcript);
            self.touch(flushed);
        }
    }

    // -- Connection lifecycle ---------------------------------------------

    pub fn on_open(&mut self) -> Vec<Effect> {
        self.is_connected = true;
        self.touch(true);
        self.session
            .on_open()
            .map(Effect::Send)
            .into_iter()
            .collect()
    }

    pub fn on_disconnect(&mut self) {
        self.buffer.close(&mut self.transcript);
        self.session.on_disconnect();
        self.is_connected = false;
        self.is_processing = false;
        self.touch(true);
    }

    /// Final flush before the actor exits.
    pub fn teardown(&mut self) {
        self.buffer.close(&mut self.transcript);
        self.is_connected = false;
        self.is_processing = false;
        self.touch(true);
    }

    // -- Commands -----------------------------------------------------------

    /// Record a chat turn that was just sent.
    pub fn record_user_turn(&mut self, content: impl Into<String>) {
        self.buffer.close(&mut self.transcript);
        self.transcript
            .push(Message::new(MessageRole::User, content, Utc::now()));
        self.is_processing = true;
        self.error = None;
        self.activity.clear();
        self.touch(true);
    }

    /// Point at another session. The transcript and every per-session
    /// collection are cleared immediately; stats are kept.
    pub fn switch_session(&mut self, session_id: impl Into<String>, connected: bool) -> Vec<Effect> {
        self.buffer.reset();
        self.transcript.clear();
        self.gate.reset();
        self.activity.clear();
        self.search_results.clear();
        self.is_processing = false;
        self.error = None;
        let frame = self.session.switch(session_id, connected);
        info!(
            component = "session",
            event = "session.switch",
            session_id = %self.session.current(),
            connected,
            "Switching session"
        );
        self.touch(true);
        frame.map(Effect::Send).into_iter().collect()
    }

    /// Record the user's answer once the response frame went out.
    pub fn resolve_confirmation(&mut self, request_id: &str, approved: bool, remember: bool) {
        self.gate.resolve(request_id, approved, remember);
        self.touch(true);
    }
}

/// Whether an undecodable frame at least names itself as `history`.
fn is_history_frame(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| value.get("type").and_then(Value::as_str).map(|t| t == "history"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatstream_protocol::ActivityStatus;
    use serde_json::json;
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_millis(50);

    fn state() -> ChatState {
        ChatState::new("default", FragmentBuffer::new(INTERVAL))
    }

    fn feed(state: &mut ChatState, value: serde_json::Value, now: Instant) -> Vec<Effect> {
        state.receive(&value.to_string(), now)
    }

    fn chunk(text: &str, node: &str) -> serde_json::Value {
        json!({"type": "chunk", "message": text, "nodeId": node})
    }

    fn contents(state: &ChatState) -> Vec<(MessageRole, String, bool)> {
        state
            .snapshot()
            .messages
            .into_iter()
            .map(|m| (m.role, m.content, m.is_complete))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_are_invisible_until_the_deadline() {
        let mut state = state();
        let now = Instant::now();
        feed(&mut state, chunk("Hel", "n1"), now);
        feed(&mut state, chunk("lo", "n1"), now);
        assert!(state.take_changes().is_none(), "buffered text is not a change");

        state.flush_due(now + Duration::from_millis(10));
        assert!(state.snapshot().messages.is_empty());

        state.flush_due(now + INTERVAL);
        let snapshot = state.take_changes().expect("flush publishes");
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].content, "Hello");
        assert!(!snapshot.messages[0].is_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn done_and_stopped_complete_the_message() {
        for kind in ["done", "stopped"] {
            let mut state = state();
            let now = Instant::now();
            state.record_user_turn("hi");
            feed(&mut state, chunk("answer", "n1"), now);
            feed(&mut state, json!({"type": kind}), now);

            let snapshot = state.snapshot();
            assert!(!snapshot.is_processing);
            assert!(snapshot.messages.iter().all(|m| m.is_complete));
            assert_eq!(snapshot.messages[1].content, "answer");
            assert!(state.flush_deadline().is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn node_change_is_visible_immediately() {
        let mut state = state();
        let now = Instant::now();
        feed(&mut state, chunk("A", "n1"), now);
        feed(&mut state, chunk("B", "n2"), now);

        assert!(state.take_changes().is_some());
        assert_eq!(
            contents(&state),
            vec![
                (MessageRole::Assistant, "A".to_string(), true),
                (MessageRole::Assistant, "B".to_string(), false),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_without_text_is_a_no_op() {
        let mut state = state();
        let effects = feed(&mut state, json!({"type": "chunk", "nodeId": "n1"}), Instant::now());
        assert!(effects.is_empty());
        assert!(state.flush_deadline().is_none());
        assert!(state.take_changes().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn backend_error_flushes_then_reports() {
        let mut state = state();
        let now = Instant::now();
        state.record_user_turn("hi");
        feed(&mut state, chunk("partial", "n1"), now);
        feed(&mut state, json!({"type": "error", "message": "model crashed"}), now);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("model crashed"));
        assert!(!snapshot.is_processing);
        assert_eq!(
            contents(&state),
            vec![
                (MessageRole::User, "hi".to_string(), true),
                (MessageRole::Assistant, "partial".to_string(), true),
                (MessageRole::System, "model crashed".to_string(), true),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backend_error_without_message_gets_fallback_text() {
        for frame in [
            json!({"type": "error"}),
            json!({"type": "error", "message": null}),
            json!({"type": "error", "message": "  "}),
        ] {
            let mut state = state();
            feed(&mut state, frame, Instant::now());
            let snapshot = state.snapshot();
            assert_eq!(snapshot.error.as_deref(), Some(UNKNOWN_ERROR_MESSAGE));
            assert_eq!(
                contents(&state),
                vec![(MessageRole::System, UNKNOWN_ERROR_MESSAGE.to_string(), true)]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_sets_generic_error() {
        let mut state = state();
        let now = Instant::now();
        assert!(state.receive("{not json", now).is_empty());
        assert!(state.receive(r#"{"message":"no type"}"#, now).is_empty());
        assert_eq!(state.snapshot().error.as_deref(), Some(PARSE_ERROR_MESSAGE));

        feed(&mut state, chunk("still", "n1"), now);
        assert!(state.flush_deadline().is_some(), "stream continues");
    }

    #[tokio::test(start_paused = true)]
    async fn status_and_unknown_frames_are_ignored() {
        let mut state = state();
        let now = Instant::now();
        assert!(feed(&mut state, json!({"type": "status"}), now).is_empty());
        assert!(feed(&mut state, json!({"type": "telemetry", "x": 1}), now).is_empty());
        assert!(state.take_changes().is_none());
        assert!(state.snapshot().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn auxiliary_state_is_replaced_wholesale() {
        let mut state = state();
        let now = Instant::now();
        feed(&mut state, json!({"type": "stats", "data": {"memories": 3}}), now);
        feed(&mut state, json!({"type": "stats", "data": {"memories": 4}}), now);
        feed(&mut state, json!({"type": "search_results", "data": [{"a": 1}, {"b": 2}]}), now);
        feed(&mut state, json!({"type": "search_results", "data": [{"c": 3}]}), now);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.stats, Some(json!({"memories": 4})));
        assert_eq!(snapshot.search_results, vec![json!({"c": 3})]);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_rows_are_upserted_by_display_name() {
        let mut state = state();
        let now = Instant::now();
        feed(
            &mut state,
            json!({"type": "activity", "data": {"id": "web_search", "status": "running", "message": "querying"}}),
            now,
        );
        feed(
            &mut state,
            json!({"type": "activity", "data": {"id": "web_search", "status": "done", "message": "3 hits"}}),
            now,
        );

        let activity = state.snapshot().activity;
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].agent_name, "Web Search");
        assert_eq!(activity[0].status, ActivityStatus::Completed);
        assert_eq!(activity[0].details, "3 hits");
    }

    #[tokio::test(start_paused = true)]
    async fn remembered_tool_is_answered_without_surfacing() {
        let mut state = state();
        let now = Instant::now();
        let request = |id: &str| {
            json!({"type": "tool_confirmation_request", "data": {
                "requestId": id, "toolName": "shell", "toolArgs": {"cmd": "ls"}
            }})
        };

        assert!(feed(&mut state, request("r1"), now).is_empty());
        assert_eq!(
            state.snapshot().pending_confirmation.map(|p| p.request_id),
            Some("r1".to_string())
        );
        state.resolve_confirmation("r1", true, true);
        assert!(state.snapshot().pending_confirmation.is_none());

        let effects = feed(&mut state, request("r2"), now);
        assert_eq!(
            effects,
            vec![Effect::Send(ClientFrame::tool_confirmation_response("r2", true))]
        );
        assert!(state.snapshot().pending_confirmation.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn history_replaces_transcript_once() {
        let mut state = state();
        let now = Instant::now();
        state.on_open();
        state.history_loaded_for_test();
        state.record_user_turn("old");

        let effects = state.switch_session("s2", true);
        assert_eq!(effects, vec![Effect::Send(ClientFrame::set_session("s2"))]);
        let snapshot = state.snapshot();
        assert!(snapshot.messages.is_empty(), "cleared optimistically");
        assert!(snapshot.is_loading_history);
        assert_eq!(snapshot.session_id, "s2");

        feed(
            &mut state,
            json!({"type": "history", "sessionId": "s2", "messages": [
                {"role": "user", "content": "q", "timestamp": "2024-05-01T10:00:00Z"},
                {"role": "assistant", "content": "a", "timestamp": 1714557600000i64}
            ]}),
            now,
        );
        let snapshot = state.snapshot();
        assert!(!snapshot.is_loading_history);
        assert_eq!(snapshot.messages.len(), 2);
        assert!(snapshot.messages.iter().all(|m| m.is_complete));
        assert_eq!(
            snapshot.messages[0].timestamp.to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
        assert_eq!(snapshot.messages[1].timestamp.timestamp_millis(), 1714557600000);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_history_entry_is_skipped() {
        let mut state = state();
        let now = Instant::now();
        state.on_open();
        assert!(state.snapshot().is_loading_history);

        feed(
            &mut state,
            json!({"type": "history", "sessionId": "default", "messages": [
                {"role": "user", "content": "q"},
                {"role": "tool", "content": "t"},
                {"content": "no role"},
                {"role": "assistant", "content": "a"}
            ]}),
            now,
        );
        let snapshot = state.snapshot();
        assert!(!snapshot.is_loading_history);
        assert!(snapshot.error.is_none());
        assert_eq!(
            contents(&state),
            vec![
                (MessageRole::User, "q".to_string(), true),
                (MessageRole::Assistant, "a".to_string(), true),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_history_frame_ends_loading() {
        let mut state = state();
        state.on_open();

        feed(
            &mut state,
            json!({"type": "history", "messages": "not a list"}),
            Instant::now(),
        );
        let snapshot = state.snapshot();
        assert!(!snapshot.is_loading_history);
        assert_eq!(snapshot.error.as_deref(), Some(PARSE_ERROR_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_history_is_ignored() {
        let mut state = state();
        let now = Instant::now();
        state.on_open();
        state.switch_session("s2", true);

        feed(
            &mut state,
            json!({"type": "history", "sessionId": "default", "messages": [
                {"role": "user", "content": "from default"}
            ]}),
            now,
        );
        let snapshot = state.snapshot();
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.is_loading_history);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_clears_session_scoped_state_but_keeps_stats() {
        let mut state = state();
        let now = Instant::now();
        feed(&mut state, json!({"type": "stats", "data": {"memories": 1}}), now);
        feed(&mut state, json!({"type": "search_results", "data": [1]}), now);
        feed(
            &mut state,
            json!({"type": "tool_confirmation_request", "data": {
                "requestId": "r1", "toolName": "shell", "toolArgs": {}
            }}),
            now,
        );
        state.resolve_confirmation("r1", true, true);
        feed(&mut state, chunk("buffered", "n1"), now);

        assert!(state.switch_session("s2", false).is_empty());
        assert!(state.flush_deadline().is_none());
        let snapshot = state.snapshot();
        assert!(snapshot.search_results.is_empty());
        assert!(snapshot.pending_confirmation.is_none());
        assert_eq!(snapshot.stats, Some(json!({"memories": 1})));

        let effects = feed(
            &mut state,
            json!({"type": "tool_confirmation_request", "data": {
                "requestId": "r2", "toolName": "shell", "toolArgs": {}
            }}),
            now,
        );
        assert!(effects.is_empty(), "approvals do not carry across sessions");

        // Deferred switch is requested on the next open
        assert_eq!(
            state.on_open(),
            vec![Effect::Send(ClientFrame::set_session("s2"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn download_progress_is_forwarded() {
        let mut state = state();
        let effects = feed(
            &mut state,
            json!({"type": "download_progress", "data": {"model": "m", "pct": 40}}),
            Instant::now(),
        );
        assert_eq!(
            effects,
            vec![Effect::Notify(ClientEvent::DownloadProgress(
                json!({"model": "m", "pct": 40})
            ))]
        );
        assert!(state.take_changes().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_keeps_buffered_text() {
        let mut state = state();
        let now = Instant::now();
        state.on_open();
        state.record_user_turn("hi");
        feed(&mut state, chunk("half an ans", "n1"), now);
        state.on_disconnect();

        let snapshot = state.snapshot();
        assert!(!snapshot.is_connected);
        assert!(!snapshot.is_processing);
        assert_eq!(snapshot.messages[1].content, "half an ans");
        assert!(snapshot.messages[1].is_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn revisions_only_advance_on_change() {
        let mut state = state();
        assert!(state.take_changes().is_none());
        state.on_open();
        assert_eq!(state.take_changes().map(|s| s.revision), Some(1));
        assert!(state.take_changes().is_none());
        state.record_user_turn("x");
        assert_eq!(state.take_changes().map(|s| s.revision), Some(2));
        assert_eq!(state.revision(), 2);
    }

    impl ChatState {
        fn history_loaded_for_test(&mut self) {
            self.session.history_loaded();
        }
    }
}
