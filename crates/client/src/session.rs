//! Active-session tracking and history-replay requests.

use chatstream_protocol::ClientFrame;

#[derive(Debug, Clone)]
pub struct SessionController {
    current: String,
    loading_history: bool,
    /// History for `current` still has to be requested on the next open
    needs_sync: bool,
}

impl SessionController {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: initial.into(),
            loading_history: false,
            needs_sync: true,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn is_loading_history(&self) -> bool {
        self.loading_history
    }

    /// Point at a new session. Returns the `set_session` frame to send when
    /// connected; otherwise the request is deferred to the next open.
    pub fn switch(&mut self, session_id: impl Into<String>, connected: bool) -> Option<ClientFrame> {
        self.current = session_id.into();
        self.loading_history = true;
        if connected {
            self.needs_sync = false;
            Some(ClientFrame::set_session(self.current.clone()))
        } else {
            self.needs_sync = true;
            None
        }
    }

    /// Called on every successful open. Only the first open, or one that
    /// follows a switch made while disconnected, requests history.
    pub fn on_open(&mut self) -> Option<ClientFrame> {
        if !self.needs_sync {
            return None;
        }
        self.needs_sync = false;
        self.loading_history = true;
        Some(ClientFrame::set_session(self.current.clone()))
    }

    /// Whether a `history` frame tagged with `session_id` belongs to the
    /// current session. Untagged history is accepted.
    pub fn accepts_history(&self, session_id: Option<&str>) -> bool {
        session_id.map_or(true, |id| id == self.current)
    }

    pub fn history_loaded(&mut self) {
        self.loading_history = false;
    }

    /// A `set_session` that was sent but never answered must be re-sent
    /// after a reconnect.
    pub fn on_disconnect(&mut self) {
        if self.loading_history {
            self.needs_sync = true;
        }
    }
}
