//! Tool-confirmation gate.
//!
//! Holds at most one visible request. Tools the user approved with
//! "remember" are answered automatically for the rest of the session.
//! The remembered set is never sent to the backend.

use std::collections::{HashSet, VecDeque};

use chatstream_protocol::ToolConfirmationRequest;

/// Unanswered requests kept answerable after being superseded
const MAX_OUTSTANDING: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The request is now the pending one
    Surfaced,
    /// The tool is remembered; answer approved without surfacing
    AutoApproved { request_id: String },
}

#[derive(Debug, Clone, Default)]
pub struct ToolConfirmationGate {
    pending: Option<ToolConfirmationRequest>,
    remembered: HashSet<String>,
    /// (request id, tool name) for requests surfaced but not yet answered,
    /// oldest first
    outstanding: VecDeque<(String, String)>,
}

impl ToolConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&ToolConfirmationRequest> {
        self.pending.as_ref()
    }

    pub fn is_remembered(&self, tool_name: &str) -> bool {
        self.remembered.contains(tool_name)
    }

    pub fn offer(&mut self, request: ToolConfirmationRequest) -> GateOutcome {
        if self.remembered.contains(&request.tool_name) {
            return GateOutcome::AutoApproved {
                request_id: request.request_id,
            };
        }
        self.outstanding
            .retain(|(id, _)| *id != request.request_id);
        if self.outstanding.len() == MAX_OUTSTANDING {
            self.outstanding.pop_front();
        }
        self.outstanding
            .push_back((request.request_id.clone(), request.tool_name.clone()));
        self.pending = Some(request);
        GateOutcome::Surfaced
    }

    /// Record the user's answer once it has been sent.
    ///
    /// Clears the pending request only if it is the one being answered; a
    /// newer request that superseded it stays visible.
    pub fn resolve(&mut self, request_id: &str, approved: bool, remember: bool) {
        let tool_name = self
            .outstanding
            .iter()
            .position(|(id, _)| id == request_id)
            .and_then(|index| self.outstanding.remove(index))
            .map(|(_, tool_name)| tool_name);
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.request_id == request_id)
        {
            self.pending = None;
        }
        if approved && remember {
            if let Some(tool_name) = tool_name {
                self.remembered.insert(tool_name);
            }
        }
    }

    /// Forget everything, including remembered approvals.
    pub fn reset(&mut self) {
        self.pending = None;
        self.remembered.clear();
        self.outstanding.clear();
    }
}
