//! Per-generation activity log, one row per agent.

use chatstream_protocol::{ActivityEntry, ActivityUpdate};

/// Internal step identifiers the backend emits, and the name shown for each.
const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("router", "Router"),
    ("planner", "Planner"),
    ("researcher", "Researcher"),
    ("web_search", "Web Search"),
    ("memory_retrieval", "Memory"),
    ("memory_update", "Memory"),
    ("tool_executor", "Tool Executor"),
    ("code_executor", "Code Executor"),
    ("critic", "Critic"),
    ("synthesizer", "Synthesizer"),
];

/// Map an internal step id to its display name. Unknown ids pass through.
pub fn display_name(step_id: &str) -> &str {
    DISPLAY_NAMES
        .iter()
        .find(|(id, _)| *id == step_id)
        .map(|(_, name)| *name)
        .unwrap_or(step_id)
}

#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the row for this update's agent.
    pub fn upsert(&mut self, update: ActivityUpdate) {
        let agent_name = display_name(&update.id).to_string();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.agent_name == agent_name) {
            entry.status = update.status;
            entry.details = update.message;
            return;
        }

        let step = u32::try_from(self.entries.len() + 1).unwrap_or(u32::MAX);
        self.entries.push(ActivityEntry {
            agent_name,
            status: update.status,
            details: update.message,
            step,
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }
}
