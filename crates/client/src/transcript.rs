//! Ordered message sequence with a dedicated in-progress slot.
//!
//! Committed messages are append-only. At most one assistant message is
//! still receiving text; it lives in `in_progress` and is always the tail
//! of the visible sequence.

use chatstream_protocol::Message;

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    committed: Vec<Message>,
    in_progress: Option<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed message.
    pub fn push(&mut self, mut message: Message) {
        message.is_complete = true;
        self.committed.push(message);
    }

    pub fn in_progress(&self) -> Option<&Message> {
        self.in_progress.as_ref()
    }

    pub fn in_progress_mut(&mut self) -> Option<&mut Message> {
        self.in_progress.as_mut()
    }

    pub fn in_progress_node(&self) -> Option<&str> {
        self.in_progress.as_ref().and_then(|m| m.node_id.as_deref())
    }

    /// Start a new in-progress message. Any existing one is completed first.
    pub fn begin(&mut self, mut message: Message) {
        self.complete_in_progress();
        message.is_complete = false;
        self.in_progress = Some(message);
    }

    /// Move the in-progress message into the committed sequence.
    pub fn complete_in_progress(&mut self) -> bool {
        match self.in_progress.take() {
            Some(mut message) => {
                message.is_complete = true;
                self.committed.push(message);
                true
            }
            None => false,
        }
    }

    pub fn replace(&mut self, messages: Vec<Message>) {
        self.in_progress = None;
        self.committed = messages
            .into_iter()
            .map(|mut m| {
                m.is_complete = true;
                m
            })
            .collect();
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.in_progress = None;
    }

    pub fn len(&self) -> usize {
        self.committed.len() + usize::from(self.in_progress.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visible sequence: committed messages followed by the in-progress one.
    pub fn to_vec(&self) -> Vec<Message> {
        self.committed
            .iter()
            .chain(self.in_progress.iter())
            .cloned()
            .collect()
    }
}
