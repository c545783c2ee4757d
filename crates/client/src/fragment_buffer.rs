//! Fragment coalescing.
//!
//! Chunks arrive a few characters at a time. They are accumulated in a
//! pending buffer and moved into the transcript when the flush deadline
//! passes, when the generation node changes, or when the stream closes.
//!
//! The buffer holds no timer itself: it exposes a single optional
//! deadline that the owning event loop sleeps on. A deadline is only set
//! when none is armed, so a burst of fragments never schedules two flushes.

use std::time::Duration;

use chatstream_protocol::{new_id, Message, MessageRole};
use chrono::Utc;
use tokio::time::Instant;

use crate::transcript::Transcript;

/// One incoming piece of assistant text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub mode: Option<String>,
    pub agent_name: Option<String>,
    pub node_id: Option<String>,
}

impl Fragment {
    pub fn new(text: impl Into<String>, node_id: Option<&str>) -> Self {
        Self {
            text: text.into(),
            node_id: node_id.map(str::to_string),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct FragmentMeta {
    mode: Option<String>,
    agent_name: Option<String>,
    node_id: Option<String>,
}

impl FragmentMeta {
    /// Keep what we have; take anything still missing from `other`.
    fn fill_from(&mut self, other: FragmentMeta) {
        if self.mode.is_none() {
            self.mode = other.mode;
        }
        if self.agent_name.is_none() {
            self.agent_name = other.agent_name;
        }
        if self.node_id.is_none() {
            self.node_id = other.node_id;
        }
    }

    fn apply_missing_to(&self, message: &mut Message) {
        if message.mode.is_none() {
            message.mode = self.mode.clone();
        }
        if message.agent_name.is_none() {
            message.agent_name = self.agent_name.clone();
        }
        if message.node_id.is_none() {
            message.node_id = self.node_id.clone();
        }
    }
}

#[derive(Debug, Clone)]
struct PendingFragment {
    text: String,
    meta: FragmentMeta,
}

/// What a `push` did to the visible transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Text was buffered; nothing visible changed yet
    Buffered,
    /// The node changed: the previous message was completed and a new one
    /// started with this fragment's text
    NodeBoundary,
    /// Empty fragment, nothing to do
    Ignored,
}

#[derive(Debug, Clone)]
pub struct FragmentBuffer {
    interval: Duration,
    pending: Option<PendingFragment>,
    flush_at: Option<Instant>,
}

impl FragmentBuffer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
            flush_at: None,
        }
    }

    pub fn flush_deadline(&self) -> Option<Instant> {
        self.flush_at
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Node the next fragment is compared against: the buffered node if
    /// it has one, otherwise the in-progress message's node.
    fn current_node<'a>(&'a self, transcript: &'a Transcript) -> Option<&'a str> {
        match self.pending.as_ref().and_then(|p| p.meta.node_id.as_deref()) {
            Some(node) => Some(node),
            None => transcript.in_progress_node(),
        }
    }

    pub fn push(
        &mut self,
        fragment: Fragment,
        transcript: &mut Transcript,
        now: Instant,
    ) -> PushOutcome {
        if fragment.text.is_empty() {
            return PushOutcome::Ignored;
        }

        let boundary = match (fragment.node_id.as_deref(), self.current_node(transcript)) {
            (Some(incoming), Some(current)) => incoming != current,
            _ => false,
        };

        let Fragment {
            text,
            mode,
            agent_name,
            node_id,
        } = fragment;
        let meta = FragmentMeta {
            mode,
            agent_name,
            node_id,
        };

        if boundary {
            self.flush(transcript);
            transcript.complete_in_progress();
            transcript.begin(new_assistant_message(text, &meta));
            return PushOutcome::NodeBoundary;
        }

        match self.pending.as_mut() {
            Some(pending) => {
                pending.text.push_str(&text);
                pending.meta.fill_from(meta);
            }
            None => self.pending = Some(PendingFragment { text, meta }),
        }
        if self.flush_at.is_none() {
            self.flush_at = Some(now + self.interval);
        }
        PushOutcome::Buffered
    }

    /// Whether the armed deadline has passed.
    pub fn is_due(&self, now: Instant) -> bool {
        self.flush_at.is_some_and(|at| at <= now)
    }

    /// Move buffered text into the transcript and disarm the deadline.
    /// Returns true if anything visible changed.
    pub fn flush(&mut self, transcript: &mut Transcript) -> bool {
        self.flush_at = None;
        let Some(PendingFragment { text, meta }) = self.pending.take() else {
            return false;
        };

        match transcript.in_progress_mut() {
            Some(message) => {
                message.content.push_str(&text);
                meta.apply_missing_to(message);
            }
            None => transcript.begin(new_assistant_message(text, &meta)),
        }
        true
    }

    /// End of stream: flush what is buffered and complete the in-progress
    /// message. Returns true if anything visible changed.
    pub fn close(&mut self, transcript: &mut Transcript) -> bool {
        let flushed = self.flush(transcript);
        let completed = transcript.complete_in_progress();
        flushed || completed
    }

    /// Forget buffered text without touching the transcript.
    pub fn reset(&mut self) {
        self.pending = None;
        self.flush_at = None;
    }
}

fn new_assistant_message(text: String, meta: &FragmentMeta) -> Message {
    Message {
        id: new_id(),
        role: MessageRole::Assistant,
        content: text,
        timestamp: Utc::now(),
        mode: meta.mode.clone(),
        agent_name: meta.agent_name.clone(),
        node_id: meta.node_id.clone(),
        is_complete: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(50);

    fn setup() -> (FragmentBuffer, Transcript, Instant) {
        (FragmentBuffer::new(INTERVAL), Transcript::new(), Instant::now())
    }

    fn contents(transcript: &Transcript) -> Vec<(String, bool)> {
        transcript
            .to_vec()
            .into_iter()
            .map(|m| (m.content, m.is_complete))
            .collect()
    }

    #[test]
    fn same_node_fragments_coalesce_on_flush() {
        let (mut buffer, mut transcript, now) = setup();
        buffer.push(Fragment::new("Hel", Some("n1")), &mut transcript, now);
        buffer.push(Fragment::new("lo", Some("n1")), &mut transcript, now);
        assert!(transcript.is_empty(), "nothing visible before flush");

        assert!(buffer.flush(&mut transcript));
        assert_eq!(contents(&transcript), vec![("Hello".to_string(), false)]);
        assert_eq!(transcript.in_progress_node(), Some("n1"));
    }

    #[test]
    fn node_change_completes_previous_before_new_text() {
        let (mut buffer, mut transcript, now) = setup();
        buffer.push(Fragment::new("A", Some("n1")), &mut transcript, now);
        let outcome = buffer.push(Fragment::new("B", Some("n2")), &mut transcript, now);

        assert_eq!(outcome, PushOutcome::NodeBoundary);
        assert_eq!(
            contents(&transcript),
            vec![("A".to_string(), true), ("B".to_string(), false)]
        );
        assert!(buffer.flush_deadline().is_none());
    }

    #[test]
    fn node_change_after_flush_completes_existing_message() {
        let (mut buffer, mut transcript, now) = setup();
        buffer.push(Fragment::new("first ", Some("n1")), &mut transcript, now);
        buffer.flush(&mut transcript);
        buffer.push(Fragment::new("part", Some("n1")), &mut transcript, now);
        buffer.push(Fragment::new("second", Some("n2")), &mut transcript, now);

        assert_eq!(
            contents(&transcript),
            vec![("first part".to_string(), true), ("second".to_string(), false)]
        );
    }

    #[test]
    fn deadline_is_armed_once_per_flush_cycle() {
        let (mut buffer, mut transcript, now) = setup();
        buffer.push(Fragment::new("a", Some("n1")), &mut transcript, now);
        let first = buffer.flush_deadline().expect("armed");
        buffer.push(
            Fragment::new("b", Some("n1")),
            &mut transcript,
            now + Duration::from_millis(30),
        );
        assert_eq!(buffer.flush_deadline(), Some(first));
        assert!(!buffer.is_due(now + Duration::from_millis(49)));
        assert!(buffer.is_due(now + INTERVAL));

        buffer.flush(&mut transcript);
        assert!(buffer.flush_deadline().is_none());
        assert!(!buffer.flush(&mut transcript), "second flush is a no-op");
        assert_eq!(contents(&transcript), vec![("ab".to_string(), false)]);
    }

    #[test]
    fn close_flushes_and_completes() {
        let (mut buffer, mut transcript, now) = setup();
        buffer.push(Fragment::new("tail", Some("n1")), &mut transcript, now);
        assert!(buffer.close(&mut transcript));

        assert_eq!(contents(&transcript), vec![("tail".to_string(), true)]);
        assert!(!buffer.has_pending());
        assert!(buffer.flush_deadline().is_none());
        assert!(!buffer.close(&mut transcript));
    }

    #[test]
    fn fragments_without_node_continue_current_message() {
        let (mut buffer, mut transcript, now) = setup();
        buffer.push(Fragment::new("x", Some("n1")), &mut transcript, now);
        buffer.flush(&mut transcript);
        assert_eq!(
            buffer.push(Fragment::new("y", None), &mut transcript, now),
            PushOutcome::Buffered
        );
        buffer.flush(&mut transcript);
        assert_eq!(contents(&transcript), vec![("xy".to_string(), false)]);
    }

    #[test]
    fn metadata_is_filled_from_later_fragments() {
        let (mut buffer, mut transcript, now) = setup();
        buffer.push(Fragment::new("a", Some("n1")), &mut transcript, now);
        buffer.push(
            Fragment {
                text: "b".into(),
                mode: Some("agent".into()),
                agent_name: Some("Planner".into()),
                node_id: Some("n1".into()),
            },
            &mut transcript,
            now,
        );
        buffer.flush(&mut transcript);

        let message = transcript.in_progress().expect("in progress");
        assert_eq!(message.agent_name.as_deref(), Some("Planner"));
        assert_eq!(message.mode.as_deref(), Some("agent"));
    }

    #[test]
    fn concatenation_preserves_arrival_order() {
        let (mut buffer, mut transcript, now) = setup();
        let pieces = ["The ", "quick ", "br", "own ", "fox"];
        for (i, piece) in pieces.iter().enumerate() {
            buffer.push(Fragment::new(*piece, Some("n1")), &mut transcript, now);
            if i % 2 == 1 {
                buffer.flush(&mut transcript);
            }
        }
        buffer.close(&mut transcript);
        assert_eq!(
            contents(&transcript),
            vec![("The quick brown fox".to_string(), true)]
        );
    }

    #[test]
    fn empty_fragment_is_ignored() {
        let (mut buffer, mut transcript, now) = setup();
        assert_eq!(
            buffer.push(Fragment::new("", Some("n1")), &mut transcript, now),
            PushOutcome::Ignored
        );
        assert!(buffer.flush_deadline().is_none());
    }
}
