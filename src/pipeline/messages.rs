//! Message types passed between pipeline stages.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

/// A live-chat message waiting for turn admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatQueueEntry {
    /// Viewer nickname.
    pub sender: String,
    pub text: String,
    pub enqueued_at: DateTime<Utc>,
}

impl ChatQueueEntry {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// User-role text submitted to the model for this entry.
    pub fn prompt(&self) -> String {
        format!("[chat] {}: {}", self.sender, self.text)
    }
}

/// One synthesized segment, owned by the playback engine once delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSegment {
    /// Speech generation the segment belongs to. Echoed back, with `seq`,
    /// when the engine reports completion.
    pub generation: u64,
    /// Position within the turn, starting at 0.
    pub seq: u64,
    /// Segment text as generated.
    pub source_text: String,
    /// Text actually synthesized and shown as subtitle.
    pub rendered_text: String,
    pub was_translated: bool,
    pub audio: Bytes,
}

/// Where an admitted turn came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnSource {
    Speech,
    Chat,
    Idle,
    DirectText,
}

impl fmt::Display for TurnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Speech => "speech",
            Self::Chat => "chat",
            Self::Idle => "idle",
            Self::DirectText => "direct_text",
        })
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Response generated and fully played.
    Completed { response: String },
    /// Generation failed; nothing beyond the user message was committed.
    Failed { reason: String },
    /// Not admitted because another turn was in flight.
    Rejected,
    /// Cancelled by an interrupt.
    Interrupted,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The assistant response of a completed turn.
    pub fn response(&self) -> Option<&str> {
        match self {
            Self::Completed { response } => Some(response),
            _ => None,
        }
    }
}
