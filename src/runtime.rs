//! Runtime events emitted by the turn pipeline for the rendering side.
//!
//! Events are broadcast best-effort: a lagging or absent receiver never
//! blocks the pipeline.

use crate::pipeline::messages::TurnSource;
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the runtime event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events that describe what the companion is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// A turn was admitted.
    TurnStarted { source: TurnSource },
    /// A turn ended, whatever the outcome.
    TurnFinished { source: TurnSource, completed: bool },
    /// User-visible echo of the input that started a turn.
    UserMessage { source: TurnSource, text: String },
    /// Whether synthesized speech is currently playing for a turn.
    Speaking { active: bool },
    /// Show a subtitle for the segment that just started playing.
    SubtitleShow {
        text: String,
        /// Decoded audio duration, when known.
        duration: Option<Duration>,
    },
    /// Hide the subtitle after `delay`.
    SubtitleHide { delay: Duration },
    /// Per-frame mouth openness in `[0, 1]` for the segment now playing.
    MouthEnvelope { fps: u32, levels: Vec<f32> },
    /// Immediate mouth openness, used to close the mouth at segment end.
    MouthOpenness { level: f32 },
    /// Transient error feedback shown for `duration`.
    ErrorFeedback { message: String, duration: Duration },
    /// Speech capture should pause while a turn runs.
    RecognitionPaused,
    /// Speech capture may resume.
    RecognitionResumed,
    /// The turn's response has been fully spoken (or there was nothing to speak).
    DialogueEnded,
}

/// Sender half shared by every component that emits runtime events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<RuntimeEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }

    /// Emit without caring whether anyone listens.
    pub fn emit(&self, event: RuntimeEvent) {
        let _ = self.tx.send(event);
    }
}
