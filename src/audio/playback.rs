//! Contract for the external engine that plays one segment at a time.

use crate::pipeline::messages::PlaybackSegment;
use tokio::sync::mpsc;
use tracing::warn;

/// Plays synthesized segments.
///
/// The engine receives at most one segment at a time and must report
/// completion through `SpeechPipeline::playback_finished` (or the
/// orchestrator's equivalent) before the next one is delivered. The report
/// names the segment's `generation` and `seq`; reports for a stopped
/// segment are ignored.
pub trait PlaybackEngine: Send + Sync {
    /// Start playing `segment`. Must not block.
    fn play(&self, segment: PlaybackSegment);

    /// Stop whatever is playing and discard it.
    fn stop(&self);
}

/// Commands forwarded by [`ChannelPlaybackEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play(PlaybackSegment),
    Stop,
}

/// Forwards playback commands to a channel, for hosts that drive their audio
/// device from a separate task.
#[derive(Debug, Clone)]
pub struct ChannelPlaybackEngine {
    tx: mpsc::UnboundedSender<PlaybackCommand>,
}

impl ChannelPlaybackEngine {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlaybackCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PlaybackEngine for ChannelPlaybackEngine {
    fn play(&self, segment: PlaybackSegment) {
        if self.tx.send(PlaybackCommand::Play(segment)).is_err() {
            warn!("playback receiver dropped; segment discarded");
        }
    }

    fn stop(&self) {
        let _ = self.tx.send(PlaybackCommand::Stop);
    }
}
