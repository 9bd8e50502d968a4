//! Playback boundary and amplitude analysis for synthesized speech.
//!
//! The actual audio device lives on the rendering side. This module defines
//! the contract it implements and derives the mouth-openness envelope the
//! avatar consumes.

pub mod mouth;
pub mod playback;

pub use mouth::{MouthEnvelope, mouth_envelope};
pub use playback::{ChannelPlaybackEngine, PlaybackCommand, PlaybackEngine};
