//! Seraph: turn-arbitrated conversational companion core.
//!
//! Several independent inputs (recognized speech, live-chat messages, an
//! idle trigger, and typed text) are merged into one ordered dialogue with
//! at most one turn in flight. Each turn streams a model response, with an
//! optional single tool round-trip, and renders it as segmented speech that
//! plays in generation order.
//!
//! # Architecture
//!
//! - **State**: three busy flags with change notification ([`state`])
//! - **Conversation**: pinned system prompt plus a sliding window ([`conversation`])
//! - **Generation**: streaming OpenAI-compatible client and tool-aware strategy ([`llm`], [`tools`])
//! - **Speech**: sentence segmentation, concurrent synthesis, ordered playback ([`tts`], [`audio`])
//! - **Orchestration**: admission, finalization, chat queue, idle timer ([`pipeline`])
//!
//! The host supplies the playback engine and, optionally, a chat feed and a
//! screenshot provider, then drives a [`TurnOrchestrator`].

pub mod audio;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod diagnostics;
pub mod error;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod tools;
pub mod tts;
pub mod vision;

pub use config::SeraphConfig;
pub use error::{Result, SeraphError};
pub use pipeline::coordinator::{OrchestratorBuilder, TurnOrchestrator};
pub use pipeline::messages::{TurnOutcome, TurnSource};
pub use runtime::RuntimeEvent;
pub use state::{BusyFlag, StateCoordinator};
