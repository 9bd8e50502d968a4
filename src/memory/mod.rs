//! Plain-text long-term memory and dialogue transcript.
//!
//! Memory is an append-only text file whose content is folded into the
//! system prompt at startup. An external decision endpoint decides which
//! utterances are worth remembering.

pub mod gate;
pub mod store;
pub mod transcript;

pub use gate::DecisionGate;
pub use store::MemoryFile;
pub use transcript::TranscriptWriter;
