pub mod coordinator;
pub mod messages;

pub use coordinator::{OrchestratorBuilder, TurnOrchestrator};
pub use messages::{ChatQueueEntry, PlaybackSegment, TurnOutcome, TurnSource};
