//! Response generation against an OpenAI-compatible model endpoint.
//!
//! [`select_generator`] picks the strategy once at startup: a plain
//! streaming generator, or a tool-aware decorator when the tool server
//! offered at least one function.

pub mod api;
pub mod generator;
pub mod sse;

pub use api::{ModelClient, ModelReply};
pub use generator::{
    GeneratedReply, PlainGenerator, ResponseGenerator, ToolAwareGenerator, TurnPhase,
    select_generator,
};

/// Receiver for incremental response text.
pub trait TextSink: Send {
    fn push_text(&mut self, text: &str);
}

impl<F> TextSink for F
where
    F: FnMut(&str) + Send,
{
    fn push_text(&mut self, text: &str) {
        self(text);
    }
}
