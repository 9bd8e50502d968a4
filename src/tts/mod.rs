//! Streaming speech synthesis: segmentation, optional translation, HTTP
//! synthesis, and ordered playback queueing.

pub mod client;
pub mod pipeline;
pub mod segmenter;
pub mod translate;

pub use client::{HttpSynthesizer, Synthesizer};
pub use pipeline::{SpeechOutcome, SpeechPipeline, SpeechSink, SpeechTurn};
pub use segmenter::SentenceSegmenter;
pub use translate::{LlmTranslator, Translator};
