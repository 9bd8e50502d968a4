//! Error types for the seraph turn pipeline.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Missing or malformed configuration (including the system prompt).
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    /// Network failure or non-success status from a collaborator endpoint.
    pub const TRANSPORT_FAILED: &str = "TRANSPORT_FAILED";
    /// Unknown tool or a tool invocation that produced no result.
    pub const TOOL_FAILED: &str = "TOOL_FAILED";
    /// Malformed payload from a collaborator.
    pub const PARSE_FAILED: &str = "PARSE_FAILED";
    /// Speech synthesis failure.
    pub const TTS_FAILED: &str = "TTS_FAILED";
    /// Filesystem error.
    pub const IO_ERROR: &str = "IO_ERROR";
    /// The turn was interrupted before it could complete.
    pub const INTERRUPTED: &str = "INTERRUPTED";
}

/// Top-level error type for turn arbitration and speech synthesis.
#[derive(Debug, thiserror::Error)]
pub enum SeraphError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Model, synthesis, or tool endpoint unreachable or returned an error status.
    #[error("transport error: {0}")]
    Transport(String),

    /// Tool error.
    #[error("tool error: {0}")]
    Tool(String),

    /// Response body could not be understood.
    #[error("parse error: {0}")]
    Parse(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The turn was cancelled by an interrupt.
    #[error("turn interrupted")]
    Interrupted,
}

impl SeraphError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Transport(_) => error_codes::TRANSPORT_FAILED,
            Self::Tool(_) => error_codes::TOOL_FAILED,
            Self::Parse(_) => error_codes::PARSE_FAILED,
            Self::Tts(_) => error_codes::TTS_FAILED,
            Self::Io(_) => error_codes::IO_ERROR,
            Self::Interrupted => error_codes::INTERRUPTED,
        }
    }

    /// Whether this error came from the network layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for SeraphError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SeraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SeraphError>;
