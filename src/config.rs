//! Configuration types for the companion turn pipeline.

use crate::error::{Result, SeraphError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeraphConfig {
    /// Language model endpoint settings.
    pub llm: LlmConfig,
    /// Speech synthesis endpoint settings.
    pub tts: TtsConfig,
    /// Per-segment translation before synthesis.
    pub translator: TranslatorConfig,
    /// Tool discover/invoke protocol settings.
    pub tools: ToolsConfig,
    /// Conversation context window.
    pub context: ContextConfig,
    /// Long-term memory file and save gate.
    pub memory: MemoryConfig,
    /// Screenshot attachment gate.
    pub vision: VisionConfig,
    /// Idle-triggered self-dialogue.
    pub idle: IdleConfig,
    /// Live-chat (barrage) intake.
    pub live_chat: LiveChatConfig,
    /// Dialogue transcript file.
    pub transcript: TranscriptConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL; `/chat/completions` is appended.
    pub api_url: String,
    /// Bearer token. Empty means no `Authorization` header is sent.
    pub api_key: String,
    /// Model identifier sent in every request.
    pub model: String,
    /// Persona prompt installed as the pinned system message.
    pub system_prompt: String,
    /// Request incremental (SSE) delivery.
    pub stream: bool,
    /// Sampling temperature.
    pub temperature: f32,
    /// Timeout for non-streaming requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/v1".to_owned(),
            api_key: String::new(),
            model: "qwen2.5:7b".to_owned(),
            system_prompt: "You are Seraph, a cheerful desktop companion. \
                            Keep replies short and conversational."
                .to_owned(),
            stream: true,
            temperature: 0.7,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Synthesis endpoint accepting `{text, language}`.
    pub url: String,
    /// Language tag forwarded with every segment.
    pub language: String,
    pub request_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6006/v3".to_owned(),
            language: "zh".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

/// Translation applied to each segment before synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// System prompt given to the translation model.
    pub prompt: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "http://localhost:11434/v1".to_owned(),
            api_key: String::new(),
            model: "qwen2.5:7b".to_owned(),
            prompt: "Translate the user's text into Japanese. \
                     Reply with the translation only."
                .to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Discover tools at startup and offer them to the model.
    pub enabled: bool,
    /// Base URL of the tool server; `/discover` and `/invoke` are appended.
    pub server_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "http://localhost:3000/mcp/v1".to_owned(),
        }
    }
}

/// Sliding window applied to the non-system part of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub enable_limit: bool,
    /// Maximum retained non-system messages. Must be at least 1.
    pub max_messages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enable_limit: true,
            max_messages: 10,
        }
    }
}

/// Long-term memory file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Append-only text file. `None` uses the platform data directory.
    pub file_path: Option<PathBuf>,
    /// Decision endpoint asked whether an utterance is worth remembering.
    pub check_url: String,
    /// JSON key holding the yes/no answer.
    pub decision_key: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_path: None,
            check_url: "http://localhost:7878/check".to_owned(),
            decision_key: "needed".to_owned(),
        }
    }
}

impl MemoryConfig {
    /// Resolved memory file location.
    pub fn resolved_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| data_dir().join("memory.txt"))
    }
}

/// Screenshot attachment for user-facing turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enabled: bool,
    /// Decision endpoint asked whether the screen is relevant to an utterance.
    pub check_url: String,
    pub decision_key: String,
    /// Attach a screenshot to every turn without asking.
    pub auto_screenshot: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_url: "http://localhost:7879/check".to_owned(),
            decision_key: "needed".to_owned(),
            auto_screenshot: false,
        }
    }
}

/// Idle-triggered self-dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    pub enabled: bool,
    /// Inactivity before the companion speaks on its own, in milliseconds.
    pub idle_time_ms: u64,
    /// Delay before re-trying a fire that landed while a turn was running.
    pub busy_retry_ms: u64,
    /// User-role prompt submitted for an idle turn.
    pub prompt: String,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_time_ms: 6_000,
            busy_retry_ms: 5_000,
            prompt: "Nobody has said anything for a while. Say something on your own: \
                     share a thought, ask a question, or comment on the moment. \
                     Keep it to one or two sentences."
                .to_owned(),
        }
    }
}

/// Live-chat (barrage) intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveChatConfig {
    pub enabled: bool,
    /// Retained history cap on the source side.
    pub max_messages: usize,
    /// Poll interval for a host-supplied chat feed, in milliseconds.
    pub check_interval_ms: u64,
    /// Re-check delay after each completed turn while entries are queued.
    pub retry_delay_ms: u64,
}

impl Default for LiveChatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_messages: 50,
            check_interval_ms: 5_000,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub enabled: bool,
    /// `None` uses the platform data directory.
    pub file_path: Option<PathBuf>,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_path: None,
        }
    }
}

impl TranscriptConfig {
    /// Resolved transcript file location.
    pub fn resolved_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| data_dir().join("transcript.txt"))
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Directory for daily-rolling log files. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            log_dir: None,
            file_prefix: "seraph.log".to_owned(),
        }
    }
}

impl SeraphConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `SeraphError::Config` when the text is not valid TOML for this schema.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SeraphError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check value constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `SeraphError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_url.trim().is_empty() {
            return Err(SeraphError::Config("llm.api_url must not be empty".into()));
        }
        if self.context.max_messages == 0 {
            return Err(SeraphError::Config(
                "context.max_messages must be at least 1".into(),
            ));
        }
        if self.tts.url.trim().is_empty() {
            return Err(SeraphError::Config("tts.url must not be empty".into()));
        }
        if self.tools.enabled && self.tools.server_url.trim().is_empty() {
            return Err(SeraphError::Config(
                "tools.server_url must be set when tools are enabled".into(),
            ));
        }
        if self.idle.enabled && self.idle.idle_time_ms == 0 {
            return Err(SeraphError::Config(
                "idle.idle_time_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/seraph/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("seraph")
            .join("config.toml")
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("seraph")
}
