//! Conversation history with a pinned system entry and sliding-window trim.
//!
//! [`Message`] content is a sum type so that every branch point (plain text,
//! multimodal user input, assistant tool calls, tool results) is handled
//! exhaustively.

use crate::error::{Result, SeraphError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of multimodal user content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Image reference, usually a `data:image/...;base64,` URL.
    Image { url: String },
}

/// A model-issued request to run a named function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments string, exactly as the model produced it.
    pub arguments: String,
}

/// The content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    /// Ordered text and image parts.
    Multimodal { parts: Vec<ContentPart> },
    /// Assistant message carrying tool calls and no text.
    ToolCalls { calls: Vec<ToolCall> },
    /// Tool output keyed to the call that requested it.
    ToolResult { call_id: String, content: String },
}

/// A message in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text { text: text.into() },
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// User message with text followed by image parts.
    pub fn user_multimodal(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Multimodal { parts },
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCalls { calls },
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                call_id: call_id.into(),
                content: content.into(),
            },
        }
    }

    /// The text of a plain-text message.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Human-readable text of the message, joining text parts and
    /// dropping images. Used for transcripts and logs.
    pub fn display_text(&self) -> String {
        match &self.content {
            MessageContent::Text { text } => text.clone(),
            MessageContent::Multimodal { parts } => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
            MessageContent::ToolCalls { calls } => calls
                .iter()
                .map(|c| format!("{}({})", c.name, c.arguments))
                .collect::<Vec<_>>()
                .join(", "),
            MessageContent::ToolResult { content, .. } => content.clone(),
        }
    }
}

/// Ordered message history.
///
/// The first element, when present, is the system message; trimming never
/// removes system messages.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    /// Window applied by [`enforce_limit`](Self::enforce_limit); `None` keeps everything.
    limit: Option<usize>,
}

impl ConversationLog {
    /// Log seeded with the pinned system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            limit: None,
        }
    }

    /// Log with no messages at all. [`find_system_prompt`](Self::find_system_prompt)
    /// fails until a system message is appended.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Keep every system message plus the last `max_non_system` other messages,
    /// preserving relative order within each partition.
    ///
    /// Tool results left at the front of the window without the assistant
    /// call they answer are dropped as well.
    ///
    /// Returns how many messages were removed. Idempotent.
    pub fn trim(&mut self, max_non_system: usize) -> usize {
        let non_system = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .count();
        if non_system <= max_non_system {
            return 0;
        }
        let mut removed = non_system - max_non_system;
        let (system, others): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.role == Role::System);
        let mut kept = others.into_iter().skip(removed).peekable();
        while kept.next_if(|m| m.role == Role::Tool).is_some() {
            removed += 1;
        }
        self.messages = system;
        self.messages.extend(kept);
        removed
    }

    /// Text of the first system message.
    ///
    /// # Errors
    ///
    /// `SeraphError::Config` when no system message exists or it is not plain text.
    pub fn find_system_prompt(&self) -> Result<&str> {
        let system = self
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .ok_or_else(|| SeraphError::Config("conversation has no system prompt".into()))?;
        system
            .as_text()
            .ok_or_else(|| SeraphError::Config("system prompt is not plain text".into()))
    }

    /// Configure the window used by [`enforce_limit`](Self::enforce_limit).
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Trim to the configured window, if any.
    pub fn enforce_limit(&mut self) -> usize {
        match self.limit {
            Some(max) => self.trim(max),
            None => 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Conversation log shared between the orchestrator and the generator.
///
/// Never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SharedLog(Arc<Mutex<ConversationLog>>);

impl SharedLog {
    pub fn new(log: ConversationLog) -> Self {
        Self(Arc::new(Mutex::new(log)))
    }

    pub fn lock(&self) -> MutexGuard<'_, ConversationLog> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current messages.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().messages().to_vec()
    }
}
