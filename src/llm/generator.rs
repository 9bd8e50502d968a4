//! Turn-level response generation with an optional single tool round-trip.

use super::TextSink;
use super::api::{ModelClient, ModelReply};
use crate::conversation::{Message, SharedLog};
use crate::error::{Result, SeraphError};
use crate::tools::ToolInvoker;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-turn generation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Requesting,
    StreamingContent,
    AwaitingToolResult,
    Completed,
    Failed,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::StreamingContent => "streaming_content",
            Self::AwaitingToolResult => "awaiting_tool_result",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of a successful generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    /// Final assistant text, as committed to the log.
    pub text: String,
    /// Phases visited, starting at `Requesting` and ending at `Completed`.
    pub phases: Vec<TurnPhase>,
    /// Name of the tool that was executed, if any.
    pub tool_used: Option<String>,
}

/// Produces the assistant response for one admitted turn.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Append `user` to the log, query the model, stream content into
    /// `sink`, and commit the assistant reply on success.
    ///
    /// Nothing besides the user message is committed when this fails or is
    /// cancelled.
    async fn generate(
        &self,
        log: &SharedLog,
        user: Message,
        sink: &mut dyn TextSink,
        cancel: &CancellationToken,
    ) -> Result<GeneratedReply>;
}

/// Records phase transitions for one turn.
struct PhaseTrack {
    phases: Vec<TurnPhase>,
}

impl PhaseTrack {
    fn new() -> Self {
        Self {
            phases: vec![TurnPhase::Idle],
        }
    }

    fn enter(&mut self, phase: TurnPhase) {
        debug!(%phase, "generation phase");
        self.phases.push(phase);
    }

    fn into_phases(self) -> Vec<TurnPhase> {
        self.phases.into_iter().skip(1).collect()
    }
}

/// Append the user message, apply the window, and return the request snapshot.
fn open_turn(log: &SharedLog, user: Message) -> Vec<Message> {
    let mut log = log.lock();
    log.append(user);
    log.enforce_limit();
    log.messages().to_vec()
}

/// Commit the messages of a completed turn, unless it was interrupted.
fn commit_turn(
    log: &SharedLog,
    pending: Vec<Message>,
    text: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SeraphError::Interrupted);
    }
    let mut log = log.lock();
    for message in pending {
        log.append(message);
    }
    log.append(Message::assistant(text));
    let removed = log.enforce_limit();
    if removed > 0 {
        debug!(removed, "trimmed conversation history");
    }
    Ok(())
}

/// Streams content with no tools offered.
pub struct PlainGenerator {
    client: Arc<ModelClient>,
}

impl PlainGenerator {
    pub fn new(client: Arc<ModelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseGenerator for PlainGenerator {
    fn name(&self) -> &'static str {
        "plain"
    }

    async fn generate(
        &self,
        log: &SharedLog,
        user: Message,
        sink: &mut dyn TextSink,
        cancel: &CancellationToken,
    ) -> Result<GeneratedReply> {
        let mut track = PhaseTrack::new();
        let messages = open_turn(log, user);

        track.enter(TurnPhase::Requesting);
        let reply = match self.client.complete(&messages, &[], sink, cancel).await {
            Ok(r) => r,
            Err(e) => {
                track.enter(TurnPhase::Failed);
                return Err(e);
            }
        };
        track.enter(TurnPhase::StreamingContent);
        let text = match reply {
            ModelReply::Content(text) => text,
            ModelReply::ToolCalls { content, calls } => {
                warn!(
                    count = calls.len(),
                    "model requested tools that were never offered; using content"
                );
                content
            }
        };

        commit_turn(log, Vec::new(), &text, cancel)?;
        track.enter(TurnPhase::Completed);
        Ok(GeneratedReply {
            text,
            phases: track.into_phases(),
            tool_used: None,
        })
    }
}

/// Offers discovered tools and performs at most one tool round-trip.
pub struct ToolAwareGenerator {
    client: Arc<ModelClient>,
    tools: Arc<ToolInvoker>,
}

impl ToolAwareGenerator {
    pub fn new(client: Arc<ModelClient>, tools: Arc<ToolInvoker>) -> Self {
        Self { client, tools }
    }
}

/// Parse model-produced tool arguments, falling back to `{}`.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(v) if v.is_object() => v,
        Ok(_) | Err(_) => {
            warn!("tool arguments were not a JSON object, using {{}}: {raw}");
            serde_json::json!({})
        }
    }
}

/// Glue between pre-tool text and the final answer.
fn preamble_separator(preamble: &str) -> &'static str {
    if preamble.trim().is_empty() || preamble.ends_with(char::is_whitespace) {
        ""
    } else {
        " "
    }
}

#[async_trait]
impl ResponseGenerator for ToolAwareGenerator {
    fn name(&self) -> &'static str {
        "with_tools"
    }

    async fn generate(
        &self,
        log: &SharedLog,
        user: Message,
        sink: &mut dyn TextSink,
        cancel: &CancellationToken,
    ) -> Result<GeneratedReply> {
        let mut track = PhaseTrack::new();
        let mut messages = open_turn(log, user);
        let schemas = self.tools.schemas_for_api();

        let result: Result<(String, Vec<Message>, Option<String>)> = async {
            track.enter(TurnPhase::Requesting);
            let first = self.client.complete(&messages, &schemas, sink, cancel).await?;
            let ModelReply::ToolCalls {
                content: preamble,
                calls,
            } = first
            else {
                track.enter(TurnPhase::StreamingContent);
                return Ok((first.content().to_owned(), Vec::new(), None));
            };

            if calls.len() > 1 {
                warn!(count = calls.len(), "only the first tool call is executed");
            }
            let Some(call) = calls.into_iter().next() else {
                return Err(SeraphError::Parse("empty tool call list".into()));
            };
            track.enter(TurnPhase::AwaitingToolResult);
            info!(tool = %call.name, "model requested tool");

            let arguments = parse_arguments(&call.arguments);
            let output = self
                .tools
                .invoke(&call.name, arguments)
                .await?
                .ok_or_else(|| SeraphError::Tool(format!("tool '{}' returned no result", call.name)))?;

            let tool_name = call.name.clone();
            let call_id = call.id.clone();
            let pending = vec![
                Message::assistant_tool_calls(vec![call]),
                Message::tool_result(call_id, output),
            ];
            messages.extend(pending.iter().cloned());

            // Text streamed before the tool call has already been spoken, so
            // it stays part of the reply.
            let separator = preamble_separator(&preamble);
            if !separator.is_empty() {
                sink.push_text(separator);
            }

            track.enter(TurnPhase::Requesting);
            let second = self.client.complete(&messages, &[], sink, cancel).await?;
            track.enter(TurnPhase::StreamingContent);
            let text = match second {
                ModelReply::Content(text) => text,
                ModelReply::ToolCalls { content, calls } => {
                    warn!(
                        count = calls.len(),
                        "second tool request in one turn ignored; treating content as final"
                    );
                    content
                }
            };
            let text = if preamble.trim().is_empty() {
                text
            } else {
                format!("{preamble}{separator}{text}")
            };
            Ok((text, pending, Some(tool_name)))
        }
        .await;

        let (text, pending, tool_used) = match result {
            Ok(v) => v,
            Err(e) => {
                track.enter(TurnPhase::Failed);
                return Err(e);
            }
        };
        commit_turn(log, pending, &text, cancel)?;
        track.enter(TurnPhase::Completed);
        Ok(GeneratedReply {
            text,
            phases: track.into_phases(),
            tool_used,
        })
    }
}

/// Choose the generation strategy for the session.
pub fn select_generator(
    client: Arc<ModelClient>,
    tools: Option<Arc<ToolInvoker>>,
) -> Arc<dyn ResponseGenerator> {
    match tools {
        Some(tools) if tools.has_tools() => {
            info!(count = tools.tools().len(), "tool-aware generation enabled");
            Arc::new(ToolAwareGenerator::new(client, tools))
        }
        _ => Arc::new(PlainGenerator::new(client)),
    }
}
