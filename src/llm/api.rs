//! OpenAI-compatible chat completion client.
//!
//! Handles both delivery modes: SSE streaming (`data: <json>` frames ending
//! in `[DONE]`) and a single JSON body. Content text is forwarded to a
//! [`TextSink`] as soon as it is known; tool calls are collected and
//! returned to the caller.

use super::TextSink;
use super::sse::{SseFrame, SseLineParser};
use crate::config::LlmConfig;
use crate::conversation::{ContentPart, Message, MessageContent, ToolCall};
use crate::error::{Result, SeraphError};
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Tool call slots accepted from one streamed reply.
const MAX_TOOL_CALLS: usize = 16;

/// What the model produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    /// Final text.
    Content(String),
    /// The model asked for tools. `content` is any text emitted alongside.
    ToolCalls { content: String, calls: Vec<ToolCall> },
}

impl ModelReply {
    pub fn content(&self) -> &str {
        match self {
            Self::Content(text) => text,
            Self::ToolCalls { content, .. } => content,
        }
    }
}

/// Client for `{api_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ModelClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    stream: bool,
    request_timeout: Duration,
}

impl ModelClient {
    /// # Errors
    ///
    /// Returns `SeraphError::Config` if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SeraphError::Config(format!("model http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            stream: config.stream,
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    /// JSON body for a completion request.
    pub fn build_request(&self, messages: &[Message], tools: &[Value]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages_to_openai(messages),
            "stream": self.stream,
            "temperature": self.temperature,
        });
        if !tools.is_empty()
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("tools".into(), Value::Array(tools.to_vec()));
        }
        body
    }

    /// Send one completion request.
    ///
    /// Content text reaches `sink` incrementally when streaming, or once
    /// when the full body arrives.
    ///
    /// # Errors
    ///
    /// Transport errors for network failures, non-success status, and
    /// backend error frames; parse errors for an unusable non-streaming
    /// body; `Interrupted` if `cancel` fires mid-stream.
    pub async fn complete(
        &self,
        messages: &[Message],
        tools: &[Value],
        sink: &mut dyn TextSink,
        cancel: &CancellationToken,
    ) -> Result<ModelReply> {
        let body = self.build_request(messages, tools);
        let mut request = self.http.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        if !self.stream {
            request = request.timeout(self.request_timeout);
        }

        debug!(
            endpoint = %self.endpoint,
            messages = messages.len(),
            tools = tools.len(),
            stream = self.stream,
            "model request"
        );
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SeraphError::Interrupted),
            r = request.send() => r.map_err(|e| SeraphError::Transport(format!("model request failed: {e}")))?,
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SeraphError::Transport(format!(
                "model endpoint returned {status}: {}",
                truncate(&detail, 200)
            )));
        }

        if !self.stream {
            let value: Value = response
                .json()
                .await
                .map_err(|e| SeraphError::Parse(format!("completion body: {e}")))?;
            let reply = parse_completion(&value)?;
            if !reply.content().is_empty() {
                sink.push_text(reply.content());
            }
            return Ok(reply);
        }

        let mut bytes = response.bytes_stream();
        let mut parser = SseLineParser::new();
        let mut acc = StreamAccumulator::default();
        'stream: loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SeraphError::Interrupted),
                next = bytes.next() => next,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| SeraphError::Transport(format!("model stream: {e}")))?;
            for frame in parser.push(&chunk) {
                if acc.apply(&frame, sink)? {
                    break 'stream;
                }
            }
        }
        if let Some(frame) = parser.flush() {
            acc.apply(&frame, sink)?;
        }
        Ok(acc.finish())
    }
}

/// Tool call under construction from streamed fragments.
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed frames into a [`ModelReply`].
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    content: String,
    calls: Vec<PartialToolCall>,
}

impl StreamAccumulator {
    /// Apply one frame. Returns `true` on the `[DONE]` sentinel.
    pub(crate) fn apply(&mut self, frame: &SseFrame, sink: &mut dyn TextSink) -> Result<bool> {
        if frame.is_done() {
            return Ok(true);
        }
        let value: Value = match serde_json::from_str(&frame.data) {
            Ok(v) => v,
            Err(e) => {
                warn!("skipping malformed stream frame: {e}");
                return Ok(false);
            }
        };

        if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
            let message = err
                .as_str()
                .map(str::to_owned)
                .or_else(|| err.get("message").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or_else(|| err.to_string());
            return Err(SeraphError::Transport(format!("backend stream error: {message}")));
        }

        let delta = value.pointer("/choices/0/delta");
        let text = delta
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .or_else(|| value.get("text").and_then(Value::as_str));
        if let Some(text) = text
            && !text.is_empty()
        {
            self.content.push_str(text);
            sink.push_text(text);
        }

        if let Some(fragments) = delta
            .and_then(|d| d.get("tool_calls"))
            .and_then(Value::as_array)
        {
            for fragment in fragments {
                self.apply_tool_fragment(fragment);
            }
        }
        Ok(false)
    }

    fn apply_tool_fragment(&mut self, fragment: &Value) {
        let index = match fragment.get("index").and_then(Value::as_u64) {
            Some(i) => usize::try_from(i).unwrap_or(usize::MAX),
            None => self.calls.len().saturating_sub(1),
        };
        // A fragment may continue a known call or open the next one.
        if index > self.calls.len() || index >= MAX_TOOL_CALLS {
            warn!(index, known = self.calls.len(), "skipping tool call fragment with out-of-range index");
            return;
        }
        if index == self.calls.len() {
            self.calls.push(PartialToolCall::default());
        }
        let call = &mut self.calls[index];
        if let Some(id) = fragment.get("id").and_then(Value::as_str) {
            call.id = id.to_owned();
        }
        if let Some(function) = fragment.get("function") {
            if let Some(name) = function.get("name").and_then(Value::as_str) {
                call.name.push_str(name);
            }
            if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                call.arguments.push_str(args);
            }
        }
    }

    pub(crate) fn finish(self) -> ModelReply {
        let calls: Vec<ToolCall> = self
            .calls
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .enumerate()
            .map(|(i, c)| ToolCall {
                id: if c.id.is_empty() { format!("call_{i}") } else { c.id },
                name: c.name,
                arguments: c.arguments,
            })
            .collect();
        if calls.is_empty() {
            ModelReply::Content(self.content)
        } else {
            ModelReply::ToolCalls {
                content: self.content,
                calls,
            }
        }
    }
}

/// Interpret a non-streaming completion body.
///
/// # Errors
///
/// `SeraphError::Parse` when neither `choices[0].message` nor a top-level
/// `text` field is present; `SeraphError::Transport` for an `error` body.
pub fn parse_completion(value: &Value) -> Result<ModelReply> {
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        return Err(SeraphError::Transport(format!("backend error: {err}")));
    }
    let Some(message) = value.pointer("/choices/0/message") else {
        return match value.get("text").and_then(Value::as_str) {
            Some(text) => Ok(ModelReply::Content(text.to_owned())),
            None => Err(SeraphError::Parse(
                "completion body has no choices[0].message".into(),
            )),
        };
    };

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let calls: Vec<ToolCall> = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(i, call)| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_owned();
                    let arguments = match function.get("arguments") {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    };
                    let id = call
                        .get("id")
                        .and_then(Value::as_str)
                        .map_or_else(|| format!("call_{i}"), str::to_owned);
                    Some(ToolCall { id, name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();

    if calls.is_empty() {
        Ok(ModelReply::Content(content))
    } else {
        Ok(ModelReply::ToolCalls { content, calls })
    }
}

/// Convert conversation messages to the OpenAI `messages[]` shape.
pub fn messages_to_openai(messages: &[Message]) -> Value {
    Value::Array(messages.iter().map(message_to_openai).collect())
}

fn message_to_openai(msg: &Message) -> Value {
    let role = msg.role.as_str();
    match &msg.content {
        MessageContent::Text { text } => json!({ "role": role, "content": text }),
        MessageContent::Multimodal { parts } => {
            let parts: Vec<Value> = parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::Image { url } => {
                        json!({ "type": "image_url", "image_url": { "url": url } })
                    }
                })
                .collect();
            json!({ "role": role, "content": parts })
        }
        MessageContent::ToolCalls { calls } => {
            let calls: Vec<Value> = calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments },
                    })
                })
                .collect();
            json!({ "role": role, "content": Value::Null, "tool_calls": calls })
        }
        MessageContent::ToolResult { call_id, content } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
        }),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::conversation::Role;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, stream: bool) -> ModelClient {
        ModelClient::new(&LlmConfig {
            api_url: format!("{}/v1", server.uri()),
            api_key: "sk-test".into(),
            model: "test-model".into(),
            stream,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    fn sse(frames: &[&str]) -> String {
        frames.iter().map(|f| format!("data: {f}\n\n")).collect()
    }

    // ── request shape ──

    #[test]
    fn tool_messages_serialize_to_openai_shape() {
        let messages = vec![
            Message::system("sys"),
            Message::assistant_tool_calls(vec![ToolCall {
                id: "call_1".into(),
                name: "get_time".into(),
                arguments: "{}".into(),
            }]),
            Message::tool_result("call_1", "noon"),
        ];
        let json = messages_to_openai(&messages);
        assert_eq!(json[1]["content"], Value::Null);
        assert_eq!(json[1]["tool_calls"][0]["function"]["name"], "get_time");
        assert_eq!(json[2]["role"], "tool");
        assert_eq!(json[2]["tool_call_id"], "call_1");
    }

    #[test]
    fn multimodal_user_message_uses_image_url_parts() {
        let msg = Message::user_multimodal(vec![
            ContentPart::Text { text: "what is this".into() },
            ContentPart::Image { url: "data:image/png;base64,AA".into() },
        ]);
        assert_eq!(msg.role, Role::User);
        let json = messages_to_openai(&[msg]);
        assert_eq!(json[0]["content"][1]["type"], "image_url");
        assert_eq!(json[0]["content"][1]["image_url"]["url"], "data:image/png;base64,AA");
    }

    // ── streaming ──

    #[tokio::test]
    async fn streams_content_to_sink() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "test-model", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse(&[
                    r#"{"choices":[{"delta":{"content":"Hi,"}}]}"#,
                    "not json",
                    r#"{"choices":[{"delta":{"content":" there!"}}]}"#,
                    "[DONE]",
                ]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        let mut chunks: Vec<String> = Vec::new();
        let mut sink = |t: &str| chunks.push(t.to_owned());
        let reply = client
            .complete(&[Message::user("hi")], &[], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, ModelReply::Content("Hi, there!".into()));
        assert_eq!(chunks, vec!["Hi,", " there!"]);
    }

    #[tokio::test]
    async fn streamed_tool_call_fragments_are_joined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse(&[
                    r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"get_time","arguments":"{\"tz\":"}}]}}]}"#,
                    r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"UTC\"}"}}]}}]}"#,
                    "[DONE]",
                ]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        let mut sink = |_: &str| {};
        let reply = client
            .complete(&[Message::user("time?")], &[], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        let ModelReply::ToolCalls { calls, .. } = reply else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].arguments, r#"{"tz":"UTC"}"#);
    }

    #[test]
    fn out_of_range_tool_index_is_skipped() {
        let frame = |data: &str| SseFrame {
            event_type: None,
            data: data.to_owned(),
        };
        let mut acc = StreamAccumulator::default();
        let mut sink = |_: &str| {};
        for data in [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":4000000000,"function":{"name":"huge"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":3,"function":{"name":"gap"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_time","arguments":"{}"}}]}}]}"#,
        ] {
            assert!(!acc.apply(&frame(data), &mut sink).unwrap());
        }
        assert_eq!(acc.calls.len(), 1);
        let ModelReply::ToolCalls { calls, .. } = acc.finish() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_time");
    }

    #[tokio::test]
    async fn backend_error_frame_fails_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse(&[r#"{"text":"Hel"}"#, r#"{"error":"model crashed"}"#]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        let mut seen = String::new();
        let mut sink = |t: &str| seen.push_str(t);
        let err = client
            .complete(&[Message::user("hi")], &[], &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("model crashed"));
        assert_eq!(seen, "Hel");
    }

    #[tokio::test]
    async fn error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        let mut sink = |_: &str| {};
        let err = client
            .complete(&[Message::user("hi")], &[], &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SeraphError::Transport(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn cancelled_request_is_interrupted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse(&["[DONE]"]), "text/event-stream")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = |_: &str| {};
        let err = client
            .complete(&[Message::user("hi")], &[], &mut sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SeraphError::Interrupted));
    }

    // ── non-streaming ──

    #[tokio::test]
    async fn non_streaming_body_with_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": false, "tools": [{"type": "function"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "content": null,
                    "tool_calls": [{"id": "c1", "type": "function",
                        "function": {"name": "lookup", "arguments": {"q": "rust"}}}]
                }}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, false);
        let tools = vec![json!({"type": "function", "function": {"name": "lookup"}})];
        let mut sink = |_: &str| {};
        let reply = client
            .complete(&[Message::user("q")], &tools, &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            reply,
            ModelReply::ToolCalls {
                content: String::new(),
                calls: vec![ToolCall {
                    id: "c1".into(),
                    name: "lookup".into(),
                    arguments: r#"{"q":"rust"}"#.into(),
                }],
            }
        );
    }

    #[test]
    fn completion_without_message_is_parse_error() {
        let err = parse_completion(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, SeraphError::Parse(_)));
        assert_eq!(
            parse_completion(&json!({"text": "plain"})).unwrap(),
            ModelReply::Content("plain".into())
        );
    }
}
