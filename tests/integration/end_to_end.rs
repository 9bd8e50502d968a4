//! Full turns against mocked model, synthesis, and tool endpoints.

use crate::helpers::{auto_ack, tiny_wav};
use seraph::audio::ChannelPlaybackEngine;
use seraph::conversation::{MessageContent, Role};
use seraph::{RuntimeEvent, SeraphConfig, TurnOrchestrator, TurnOutcome};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(frames: &[&str]) -> String {
    frames.iter().map(|f| format!("data: {f}\n\n")).collect()
}

fn config_for(server: &MockServer) -> SeraphConfig {
    let mut config = SeraphConfig::default();
    config.llm.api_url = format!("{}/v1", server.uri());
    config.llm.system_prompt = "You are X.".into();
    config.tts.url = format!("{}/tts", server.uri());
    config
}

async fn mount_tts(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tiny_wav()))
        .mount(server)
        .await;
}

async fn build(config: SeraphConfig) -> (TurnOrchestrator, Arc<std::sync::Mutex<Vec<seraph::pipeline::PlaybackSegment>>>) {
    let (engine, rx) = ChannelPlaybackEngine::new();
    let orchestrator = TurnOrchestrator::builder(config)
        .with_playback_engine(Arc::new(engine))
        .build()
        .await
        .unwrap();
    let played = auto_ack(&orchestrator, rx);
    (orchestrator, played)
}

#[tokio::test]
async fn streamed_reply_is_spoken_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse(&[
                r#"{"choices":[{"delta":{"content":"Hi,"}}]}"#,
                r#"{"choices":[{"delta":{"content":" there!"}}]}"#,
                "[DONE]",
            ]),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;
    mount_tts(&server).await;

    let (o, played) = build(config_for(&server)).await;
    let mut events = o.subscribe_events();

    let outcome = o.handle_recognized_speech("hi").await;
    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            response: "Hi, there!".into()
        }
    );

    let segments: Vec<String> = played
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.source_text.clone())
        .collect();
    assert_eq!(segments, vec!["Hi,", " there!"]);

    let log = o.conversation();
    assert_eq!(
        log.iter().map(|m| m.role).collect::<Vec<_>>(),
        vec![Role::System, Role::User, Role::Assistant]
    );
    assert_eq!(log[0].as_text(), Some("You are X."));
    assert_eq!(log[1].as_text(), Some("hi"));
    assert_eq!(log[2].as_text(), Some("Hi, there!"));
    assert_eq!(o.state().snapshot(), [false, false, false]);

    let mut subtitles = Vec::new();
    let mut ended = false;
    while let Ok(event) = events.try_recv() {
        match event {
            RuntimeEvent::SubtitleShow { text, duration } => {
                assert!(duration.is_some(), "wav duration is known");
                subtitles.push(text);
            }
            RuntimeEvent::DialogueEnded => ended = true,
            _ => {}
        }
    }
    assert_eq!(subtitles, vec!["Hi,", "there!"]);
    assert!(ended);
}

#[tokio::test]
async fn tool_call_round_trip_commits_full_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/v1/discover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "functions": [{"name": "weather", "description": "Current weather"}],
            "server": {"name": "local"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp/v1/invoke"))
        .and(body_partial_json(json!({"name": "weather", "parameters": {"city": "Oslo"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"content": "sunny"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"tools": [{"type": "function"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "call_1", "type": "function",
                 "function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}}
            ]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "It is sunny in Oslo."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_tts(&server).await;

    let mut config = config_for(&server);
    config.llm.stream = false;
    config.tools.enabled = true;
    config.tools.server_url = format!("{}/mcp/v1", server.uri());
    let (o, played) = build(config).await;

    let outcome = o.submit_text("weather in Oslo?").await;
    assert_eq!(outcome.response(), Some("It is sunny in Oslo."));

    let log = o.conversation();
    assert_eq!(
        log.iter().map(|m| m.role).collect::<Vec<_>>(),
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert!(matches!(&log[2].content, MessageContent::ToolCalls { calls } if calls.len() == 1));
    assert!(matches!(
        &log[3].content,
        MessageContent::ToolResult { call_id, content } if call_id == "call_1" && content == "sunny"
    ));
    assert_eq!(played.lock().unwrap().len(), 1);
    assert!(!o.state().any_busy());
}

#[tokio::test]
async fn transport_failure_commits_nothing_and_clears_flags() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_tts(&server).await;

    let (o, played) = build(config_for(&server)).await;
    let mut events = o.subscribe_events();

    let outcome = o.submit_text("hello?").await;
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    assert_eq!(o.conversation().len(), 2);
    assert!(played.lock().unwrap().is_empty());
    assert!(!o.state().any_busy());

    let mut feedback = None;
    while let Ok(event) = events.try_recv() {
        if let RuntimeEvent::ErrorFeedback { message, .. } = event {
            feedback = Some(message);
        }
    }
    assert!(feedback.unwrap().contains("503"));
}

#[tokio::test]
async fn unreachable_tool_server_disables_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "No tools today."}}]
        })))
        .mount(&server)
        .await;
    mount_tts(&server).await;

    let mut config = config_for(&server);
    config.llm.stream = false;
    config.tools.enabled = true;
    config.tools.server_url = "http://127.0.0.1:9/mcp/v1".into();
    let (o, _played) = build(config).await;

    let outcome = o.submit_text("hi").await;
    assert_eq!(outcome.response(), Some("No tools today."));
}
