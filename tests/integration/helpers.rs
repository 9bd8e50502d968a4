//! Shared collaborators for orchestrator integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use seraph::audio::{ChannelPlaybackEngine, PlaybackCommand};
use seraph::conversation::{Message, SharedLog};
use seraph::llm::{GeneratedReply, ResponseGenerator, TextSink};
use seraph::pipeline::PlaybackSegment;
use seraph::tts::Synthesizer;
use seraph::{Result, SeraphConfig, SeraphError, TurnOrchestrator};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Returns the segment text as "audio".
pub(crate) struct EchoSynth;

#[async_trait]
impl Synthesizer for EchoSynth {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        Ok(Bytes::from(text.to_owned()))
    }
}

/// Generator that records every prompt and answers with a fixed reply
/// after an optional delay. Honours cancellation during the delay.
pub(crate) struct ScriptedGenerator {
    reply: String,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(reply: &str) -> Arc<Self> {
        Self::with_delay(reply, Duration::ZERO)
    }

    pub(crate) fn with_delay(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_owned(),
            delay,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(
        &self,
        log: &SharedLog,
        user: Message,
        sink: &mut dyn TextSink,
        cancel: &CancellationToken,
    ) -> Result<GeneratedReply> {
        self.prompts.lock().unwrap().push(user.display_text());
        log.lock().append(user);
        if !self.delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(SeraphError::Interrupted),
                () = tokio::time::sleep(self.delay) => {}
            }
        }
        sink.push_text(&self.reply);
        log.lock().append(Message::assistant(self.reply.as_str()));
        Ok(GeneratedReply {
            text: self.reply.clone(),
            phases: Vec::new(),
            tool_used: None,
        })
    }
}

/// Build an orchestrator with a scripted generator and echo synthesis.
pub(crate) async fn scripted(
    config: SeraphConfig,
    generator: Arc<ScriptedGenerator>,
) -> (TurnOrchestrator, mpsc::UnboundedReceiver<PlaybackCommand>) {
    let (engine, rx) = ChannelPlaybackEngine::new();
    let orchestrator = TurnOrchestrator::builder(config)
        .with_playback_engine(Arc::new(engine))
        .with_synthesizer(Arc::new(EchoSynth))
        .with_generator(generator)
        .build()
        .await
        .unwrap();
    (orchestrator, rx)
}

/// Acknowledge every segment immediately and return what was played.
pub(crate) fn auto_ack(
    orchestrator: &TurnOrchestrator,
    mut rx: mpsc::UnboundedReceiver<PlaybackCommand>,
) -> Arc<Mutex<Vec<PlaybackSegment>>> {
    let played = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&played);
    let o = orchestrator.clone();
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            if let PlaybackCommand::Play(segment) = cmd {
                let (generation, seq) = (segment.generation, segment.seq);
                log.lock().unwrap().push(segment);
                o.playback_finished(generation, seq);
            }
        }
    });
    played
}

/// Poll `cond` every 100 ms, giving up after a minute.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..600 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}

/// 100 ms of a 16-bit mono tone.
pub(crate) fn tiny_wav() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..800 {
            writer.write_sample(if i % 2 == 0 { 4_000i16 } else { -4_000 }).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
