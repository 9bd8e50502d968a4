//! Turn orchestrator: admits one turn at a time from every input source.
//!
//! Four sources compete for the single turn slot: recognized speech, live
//! chat, the idle trigger, and direct text. Admission goes through
//! [`StateCoordinator::try_acquire`], which sets the turn's busy flag before
//! any asynchronous work begins. Every admitted turn owns a [`TurnScope`]
//! whose drop is the one finalizer: it clears the flags, resumes speech
//! recognition, re-arms the idle timer, and schedules the chat re-check.
//!
//! Chat entries that arrive while busy wait in a FIFO queue. They are
//! re-offered on a fixed delay after each turn until the queue drains.

use crate::audio::PlaybackEngine;
use crate::channels::{ChatFeed, IncomingChat, LiveChatSource, poll_feed};
use crate::config::{ContextConfig, IdleConfig, LiveChatConfig, SeraphConfig};
use crate::conversation::{ConversationLog, Message, SharedLog};
use crate::error::{Result, SeraphError};
use crate::llm::{ModelClient, ResponseGenerator, select_generator};
use crate::memory::{DecisionGate, MemoryFile, TranscriptWriter};
use crate::pipeline::messages::{ChatQueueEntry, TurnOutcome, TurnSource};
use crate::runtime::{EventSink, RuntimeEvent};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::state::{BusyFlag, StateCoordinator, TurnGuard};
use crate::tools;
use crate::tts::{HttpSynthesizer, LlmTranslator, SpeechOutcome, SpeechPipeline, Synthesizer, Translator};
use crate::vision::{ScreenshotProvider, VisionPolicy};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long error feedback stays visible.
const ERROR_FEEDBACK_DURATION: Duration = Duration::from_secs(3);

/// Appended to the system prompt when live chat is enabled.
const CHAT_PROMPT_NOTE: &str = "Messages that start with [chat] come from live-stream viewers, \
     not from your owner. Reply to them briefly and address the viewer by name.";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What an admitted turn submits and shows.
struct TurnInput {
    /// User-role text sent to the model.
    prompt: String,
    /// Echo shown to the user, if any.
    echo: Option<String>,
    /// Whether the vision gate applies.
    vision: bool,
}

struct ActiveTurn {
    epoch: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct IdleTimer {
    started: bool,
    handle: Option<TimerHandle>,
}

struct Inner {
    state: StateCoordinator,
    log: SharedLog,
    generator: Arc<dyn ResponseGenerator>,
    speech: SpeechPipeline,
    scheduler: Scheduler,
    events: EventSink,
    chat_queue: Mutex<VecDeque<ChatQueueEntry>>,
    chat_source: Mutex<LiveChatSource>,
    chat_retry: Mutex<Option<TimerHandle>>,
    current_turn: Mutex<Option<ActiveTurn>>,
    idle: Mutex<IdleTimer>,
    context: Mutex<ContextConfig>,
    memory: Option<(MemoryFile, DecisionGate)>,
    vision: Option<VisionPolicy>,
    transcript: Option<TranscriptWriter>,
    idle_config: IdleConfig,
    live_chat: LiveChatConfig,
}

/// Top-level coordinator. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct TurnOrchestrator {
    inner: Arc<Inner>,
}

/// Assembles a [`TurnOrchestrator`] from config and host collaborators.
pub struct OrchestratorBuilder {
    config: SeraphConfig,
    engine: Option<Arc<dyn PlaybackEngine>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    translator: Option<Arc<dyn Translator>>,
    generator: Option<Arc<dyn ResponseGenerator>>,
    screenshots: Option<Arc<dyn ScreenshotProvider>>,
}

impl OrchestratorBuilder {
    pub fn new(config: SeraphConfig) -> Self {
        Self {
            config,
            engine: None,
            synthesizer: None,
            translator: None,
            generator: None,
            screenshots: None,
        }
    }

    /// The rendering side's playback engine. Required.
    pub fn with_playback_engine(mut self, engine: Arc<dyn PlaybackEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replace the HTTP synthesizer built from `tts` config.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Replace the translator built from `translator` config.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Replace the model-backed generator. Tool discovery is skipped.
    pub fn with_generator(mut self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_screenshot_provider(mut self, provider: Arc<dyn ScreenshotProvider>) -> Self {
        self.screenshots = Some(provider);
        self
    }

    /// Validate config, connect collaborators, and compose the system prompt.
    ///
    /// Tool discovery failure disables tools without failing the build.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SeraphError::Config`] for invalid config or a missing
    /// playback engine.
    pub async fn build(self) -> Result<TurnOrchestrator> {
        let config = self.config;
        config.validate()?;
        let engine = self
            .engine
            .ok_or_else(|| SeraphError::Config("a playback engine is required".into()))?;

        let memory = if config.memory.enabled {
            let file = MemoryFile::new(config.memory.resolved_path());
            let gate = DecisionGate::new(
                config.memory.check_url.clone(),
                config.memory.decision_key.clone(),
            )?;
            Some((file, gate))
        } else {
            None
        };

        let mut prompt = config.llm.system_prompt.trim().to_owned();
        if let Some((file, _)) = &memory {
            prompt.push_str("\n\n");
            prompt.push_str(&file.prompt_appendix().await);
        }
        if config.live_chat.enabled {
            prompt.push_str("\n\n");
            prompt.push_str(CHAT_PROMPT_NOTE);
        }
        let mut log = ConversationLog::new(prompt);
        log.set_limit(
            config
                .context
                .enable_limit
                .then_some(config.context.max_messages),
        );

        let generator = match self.generator {
            Some(g) => g,
            None => {
                let tools = tools::connect(&config.tools).await.map(Arc::new);
                let client = Arc::new(ModelClient::new(&config.llm)?);
                select_generator(client, tools)
            }
        };
        let synthesizer: Arc<dyn Synthesizer> = match self.synthesizer {
            Some(s) => s,
            None => Arc::new(HttpSynthesizer::new(&config.tts)?),
        };
        let translator: Option<Arc<dyn Translator>> = match self.translator {
            Some(t) => Some(t),
            None if config.translator.enabled => {
                Some(Arc::new(LlmTranslator::new(&config.translator)?))
            }
            None => None,
        };

        let vision = VisionPolicy::from_config(&config.vision, self.screenshots)?;
        let transcript = if config.transcript.enabled {
            Some(TranscriptWriter::open(config.transcript.resolved_path()).await)
        } else {
            None
        };

        let state = StateCoordinator::new();
        let events = EventSink::new();
        let speech = SpeechPipeline::new(synthesizer, translator, engine, state.clone(), events.clone());

        info!(
            generator = generator.name(),
            memory = memory.is_some(),
            vision = vision.is_some(),
            live_chat = config.live_chat.enabled,
            "turn orchestrator ready"
        );

        let orchestrator = TurnOrchestrator {
            inner: Arc::new(Inner {
                state,
                log: SharedLog::new(log),
                generator,
                speech,
                scheduler: Scheduler::new(),
                events,
                chat_queue: Mutex::new(VecDeque::new()),
                chat_source: Mutex::new(LiveChatSource::new(config.live_chat.max_messages)),
                chat_retry: Mutex::new(None),
                current_turn: Mutex::new(None),
                idle: Mutex::new(IdleTimer::default()),
                context: Mutex::new(config.context.clone()),
                memory,
                vision,
                transcript,
                idle_config: config.idle.clone(),
                live_chat: config.live_chat.clone(),
            }),
        };
        if config.idle.enabled {
            orchestrator.start_idle_trigger();
        }
        Ok(orchestrator)
    }
}

impl TurnOrchestrator {
    pub fn builder(config: SeraphConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn state(&self) -> &StateCoordinator {
        &self.inner.state
    }

    pub fn speech(&self) -> &SpeechPipeline {
        &self.inner.speech
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the conversation log.
    pub fn conversation(&self) -> Vec<Message> {
        self.inner.log.snapshot()
    }

    pub fn chat_queue_len(&self) -> usize {
        lock(&self.inner.chat_queue).len()
    }

    /// Retained chat history, newest first.
    pub fn chat_history(&self) -> Vec<ChatQueueEntry> {
        lock(&self.inner.chat_source).history().recent()
    }

    // -- Input sources --

    /// A completed utterance from speech recognition.
    ///
    /// Rejected when busy: capture should already be paused then, so this
    /// is a guard rather than a queue.
    pub async fn handle_recognized_speech(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Rejected;
        }
        let Some((guard, cancel)) = self.admit(BusyFlag::UserInput) else {
            debug!("speech arrived while busy, ignored");
            return TurnOutcome::Rejected;
        };
        if let Some((file, gate)) = &self.inner.memory {
            let (file, gate, utterance) = (file.clone(), gate.clone(), text.to_owned());
            self.inner.scheduler.spawn(async move {
                if gate.check(&utterance).await {
                    match file.append(&utterance).await {
                        Ok(()) => info!("utterance saved to memory"),
                        Err(e) => warn!("memory save failed: {e}"),
                    }
                }
            });
        }
        let input = TurnInput {
            prompt: text.to_owned(),
            echo: Some(text.to_owned()),
            vision: true,
        };
        self.run_turn(TurnSource::Speech, guard, cancel, input).await
    }

    /// Typed text from the host. Rejected when busy or empty.
    pub async fn submit_text(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Rejected;
        }
        let Some((guard, cancel)) = self.admit(BusyFlag::UserInput) else {
            debug!("direct text arrived while busy, rejected");
            return TurnOutcome::Rejected;
        };
        let input = TurnInput {
            prompt: text.to_owned(),
            echo: Some(text.to_owned()),
            vision: true,
        };
        self.run_turn(TurnSource::DirectText, guard, cancel, input).await
    }

    /// Queue a pushed chat message and dispatch it if nothing is running.
    ///
    /// New arrivals are never dropped for being busy.
    pub fn enqueue_chat(&self, sender: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let entry = lock(&self.inner.chat_source).record(sender, text);
        lock(&self.inner.chat_queue).push_back(entry);
        self.try_dispatch_chat();
    }

    /// Poll `feed` in the background until shutdown.
    ///
    /// Returns `false`, and does nothing, when live chat is disabled.
    pub fn attach_chat_feed(&self, feed: Arc<dyn ChatFeed>) -> bool {
        if !self.inner.live_chat.enabled {
            warn!("live chat disabled, chat feed not polled");
            return false;
        }
        let this = self.clone();
        let interval = Duration::from_millis(self.inner.live_chat.check_interval_ms.max(1));
        let cancel = self.inner.scheduler.cancellation();
        self.inner.scheduler.spawn(poll_feed(feed, interval, cancel, move |batch| {
            this.deliver_chat(batch);
        }));
        true
    }

    fn deliver_chat(&self, batch: Vec<IncomingChat>) {
        let entries = lock(&self.inner.chat_source).accept_batch(batch);
        if entries.is_empty() {
            return;
        }
        debug!(count = entries.len(), "chat messages queued");
        lock(&self.inner.chat_queue).extend(entries);
        self.try_dispatch_chat();
    }

    /// Dispatch the oldest queued chat entry if nothing is running.
    fn try_dispatch_chat(&self) {
        if lock(&self.inner.chat_queue).is_empty() {
            return;
        }
        let Some((guard, cancel)) = self.admit(BusyFlag::ChatMessage) else {
            self.schedule_chat_retry();
            return;
        };
        let Some(entry) = lock(&self.inner.chat_queue).pop_front() else {
            self.forget_turn(guard.epoch());
            drop(guard);
            return;
        };
        let this = self.clone();
        self.inner.scheduler.spawn(async move {
            let input = TurnInput {
                prompt: entry.prompt(),
                echo: Some(format!("{}: {}", entry.sender, entry.text)),
                vision: false,
            };
            this.run_turn(TurnSource::Chat, guard, cancel, input).await;
        });
    }

    /// Re-offer queued chat after the retry delay. At most one retry is pending.
    fn schedule_chat_retry(&self) {
        if lock(&self.inner.chat_queue).is_empty() {
            return;
        }
        let mut retry = lock(&self.inner.chat_retry);
        if retry.is_some() {
            return;
        }
        let this = self.clone();
        let delay = Duration::from_millis(self.inner.live_chat.retry_delay_ms);
        *retry = Some(self.inner.scheduler.schedule(delay, async move {
            lock(&this.inner.chat_retry).take();
            this.try_dispatch_chat();
        }));
    }

    // -- Idle trigger --

    pub fn start_idle_trigger(&self) {
        lock(&self.inner.idle).started = true;
        self.arm_idle(Duration::from_millis(self.inner.idle_config.idle_time_ms));
    }

    pub fn stop_idle_trigger(&self) {
        let mut idle = lock(&self.inner.idle);
        idle.started = false;
        if let Some(handle) = idle.handle.take() {
            handle.cancel();
        }
    }

    /// Push the idle fire back by the full idle threshold.
    pub fn update_last_interaction_time(&self) {
        self.arm_idle(Duration::from_millis(self.inner.idle_config.idle_time_ms));
    }

    fn arm_idle(&self, delay: Duration) {
        let mut idle = lock(&self.inner.idle);
        if !idle.started {
            return;
        }
        if let Some(handle) = idle.handle.take() {
            handle.cancel();
        }
        let this = self.clone();
        idle.handle = Some(
            self.inner
                .scheduler
                .schedule(delay, async move { this.fire_idle().await }),
        );
    }

    async fn fire_idle(&self) {
        let retry = Duration::from_millis(self.inner.idle_config.busy_retry_ms);
        let Some((guard, cancel)) = self.admit(BusyFlag::UserInput) else {
            debug!(retry_ms = retry.as_millis() as u64, "idle fire while busy, rescheduled");
            self.arm_idle(retry);
            return;
        };
        info!("idle trigger fired");
        let input = TurnInput {
            prompt: self.inner.idle_config.prompt.clone(),
            echo: None,
            vision: false,
        };
        self.run_turn(TurnSource::Idle, guard, cancel, input).await;
    }

    // -- Playback and control --

    /// The playback engine finished segment `seq` of `generation`.
    pub fn playback_finished(&self, generation: u64, seq: u64) {
        self.inner.speech.playback_finished(generation, seq);
    }

    /// Cancel the current turn, clear the speech queue and every flag, and
    /// resume recognition. Safe to call at any time, any number of times.
    pub fn interrupt(&self) {
        if let Some(turn) = lock(&self.inner.current_turn).take() {
            info!(epoch = turn.epoch, "turn interrupted");
            turn.cancel.cancel();
        }
        self.inner.speech.interrupt();
        self.inner.state.clear_all();
        self.inner.events.emit(RuntimeEvent::RecognitionResumed);
    }

    /// Enable or disable the context window. Enabling trims immediately.
    pub fn set_context_limit(&self, enabled: bool) {
        let max = {
            let mut context = lock(&self.inner.context);
            context.enable_limit = enabled;
            context.max_messages
        };
        let mut log = self.inner.log.lock();
        log.set_limit(enabled.then_some(max));
        log.enforce_limit();
    }

    /// Change the context window size, trimming immediately when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`SeraphError::Config`] when `max_messages` is zero.
    pub fn set_max_context_messages(&self, max_messages: usize) -> Result<()> {
        if max_messages == 0 {
            return Err(SeraphError::Config(
                "max context messages must be at least 1".into(),
            ));
        }
        let enabled = {
            let mut context = lock(&self.inner.context);
            context.max_messages = max_messages;
            context.enable_limit
        };
        if enabled {
            let mut log = self.inner.log.lock();
            log.set_limit(Some(max_messages));
            log.enforce_limit();
        }
        Ok(())
    }

    /// Cancel every timer and background task, then interrupt.
    pub fn shutdown(&self) {
        info!("turn orchestrator shutting down");
        self.inner.scheduler.shutdown();
        self.interrupt();
    }

    // -- Turn execution --

    /// Take the turn slot under `flag` and register the turn for interrupt
    /// before any task is spawned for it.
    fn admit(&self, flag: BusyFlag) -> Option<(TurnGuard, CancellationToken)> {
        let guard = self.inner.state.try_acquire(flag)?;
        let cancel = CancellationToken::new();
        {
            let mut current = lock(&self.inner.current_turn);
            // Epochs only grow; never displace a newer registration.
            if current.as_ref().is_none_or(|t| t.epoch < guard.epoch()) {
                *current = Some(ActiveTurn {
                    epoch: guard.epoch(),
                    cancel: cancel.clone(),
                });
            }
        }
        if !guard.is_current() {
            cancel.cancel();
        }
        Some((guard, cancel))
    }

    fn forget_turn(&self, epoch: u64) {
        let mut current = lock(&self.inner.current_turn);
        if current.as_ref().is_some_and(|t| t.epoch == epoch) {
            *current = None;
        }
    }

    async fn run_turn(
        &self,
        source: TurnSource,
        guard: TurnGuard,
        cancel: CancellationToken,
        input: TurnInput,
    ) -> TurnOutcome {
        let inner = &self.inner;
        let epoch = guard.epoch();
        let mut scope = TurnScope {
            orchestrator: self.clone(),
            source,
            guard: Some(guard),
            completed: false,
        };
        if cancel.is_cancelled() || !scope.is_current() {
            debug!(%source, epoch, "turn interrupted before it started");
            return TurnOutcome::Interrupted;
        }
        if source != TurnSource::Idle {
            self.update_last_interaction_time();
        }

        info!(%source, epoch, "turn started");
        inner.events.emit(RuntimeEvent::TurnStarted { source });
        inner.events.emit(RuntimeEvent::RecognitionPaused);
        if let Some(echo) = &input.echo {
            inner.events.emit(RuntimeEvent::UserMessage {
                source,
                text: echo.clone(),
            });
        }

        let prompt_check = inner.log.lock().find_system_prompt().map(|_| ());
        if let Err(e) = prompt_check {
            self.report_failure(&e);
            return TurnOutcome::Failed {
                reason: e.to_string(),
            };
        }

        let user = match (&inner.vision, input.vision) {
            (Some(vision), true) => vision.user_message(&input.prompt).await,
            _ => Message::user(input.prompt.as_str()),
        };
        if cancel.is_cancelled() || !scope.is_current() {
            return TurnOutcome::Interrupted;
        }

        let speech = inner.speech.begin_turn(epoch);
        let generation = speech.generation();
        let mut sink = inner.speech.sink(&speech);
        let outcome = match inner.generator.generate(&inner.log, user, &mut sink, &cancel).await {
            Ok(reply) => {
                if let Some(tool) = &reply.tool_used {
                    debug!(%tool, "turn used a tool");
                }
                inner.speech.finish_turn(generation);
                match speech.wait().await {
                    SpeechOutcome::Finished => {
                        if let Some(transcript) = &inner.transcript {
                            transcript.record_turn(&input.prompt, &reply.text).await;
                        }
                        TurnOutcome::Completed {
                            response: reply.text,
                        }
                    }
                    SpeechOutcome::Interrupted => TurnOutcome::Interrupted,
                }
            }
            Err(SeraphError::Interrupted) => TurnOutcome::Interrupted,
            Err(e) => {
                inner.speech.cancel_turn(generation);
                self.report_failure(&e);
                TurnOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        scope.completed = outcome.is_completed();
        outcome
    }

    fn report_failure(&self, e: &SeraphError) {
        if e.is_transport() {
            error!(code = e.code(), "turn failed: {e}");
        } else {
            warn!(code = e.code(), "turn failed: {e}");
        }
        self.inner.events.emit(RuntimeEvent::ErrorFeedback {
            message: e.to_string(),
            duration: ERROR_FEEDBACK_DURATION,
        });
    }
}

/// Finalizer for one admitted turn. Runs exactly once, on drop.
struct TurnScope {
    orchestrator: TurnOrchestrator,
    source: TurnSource,
    guard: Option<TurnGuard>,
    completed: bool,
}

impl TurnScope {
    /// Whether no interrupt or newer admission has superseded this turn.
    fn is_current(&self) -> bool {
        self.guard.as_ref().is_some_and(TurnGuard::is_current)
    }
}

impl Drop for TurnScope {
    fn drop(&mut self) {
        let inner = &self.orchestrator.inner;
        let epoch = self.guard.as_ref().map(TurnGuard::epoch);
        if let Some(guard) = self.guard.take()
            && guard.release()
        {
            inner.events.emit(RuntimeEvent::RecognitionResumed);
        }
        if let Some(epoch) = epoch {
            self.orchestrator.forget_turn(epoch);
        }
        info!(source = %self.source, completed = self.completed, "turn finished");
        inner.events.emit(RuntimeEvent::TurnFinished {
            source: self.source,
            completed: self.completed,
        });
        self.orchestrator.schedule_chat_retry();
        self.orchestrator.update_last_interaction_time();
    }
}
