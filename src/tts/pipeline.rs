//! Segmented, ordered speech synthesis for streamed responses.
//!
//! Text chunks are cut into segments as soon as a boundary appears. Each
//! segment gets a slot in the playback queue and a synthesis task is spawned
//! for it immediately, so segments synthesize concurrently while the queue
//! still plays strictly in generation order. One segment is handed to the
//! [`PlaybackEngine`] at a time; the next goes out only after
//! [`SpeechPipeline::playback_finished`] names the segment now playing.
//!
//! Interrupt and turn changes bump a generation counter. Synthesis results
//! that arrive for an older generation are discarded.

use super::client::Synthesizer;
use super::segmenter::{SentenceSegmenter, clean_segment, is_speakable};
use super::translate::{Translator, translate_or_original};
use crate::audio::{PlaybackEngine, mouth_envelope};
use crate::llm::TextSink;
use crate::pipeline::messages::PlaybackSegment;
use crate::runtime::{EventSink, RuntimeEvent};
use crate::state::StateCoordinator;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Frames per second of the mouth envelope sent to the renderer.
const MOUTH_FPS: u32 = 60;
/// Never used by a real turn: `reset` bumps the generation before use.
const DEAD_GENERATION: u64 = 0;
/// Subtitle stays up this long after its segment finishes.
const SUBTITLE_HIDE_DELAY: Duration = Duration::from_secs(1);

/// How the speech for one turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Every segment was played (possibly none).
    Finished,
    /// Interrupted or superseded before finishing.
    Interrupted,
}

/// Handle for the speech of one turn.
#[derive(Debug)]
pub struct SpeechTurn {
    generation: u64,
    done: oneshot::Receiver<SpeechOutcome>,
}

impl SpeechTurn {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait until every segment of this turn has played, or it was interrupted.
    pub async fn wait(self) -> SpeechOutcome {
        self.done.await.unwrap_or(SpeechOutcome::Interrupted)
    }
}

#[derive(Debug)]
enum SlotState {
    Synthesizing,
    Ready(PlaybackSegment),
    Failed,
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    state: SlotState,
}

struct Queue {
    generation: u64,
    /// State epoch of the turn that owns this speech, for the playback handoff.
    owner_epoch: Option<u64>,
    /// Highest owner epoch ever admitted. Epochs only grow.
    latest_owner: u64,
    segmenter: SentenceSegmenter,
    next_seq: u64,
    slots: VecDeque<Slot>,
    playing: Option<u64>,
    started: bool,
    stream_ended: bool,
    completion: Option<oneshot::Sender<SpeechOutcome>>,
}

impl Queue {
    fn idle() -> Self {
        Self {
            generation: 0,
            owner_epoch: None,
            latest_owner: 0,
            segmenter: SentenceSegmenter::new(),
            next_seq: 0,
            slots: VecDeque::new(),
            playing: None,
            started: false,
            stream_ended: true,
            completion: None,
        }
    }

    /// Reset for a new generation. The previous turn, if unfinished, is
    /// resolved as interrupted.
    fn reset(&mut self) -> bool {
        if let Some(done) = self.completion.take() {
            let _ = done.send(SpeechOutcome::Interrupted);
        }
        let was_active = self.playing.is_some() || !self.slots.is_empty() || self.started;
        self.generation += 1;
        self.owner_epoch = None;
        self.segmenter.clear();
        self.next_seq = 0;
        self.slots.clear();
        self.playing = None;
        self.started = false;
        self.stream_ended = true;
        was_active
    }
}

/// Work decided under the lock and carried out after releasing it.
enum Action {
    Play {
        segment: PlaybackSegment,
        first: bool,
        owner_epoch: Option<u64>,
    },
    Ended,
}

struct Shared {
    queue: Mutex<Queue>,
    synthesizer: Arc<dyn Synthesizer>,
    translator: Option<Arc<dyn Translator>>,
    engine: Arc<dyn PlaybackEngine>,
    state: StateCoordinator,
    events: EventSink,
}

/// Speech synthesis pipeline. Cheap to clone.
#[derive(Clone)]
pub struct SpeechPipeline {
    shared: Arc<Shared>,
}

impl SpeechPipeline {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        translator: Option<Arc<dyn Translator>>,
        engine: Arc<dyn PlaybackEngine>,
        state: StateCoordinator,
        events: EventSink,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::idle()),
                synthesizer,
                translator,
                engine,
                state,
                events,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the speech of a new turn.
    ///
    /// `owner_epoch` is the turn's state epoch; playback start hands the
    /// turn's busy flag over to speech playback for that epoch only.
    /// A turn older than one already begun gets a handle that never plays
    /// and resolves as interrupted.
    pub fn begin_turn(&self, owner_epoch: u64) -> SpeechTurn {
        let (tx, rx) = oneshot::channel();
        let (generation, stop) = {
            let mut q = self.lock();
            if owner_epoch < q.latest_owner {
                debug!(owner_epoch, latest = q.latest_owner, "stale speech turn refused");
                let _ = tx.send(SpeechOutcome::Interrupted);
                return SpeechTurn {
                    generation: DEAD_GENERATION,
                    done: rx,
                };
            }
            q.latest_owner = owner_epoch;
            let stop = q.reset();
            q.owner_epoch = Some(owner_epoch);
            q.stream_ended = false;
            q.completion = Some(tx);
            (q.generation, stop)
        };
        if stop {
            self.shared.engine.stop();
        }
        debug!(generation, "speech turn started");
        SpeechTurn {
            generation,
            done: rx,
        }
    }

    /// Text sink feeding `turn`. Chunks for a superseded turn are ignored.
    pub fn sink(&self, turn: &SpeechTurn) -> SpeechSink {
        SpeechSink {
            pipeline: self.clone(),
            generation: turn.generation,
        }
    }

    /// Feed a chunk of response text.
    pub fn push_text(&self, generation: u64, chunk: &str) {
        let mut q = self.lock();
        if q.generation != generation || q.stream_ended {
            return;
        }
        for raw in q.segmenter.push(chunk) {
            self.enqueue_locked(&mut q, &raw);
        }
    }

    /// Mark the response stream complete and flush the residual buffer.
    pub fn finish_turn(&self, generation: u64) {
        let actions = {
            let mut q = self.lock();
            if q.generation != generation || q.stream_ended {
                return;
            }
            if let Some(rest) = q.segmenter.finish() {
                self.enqueue_locked(&mut q, &rest);
            }
            q.stream_ended = true;
            Self::advance_locked(&mut q)
        };
        self.run(actions);
    }

    /// Abandon the speech of `generation` after a failed turn.
    pub fn cancel_turn(&self, generation: u64) {
        let stop = {
            let mut q = self.lock();
            if q.generation != generation {
                return;
            }
            q.reset()
        };
        if stop {
            self.shared.engine.stop();
            self.close_mouth();
        }
    }

    /// Clear the queue and buffer and stop current playback. Idempotent.
    pub fn interrupt(&self) {
        let was_active = self.lock().reset();
        self.shared.engine.stop();
        if was_active {
            debug!("speech interrupted");
            self.shared.events.emit(RuntimeEvent::Speaking { active: false });
        }
        self.close_mouth();
        self.shared
            .events
            .emit(RuntimeEvent::SubtitleHide { delay: Duration::ZERO });
    }

    /// Acknowledge that segment `seq` of `generation` has finished.
    ///
    /// Acknowledgements for anything but the segment currently playing,
    /// such as one stopped by an interrupt, are ignored.
    pub fn playback_finished(&self, generation: u64, seq: u64) {
        let actions = {
            let mut q = self.lock();
            if q.generation != generation || q.playing != Some(seq) {
                trace!(generation, seq, playing = ?q.playing, "ignoring stale playback acknowledgement");
                return;
            }
            q.playing = None;
            trace!(seq, "segment finished");
            Self::advance_locked(&mut q)
        };
        self.close_mouth();
        self.shared.events.emit(RuntimeEvent::SubtitleHide {
            delay: SUBTITLE_HIDE_DELAY,
        });
        self.run(actions);
    }

    /// Segments queued or synthesizing, excluding the one playing.
    pub fn queued_len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing.is_some()
    }

    /// Whether nothing is queued, synthesizing, or playing.
    pub fn is_idle(&self) -> bool {
        let q = self.lock();
        q.playing.is_none() && q.slots.is_empty()
    }

    fn close_mouth(&self) {
        self.shared
            .events
            .emit(RuntimeEvent::MouthOpenness { level: 0.0 });
    }

    /// Allocate a slot for `raw` and start synthesizing it.
    fn enqueue_locked(&self, q: &mut Queue, raw: &str) {
        let cleaned = clean_segment(raw);
        if !is_speakable(&cleaned) {
            trace!(segment = raw, "skipping empty segment");
            return;
        }
        let seq = q.next_seq;
        q.next_seq += 1;
        q.slots.push_back(Slot {
            seq,
            state: SlotState::Synthesizing,
        });
        debug!(seq, segment = %cleaned, "segment queued");

        let pipeline = self.clone();
        let generation = q.generation;
        let source_text = raw.to_owned();
        tokio::spawn(async move {
            let result = pipeline.render(generation, seq, source_text, cleaned).await;
            pipeline.complete_slot(generation, seq, result);
        });
    }

    async fn render(
        &self,
        generation: u64,
        seq: u64,
        source_text: String,
        cleaned: String,
    ) -> Option<PlaybackSegment> {
        let (rendered_text, was_translated) = match &self.shared.translator {
            Some(t) => translate_or_original(t.as_ref(), &cleaned).await,
            None => (cleaned, false),
        };
        match self.shared.synthesizer.synthesize(&rendered_text).await {
            Ok(audio) => Some(PlaybackSegment {
                generation,
                seq,
                source_text,
                rendered_text,
                was_translated,
                audio,
            }),
            Err(e) => {
                warn!(seq, "synthesis failed, segment skipped: {e}");
                None
            }
        }
    }

    fn complete_slot(&self, generation: u64, seq: u64, result: Option<PlaybackSegment>) {
        let actions = {
            let mut q = self.lock();
            if q.generation != generation {
                trace!(seq, "discarding synthesis for superseded turn");
                return;
            }
            let Some(slot) = q.slots.iter_mut().find(|s| s.seq == seq) else {
                return;
            };
            slot.state = match result {
                Some(segment) => SlotState::Ready(segment),
                None => SlotState::Failed,
            };
            Self::advance_locked(&mut q)
        };
        self.run(actions);
    }

    /// Decide what to do next: play the head segment if it is ready and
    /// nothing is playing, or report the end of the dialogue.
    fn advance_locked(q: &mut Queue) -> Vec<Action> {
        let mut actions = Vec::new();
        while q.playing.is_none() {
            match q.slots.front().map(|s| &s.state) {
                None => {
                    if q.stream_ended
                        && let Some(done) = q.completion.take()
                    {
                        let _ = done.send(SpeechOutcome::Finished);
                        actions.push(Action::Ended);
                    }
                    break;
                }
                Some(SlotState::Synthesizing) => break,
                Some(SlotState::Failed) => {
                    q.slots.pop_front();
                }
                Some(SlotState::Ready(_)) => {
                    let Some(Slot {
                        state: SlotState::Ready(segment),
                        ..
                    }) = q.slots.pop_front()
                    else {
                        break;
                    };
                    q.playing = Some(segment.seq);
                    let first = !q.started;
                    q.started = true;
                    actions.push(Action::Play {
                        segment,
                        first,
                        owner_epoch: q.owner_epoch,
                    });
                }
            }
        }
        actions
    }

    fn run(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Play {
                    segment,
                    first,
                    owner_epoch,
                } => {
                    if first {
                        if let Some(epoch) = owner_epoch {
                            self.shared.state.begin_playback(epoch);
                        }
                        self.shared.events.emit(RuntimeEvent::Speaking { active: true });
                    }
                    let envelope = mouth_envelope(&segment.audio, MOUTH_FPS);
                    self.shared.events.emit(RuntimeEvent::SubtitleShow {
                        text: segment.rendered_text.clone(),
                        duration: envelope.duration,
                    });
                    if !envelope.is_empty() {
                        self.shared.events.emit(RuntimeEvent::MouthEnvelope {
                            fps: envelope.fps,
                            levels: envelope.levels,
                        });
                    }
                    debug!(seq = segment.seq, text = %segment.rendered_text, "playing segment");
                    self.shared.engine.play(segment);
                }
                Action::Ended => {
                    debug!("dialogue ended");
                    self.shared.events.emit(RuntimeEvent::Speaking { active: false });
                    self.shared.events.emit(RuntimeEvent::DialogueEnded);
                }
            }
        }
    }
}

/// [`TextSink`] that feeds one speech turn.
pub struct SpeechSink {
    pipeline: SpeechPipeline,
    generation: u64,
}

impl TextSink for SpeechSink {
    fn push_text(&mut self, text: &str) {
        self.pipeline.push_text(self.generation, text);
    }
}
