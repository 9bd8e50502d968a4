//! Busy flags gating turn admission.
//!
//! The three flags and a turn epoch sit behind one mutex so that admission
//! (check all clear, then set one) is a single atomic step on the
//! multi-threaded runtime. Subscriber callbacks always run after the lock
//! has been released.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// One of the mutual-exclusion booleans consulted before a turn starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusyFlag {
    /// A speech, direct-text, or idle turn is generating.
    UserInput,
    /// Synthesized speech for the current turn is playing.
    SpeechPlayback,
    /// A live-chat turn is generating.
    ChatMessage,
}

impl BusyFlag {
    /// All flags, in storage order.
    pub const ALL: [BusyFlag; 3] = [
        BusyFlag::UserInput,
        BusyFlag::SpeechPlayback,
        BusyFlag::ChatMessage,
    ];

    fn index(self) -> usize {
        match self {
            Self::UserInput => 0,
            Self::SpeechPlayback => 1,
            Self::ChatMessage => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserInput => "busy_with_user_input",
            Self::SpeechPlayback => "busy_with_speech_playback",
            Self::ChatMessage => "busy_with_chat_message",
        }
    }
}

impl fmt::Display for BusyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
    flags: [bool; 3],
    epoch: u64,
    listeners: Vec<(u64, BusyFlag, Listener)>,
    next_listener_id: u64,
}

impl Inner {
    /// Apply a flag value and collect the listeners to notify if it changed.
    fn apply(&mut self, flag: BusyFlag, value: bool, out: &mut Vec<(Listener, bool)>) {
        let slot = &mut self.flags[flag.index()];
        if *slot == value {
            return;
        }
        *slot = value;
        debug!(flag = %flag, value, "busy flag changed");
        out.extend(
            self.listeners
                .iter()
                .filter(|(_, f, _)| *f == flag)
                .map(|(_, _, cb)| (Arc::clone(cb), value)),
        );
    }
}

/// Shared busy-flag state, injected into every component that needs it.
///
/// Cheap to clone; all clones observe the same flags.
#[derive(Clone)]
pub struct StateCoordinator {
    inner: Arc<Mutex<Inner>>,
}

impl Default for StateCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("StateCoordinator")
            .field("flags", &inner.flags)
            .field("epoch", &inner.epoch)
            .finish()
    }
}

impl StateCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                flags: [false; 3],
                epoch: 0,
                listeners: Vec::new(),
                next_listener_id: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(pending: Vec<(Listener, bool)>) {
        for (cb, value) in pending {
            cb(value);
        }
    }

    /// Current value of `flag`.
    pub fn get(&self, flag: BusyFlag) -> bool {
        self.lock().flags[flag.index()]
    }

    /// Set `flag`. Subscribers are notified only when the value changes.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, flag: BusyFlag, value: bool) -> bool {
        let mut pending = Vec::new();
        let changed = {
            let mut inner = self.lock();
            let before = inner.flags[flag.index()];
            inner.apply(flag, value, &mut pending);
            before != value
        };
        Self::notify(pending);
        changed
    }

    /// Register `callback` for changes of `flag`.
    ///
    /// The returned handle unsubscribes when dropped.
    pub fn subscribe<F>(&self, flag: BusyFlag, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, flag, Arc::new(callback)));
        Subscription {
            state: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Whether any flag is set.
    pub fn any_busy(&self) -> bool {
        self.lock().flags.iter().any(|f| *f)
    }

    /// Snapshot of all three flags in [`BusyFlag::ALL`] order.
    pub fn snapshot(&self) -> [bool; 3] {
        self.lock().flags
    }

    /// Current turn epoch. Bumped by every admission and every [`clear_all`](Self::clear_all).
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Admit a turn: if every flag is clear, set `flag` and return a guard
    /// that clears the turn's flags when dropped.
    pub fn try_acquire(&self, flag: BusyFlag) -> Option<TurnGuard> {
        let mut pending = Vec::new();
        let epoch = {
            let mut inner = self.lock();
            if inner.flags.iter().any(|f| *f) {
                return None;
            }
            inner.epoch += 1;
            inner.apply(flag, true, &mut pending);
            inner.epoch
        };
        Self::notify(pending);
        Some(TurnGuard {
            state: self.clone(),
            epoch,
            released: false,
        })
    }

    /// Hand the turn identified by `epoch` over to speech playback: sets
    /// `SpeechPlayback` and clears the generation flags in one step.
    ///
    /// Returns `false` (and changes nothing) when the turn is no longer current.
    pub fn begin_playback(&self, epoch: u64) -> bool {
        let mut pending = Vec::new();
        {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return false;
            }
            inner.apply(BusyFlag::UserInput, false, &mut pending);
            inner.apply(BusyFlag::ChatMessage, false, &mut pending);
            inner.apply(BusyFlag::SpeechPlayback, true, &mut pending);
        }
        Self::notify(pending);
        true
    }

    /// Clear every flag and invalidate outstanding guards.
    pub fn clear_all(&self) {
        let mut pending = Vec::new();
        {
            let mut inner = self.lock();
            inner.epoch += 1;
            for flag in BusyFlag::ALL {
                inner.apply(flag, false, &mut pending);
            }
        }
        Self::notify(pending);
    }

    /// Clear every flag if `epoch` is still current. Returns whether it was.
    fn release(&self, epoch: u64) -> bool {
        let mut pending = Vec::new();
        {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return false;
            }
            for flag in BusyFlag::ALL {
                inner.apply(flag, false, &mut pending);
            }
        }
        Self::notify(pending);
        true
    }
}

/// Unsubscribes its callback when dropped.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    state: Weak<Mutex<Inner>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.state.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.retain(|(id, _, _)| *id != self.id);
        }
    }
}

/// Ownership of the single admitted turn.
///
/// Releasing (explicitly or by drop) clears all flags, unless an interrupt
/// has already reset the state and a newer turn may own it.
#[derive(Debug)]
pub struct TurnGuard {
    state: StateCoordinator,
    epoch: u64,
    released: bool,
}

impl TurnGuard {
    /// Epoch of the turn this guard admitted.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether this turn still owns the state.
    pub fn is_current(&self) -> bool {
        self.state.epoch() == self.epoch
    }

    /// Release now. Returns whether the flags were actually cleared.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.state.release(self.epoch)
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.released {
            self.state.release(self.epoch);
        }
    }
}
