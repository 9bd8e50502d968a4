//! Timer runner backed by tokio tasks and cancellation tokens.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::trace;

/// Spawns delayed and background tasks under one root cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    root: CancellationToken,
    tracker: TaskTracker,
}

/// Handle to one scheduled timer.
///
/// Cancelling only prevents the task from starting; once the delay has
/// elapsed the task runs to completion.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.root.child_token();
        let timer = token.clone();
        if self.root.is_cancelled() {
            trace!("scheduler shut down, dropping timer");
            return TimerHandle { token };
        }
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = timer.cancelled() => {}
                () = tokio::time::sleep(delay) => task.await,
            }
        });
        TimerHandle { token }
    }

    /// Spawn `task` immediately on the tracked task set.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.root.is_cancelled() {
            trace!("scheduler shut down, dropping task");
            return;
        }
        self.tracker.spawn(task);
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); long-running loops select on it.
    pub fn cancellation(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel every pending timer and refuse new ones.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.tracker.close();
    }

    /// Wait for all tracked tasks to finish. Only returns after [`shutdown`](Self::shutdown).
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}
