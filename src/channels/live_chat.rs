//! Live-chat source: timestamp filtering, retained history, and feed polling.

use super::history::ChatHistory;
use super::traits::{ChatFeed, IncomingChat};
use crate::pipeline::messages::ChatQueueEntry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Records delivered chat messages and turns them into queue entries.
///
/// Every delivered message becomes an entry regardless of busy state; only
/// the retained history is capped.
#[derive(Debug)]
pub struct LiveChatSource {
    history: ChatHistory,
    last_seen: DateTime<Utc>,
}

impl LiveChatSource {
    /// Messages timestamped before construction are treated as already seen.
    pub fn new(max_messages: usize) -> Self {
        Self {
            history: ChatHistory::new(max_messages),
            last_seen: Utc::now(),
        }
    }

    /// Record a pushed message and return its queue entry.
    pub fn record(&mut self, sender: &str, text: &str) -> ChatQueueEntry {
        let entry = ChatQueueEntry::new(sender, text);
        self.history.push(entry.clone());
        entry
    }

    /// Keep messages newer than anything seen before, record them, and
    /// return their entries in delivery order.
    pub fn accept_batch(&mut self, batch: Vec<IncomingChat>) -> Vec<ChatQueueEntry> {
        let mut newest = self.last_seen;
        let mut entries = Vec::new();
        for msg in batch {
            if msg.timestamp <= self.last_seen || msg.text.trim().is_empty() {
                continue;
            }
            newest = newest.max(msg.timestamp);
            let entry = ChatQueueEntry {
                sender: msg.nickname,
                text: msg.text,
                enqueued_at: Utc::now(),
            };
            self.history.push(entry.clone());
            entries.push(entry);
        }
        self.last_seen = newest;
        entries
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }
}

/// Poll `feed` every `interval` until `cancel` fires, passing each
/// non-empty batch to `on_batch`.
pub async fn poll_feed<F>(
    feed: Arc<dyn ChatFeed>,
    interval: Duration,
    cancel: CancellationToken,
    mut on_batch: F,
) where
    F: FnMut(Vec<IncomingChat>) + Send,
{
    info!(interval_ms = interval.as_millis() as u64, "live chat polling started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match feed.fetch().await {
            Ok(batch) if batch.is_empty() => {}
            Ok(batch) => {
                debug!(count = batch.len(), "chat batch fetched");
                on_batch(batch);
            }
            Err(e) => warn!("chat feed fetch failed: {e}"),
        }
    }
    info!("live chat polling stopped");
}
