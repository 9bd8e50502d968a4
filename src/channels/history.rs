//! Retained chat history with a fixed capacity.

use crate::pipeline::messages::ChatQueueEntry;
use std::collections::VecDeque;

/// Recent chat entries, oldest first. Pushing beyond capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    entries: VecDeque<ChatQueueEntry>,
    max_messages: usize,
}

impl ChatHistory {
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        let max_messages = max_messages.max(1);
        Self {
            entries: VecDeque::with_capacity(max_messages),
            max_messages,
        }
    }

    pub fn push(&mut self, entry: ChatQueueEntry) {
        while self.entries.len() >= self.max_messages {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries in reverse chronological order.
    #[must_use]
    pub fn recent(&self) -> Vec<ChatQueueEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatQueueEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_messages
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(50)
    }
}
