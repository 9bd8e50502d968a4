//! Host-side chat transport contract.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A viewer message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingChat {
    pub nickname: String,
    pub text: String,
    /// When the transport saw the message.
    pub timestamp: DateTime<Utc>,
}

impl IncomingChat {
    pub fn new(nickname: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Source of recent chat messages, polled periodically.
#[async_trait]
pub trait ChatFeed: Send + Sync {
    /// Recent messages. May repeat messages returned by earlier calls.
    async fn fetch(&self) -> Result<Vec<IncomingChat>>;
}
