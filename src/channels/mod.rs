//! Live-chat (barrage) intake.
//!
//! The transport that fetches viewer messages stays with the host, behind
//! the [`ChatFeed`] trait. This module filters and records what the feed
//! delivers and hands new entries to the orchestrator's FIFO queue.

pub mod history;
pub mod live_chat;
pub mod traits;

pub use history::ChatHistory;
pub use live_chat::{LiveChatSource, poll_feed};
pub use traits::{ChatFeed, IncomingChat};
