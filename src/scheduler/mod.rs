//! Cancellable timers for retries and idle triggers.
//!
//! Every delayed action in the turn pipeline (idle trigger, chat re-check,
//! busy retry) goes through [`Scheduler`], so that shutdown cancels them all
//! and tests can drive them with tokio's paused clock.

pub mod runner;

pub use runner::{Scheduler, TimerHandle};
