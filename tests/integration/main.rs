//! Integration test binary. All integration tests live in one binary to
//! keep link time down.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod arbitration;
mod end_to_end;
mod idle_trigger;
mod live_chat;
