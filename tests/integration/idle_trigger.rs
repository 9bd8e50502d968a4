//! Idle-triggered turns on a virtual clock.

use crate::helpers::{ScriptedGenerator, auto_ack, scripted};
use seraph::{BusyFlag, SeraphConfig, TurnOrchestrator};
use std::sync::Arc;
use std::time::Duration;

const IDLE_PROMPT: &str = "(nobody has said anything for a while)";

async fn idle_orchestrator(generator: Arc<ScriptedGenerator>) -> TurnOrchestrator {
    let mut config = SeraphConfig::default();
    config.idle.enabled = true;
    config.idle.idle_time_ms = 6_000;
    config.idle.busy_retry_ms = 5_000;
    config.idle.prompt = IDLE_PROMPT.into();
    let (o, rx) = scripted(config, generator).await;
    auto_ack(&o, rx);
    o
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn fires_after_threshold_and_rearms() {
    let generator = ScriptedGenerator::new("Hmm, so quiet.");
    let o = idle_orchestrator(Arc::clone(&generator)).await;

    advance(5_900).await;
    assert!(generator.prompts().is_empty());
    advance(200).await;
    assert_eq!(generator.prompts(), vec![IDLE_PROMPT]);
    assert!(!o.state().any_busy());

    advance(6_100).await;
    assert_eq!(generator.prompts().len(), 2, "re-armed after the idle turn");
    o.shutdown();
}

#[tokio::test(start_paused = true)]
async fn busy_fire_is_rescheduled_not_dropped() {
    let generator = ScriptedGenerator::new("Still here.");
    let o = idle_orchestrator(Arc::clone(&generator)).await;
    let held = o.state().try_acquire(BusyFlag::ChatMessage).unwrap();

    advance(8_000).await;
    assert!(generator.prompts().is_empty(), "fire at 6s landed while busy");
    drop(held);

    advance(2_900).await;
    assert!(generator.prompts().is_empty(), "retry is due at 11s");
    advance(200).await;
    assert_eq!(generator.prompts(), vec![IDLE_PROMPT]);
    o.shutdown();
}

#[tokio::test(start_paused = true)]
async fn interaction_pushes_the_fire_back() {
    let generator = ScriptedGenerator::new("Hello?");
    let o = idle_orchestrator(Arc::clone(&generator)).await;

    advance(4_000).await;
    o.update_last_interaction_time();
    advance(5_900).await;
    assert!(generator.prompts().is_empty());
    advance(200).await;
    assert_eq!(generator.prompts().len(), 1);
    o.shutdown();
}

#[tokio::test(start_paused = true)]
async fn stop_and_shutdown_cancel_the_timer() {
    let generator = ScriptedGenerator::new("...");
    let o = idle_orchestrator(Arc::clone(&generator)).await;
    o.stop_idle_trigger();
    advance(20_000).await;
    assert!(generator.prompts().is_empty());

    o.start_idle_trigger();
    o.shutdown();
    advance(20_000).await;
    assert!(generator.prompts().is_empty());
}
