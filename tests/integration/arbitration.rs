//! Admission control, mutual exclusion, and interrupts.

use crate::helpers::{ScriptedGenerator, auto_ack, scripted, wait_until};
use seraph::{BusyFlag, SeraphConfig, TurnOutcome};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn at_most_one_flag_is_ever_set() {
    let generator = ScriptedGenerator::with_delay("Okay, sure.", Duration::from_millis(300));
    let mut config = SeraphConfig::default();
    config.idle.enabled = true;
    config.idle.idle_time_ms = 1_000;
    let (o, rx) = scripted(config, Arc::clone(&generator)).await;
    auto_ack(&o, rx);

    let violated = Arc::new(AtomicBool::new(false));
    let _subs: Vec<_> = BusyFlag::ALL
        .into_iter()
        .map(|flag| {
            let state = o.state().clone();
            let violated = Arc::clone(&violated);
            o.state().subscribe(flag, move |_| {
                if state.snapshot().iter().filter(|f| **f).count() > 1 {
                    violated.store(true, Ordering::SeqCst);
                }
            })
        })
        .collect();

    let mut tasks = Vec::new();
    for i in 0..5 {
        let speech = o.clone();
        tasks.push(tokio::spawn(async move {
            speech.handle_recognized_speech(&format!("speech {i}")).await
        }));
        let text = o.clone();
        tasks.push(tokio::spawn(async move { text.submit_text(&format!("text {i}")).await }));
        o.enqueue_chat(&format!("viewer{i}"), "hello");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() != TurnOutcome::Rejected {
            admitted += 1;
        }
    }
    assert!(admitted >= 1);

    wait_until(|| o.chat_queue_len() == 0 && !o.state().any_busy()).await;
    o.shutdown();
    assert!(!violated.load(Ordering::SeqCst), "two busy flags were set at once");
}

#[tokio::test(start_paused = true)]
async fn interrupt_twice_leaves_everything_clear() {
    let generator = ScriptedGenerator::with_delay("Never spoken.", Duration::from_secs(30));
    let (o, rx) = scripted(SeraphConfig::default(), generator).await;
    auto_ack(&o, rx);

    let turn = {
        let o = o.clone();
        tokio::spawn(async move { o.submit_text("tell me a story").await })
    };
    wait_until(|| o.state().get(BusyFlag::UserInput)).await;

    o.interrupt();
    assert!(!o.state().any_busy());
    assert_eq!(o.speech().queued_len(), 0);
    o.interrupt();
    assert!(!o.state().any_busy());
    assert_eq!(o.speech().queued_len(), 0);

    assert_eq!(turn.await.unwrap(), TurnOutcome::Interrupted);
    assert!(!o.state().any_busy());
    // The interrupted turn committed no assistant message.
    assert_eq!(o.conversation().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn new_turn_after_interrupt_is_not_disturbed_by_the_old_one() {
    let generator = ScriptedGenerator::with_delay("Fine.", Duration::from_secs(2));
    let (o, rx) = scripted(SeraphConfig::default(), Arc::clone(&generator)).await;
    let played = auto_ack(&o, rx);

    let first = {
        let o = o.clone();
        tokio::spawn(async move { o.submit_text("first").await })
    };
    wait_until(|| o.state().any_busy()).await;
    o.interrupt();

    let second = o.submit_text("second").await;
    assert!(second.is_completed());
    assert_eq!(first.await.unwrap(), TurnOutcome::Interrupted);
    assert_eq!(played.lock().unwrap().len(), 1);
    assert!(!o.state().any_busy());
}

#[tokio::test(start_paused = true)]
async fn speech_is_ignored_while_a_chat_turn_runs() {
    let generator = ScriptedGenerator::with_delay("Thanks!", Duration::from_secs(1));
    let (o, rx) = scripted(SeraphConfig::default(), Arc::clone(&generator)).await;
    auto_ack(&o, rx);

    o.enqueue_chat("viewer", "hi streamer");
    wait_until(|| o.state().get(BusyFlag::ChatMessage)).await;
    assert_eq!(o.handle_recognized_speech("are you there?").await, TurnOutcome::Rejected);
    assert_eq!(o.submit_text("typed").await, TurnOutcome::Rejected);

    wait_until(|| !o.state().any_busy()).await;
    assert_eq!(generator.prompts(), vec!["[chat] viewer: hi streamer"]);
}

#[tokio::test(start_paused = true)]
async fn chat_turn_interrupted_before_it_runs_never_generates() {
    let generator = ScriptedGenerator::with_delay("Chat reply.", Duration::from_secs(1));
    let (o, rx) = scripted(SeraphConfig::default(), Arc::clone(&generator)).await;
    auto_ack(&o, rx);

    // Admitted and spawned, but not yet polled.
    o.enqueue_chat("viewer", "hi");
    assert!(o.state().get(BusyFlag::ChatMessage));
    o.interrupt();
    assert!(!o.state().any_busy());

    let typed = o.submit_text("typed").await;
    assert!(typed.is_completed());
    wait_until(|| !o.state().any_busy()).await;

    assert_eq!(generator.prompts(), vec!["typed"]);
    let texts: Vec<String> = o.conversation().iter().map(|m| m.display_text()).collect();
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[1..], ["typed", "Chat reply."]);
}
