//! Chat queueing, FIFO dispatch, and feed polling.

use crate::helpers::{ScriptedGenerator, auto_ack, scripted, wait_until};
use async_trait::async_trait;
use chrono::Utc;
use seraph::channels::{ChatFeed, IncomingChat};
use seraph::{Result, RuntimeEvent, SeraphConfig, TurnSource};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn queued_chat_is_dispatched_in_arrival_order() {
    let generator = ScriptedGenerator::with_delay("Got it.", Duration::from_secs(2));
    let (o, rx) = scripted(SeraphConfig::default(), Arc::clone(&generator)).await;
    auto_ack(&o, rx);

    let speech = {
        let o = o.clone();
        tokio::spawn(async move { o.handle_recognized_speech("hello there").await })
    };
    wait_until(|| o.state().any_busy()).await;
    for (nick, text) in [("a", "one"), ("b", "two"), ("c", "three")] {
        o.enqueue_chat(nick, text);
    }
    assert_eq!(o.chat_queue_len(), 3);

    assert!(speech.await.unwrap().is_completed());
    wait_until(|| generator.prompts().len() == 4 && !o.state().any_busy()).await;
    assert_eq!(
        generator.prompts(),
        vec![
            "hello there",
            "[chat] a: one",
            "[chat] b: two",
            "[chat] c: three"
        ]
    );
    assert_eq!(o.chat_queue_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn chat_turn_echoes_viewer_message() {
    let generator = ScriptedGenerator::new("Hi!");
    let (o, rx) = scripted(SeraphConfig::default(), generator).await;
    auto_ack(&o, rx);
    let mut events = o.subscribe_events();

    o.enqueue_chat("miso", "hello");
    wait_until(|| o.conversation().len() == 3 && !o.state().any_busy()).await;

    let mut echoed = None;
    while let Ok(event) = events.try_recv() {
        if let RuntimeEvent::UserMessage { source, text } = event {
            echoed = Some((source, text));
        }
    }
    assert_eq!(echoed, Some((TurnSource::Chat, "miso: hello".to_owned())));
}

#[tokio::test(start_paused = true)]
async fn retained_history_is_capped_but_every_entry_is_dispatched() {
    let generator = ScriptedGenerator::with_delay("Ok.", Duration::from_millis(100));
    let mut config = SeraphConfig::default();
    config.live_chat.max_messages = 2;
    let (o, rx) = scripted(config, Arc::clone(&generator)).await;
    auto_ack(&o, rx);

    for i in 0..4 {
        o.enqueue_chat(&format!("v{i}"), "hey");
    }
    let history = o.chat_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sender, "v3");

    wait_until(|| generator.prompts().len() == 4).await;
}

struct OneShotFeed {
    pending: Mutex<Option<Vec<IncomingChat>>>,
}

#[async_trait]
impl ChatFeed for OneShotFeed {
    async fn fetch(&self) -> Result<Vec<IncomingChat>> {
        Ok(self.pending.lock().unwrap().take().unwrap_or_default())
    }
}

#[tokio::test(start_paused = true)]
async fn attached_feed_is_polled_until_shutdown() {
    let generator = ScriptedGenerator::new("Welcome!");
    let mut config = SeraphConfig::default();
    config.live_chat.enabled = true;
    let (o, rx) = scripted(config, Arc::clone(&generator)).await;
    auto_ack(&o, rx);

    let later = Utc::now() + chrono::Duration::seconds(1);
    let stale = Utc::now() - chrono::Duration::seconds(60);
    let feed = Arc::new(OneShotFeed {
        pending: Mutex::new(Some(vec![
            IncomingChat {
                nickname: "old".into(),
                text: "from before startup".into(),
                timestamp: stale,
            },
            IncomingChat {
                nickname: "new".into(),
                text: "first!".into(),
                timestamp: later,
            },
        ])),
    });
    assert!(o.attach_chat_feed(feed));

    wait_until(|| !generator.prompts().is_empty() && !o.state().any_busy()).await;
    assert_eq!(generator.prompts(), vec!["[chat] new: first!"]);
    o.shutdown();
}

#[tokio::test]
async fn feed_is_not_polled_when_live_chat_disabled() {
    let (o, _rx) = scripted(SeraphConfig::default(), ScriptedGenerator::new("x")).await;
    let feed = Arc::new(OneShotFeed {
        pending: Mutex::new(None),
    });
    assert!(!o.attach_chat_feed(feed));
}
