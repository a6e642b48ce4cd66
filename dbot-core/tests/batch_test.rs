//! Integration tests for [`dbot_core::Batcher`].
//!
//! Covers: coalescing several starts into one save+send, immediate flush, a start that lands while a
//! flush is in flight, a failed save with a start pending, and the conversation reset after
//! storage rejects the state as too large.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dbot_core::{BatchSink, Batcher, BotError, BotEvent, EventBus, PersistedSession, Result};
use serde_json::json;

#[derive(Default)]
struct RecordingSink {
    saves: Mutex<Vec<PersistedSession>>,
    sends: Mutex<Vec<Vec<String>>>,
    send_delay: Option<Duration>,
    save_delay: Option<Duration>,
    fail_next_save: Mutex<bool>,
    reject_user_data: bool,
}

#[async_trait]
impl BatchSink<String> for RecordingSink {
    async fn save(&self, snapshot: &PersistedSession) -> Result<()> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        if std::mem::take(&mut *self.fail_next_save.lock().unwrap()) {
            return Err(BotError::Persistence("database is locked".into()));
        }
        if self.reject_user_data && !snapshot.user_data.is_empty() {
            return Err(BotError::MessageTooLarge("user data".into()));
        }
        self.saves.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn send(&self, batch: Vec<String>) -> Result<()> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        self.sends.lock().unwrap().push(batch);
        Ok(())
    }
}

fn batcher(sink: Arc<RecordingSink>) -> Batcher<String> {
    Batcher::new(sink, Duration::from_millis(250), EventBus::default())
}

/// **Test: Several starts within the delay produce one save and one send.**
///
/// **Setup:** Batcher with a 250ms delay.
/// **Action:** push "a", start; push "b", start; wait for idle.
/// **Expected:** one save; one send carrying ["a", "b"].
#[tokio::test(start_paused = true)]
async fn test_starts_are_coalesced() {
    let sink = Arc::new(RecordingSink::default());
    let b = batcher(sink.clone());

    b.push("a".to_string());
    b.start(PersistedSession::default());
    tokio::time::sleep(Duration::from_millis(100)).await;
    b.push("b".to_string());
    b.start(PersistedSession::default());
    b.idle().await;

    assert_eq!(sink.saves.lock().unwrap().len(), 1);
    assert_eq!(
        *sink.sends.lock().unwrap(),
        vec![vec!["a".to_string(), "b".to_string()]]
    );
}

/// **Test: flush delivers immediately and cancels the pending timer.**
///
/// **Setup:** push "now", start.
/// **Action:** flush; then let virtual time run past the delay.
/// **Expected:** exactly one send; nothing pending.
#[tokio::test(start_paused = true)]
async fn test_flush_is_immediate() {
    let sink = Arc::new(RecordingSink::default());
    let b = batcher(sink.clone());

    b.push("now".to_string());
    b.start(PersistedSession::default());
    b.flush().await.unwrap();
    assert_eq!(sink.sends.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    b.idle().await;
    assert_eq!(sink.sends.lock().unwrap().len(), 1);
    assert_eq!(b.pending(), 0);
}

/// **Test: A start during an in-flight flush waits for it, then triggers one more pass.**
///
/// **Setup:** Sink whose send takes 500ms.
/// **Action:** flush "first" in a task; while it is sending, push "second" and start.
/// **Expected:** sends are ["first"] then ["second"], never concurrently.
#[tokio::test(start_paused = true)]
async fn test_start_while_sending_flushes_again() {
    let sink = Arc::new(RecordingSink {
        send_delay: Some(Duration::from_millis(500)),
        ..Default::default()
    });
    let b = batcher(sink.clone());

    b.push("first".to_string());
    let b2 = b.clone();
    let inflight = tokio::spawn(async move { b2.flush().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    b.push("second".to_string());
    b.start(PersistedSession::default());
    assert!(sink.sends.lock().unwrap().is_empty());

    inflight.await.unwrap().unwrap();
    b.idle().await;

    assert_eq!(
        *sink.sends.lock().unwrap(),
        vec![vec!["first".to_string()], vec!["second".to_string()]]
    );
}

/// **Test: A start that lands while a failing save is in flight still gets flushed.**
///
/// **Setup:** Sink whose first save takes 500ms and then fails with a persistence error.
/// **Action:** flush "first" in a task; while it is saving, push "second" and start.
/// **Expected:** the in-flight flush returns the error; "second" is still saved and sent.
#[tokio::test(start_paused = true)]
async fn test_start_during_failed_save_is_rescheduled() {
    let sink = Arc::new(RecordingSink {
        save_delay: Some(Duration::from_millis(500)),
        fail_next_save: Mutex::new(true),
        ..Default::default()
    });
    let b = batcher(sink.clone());

    b.push("first".to_string());
    let b2 = b.clone();
    let inflight = tokio::spawn(async move { b2.flush().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    b.push("second".to_string());
    b.start(PersistedSession::default());

    let err = inflight.await.unwrap().unwrap_err();
    assert!(matches!(err, BotError::Persistence(_)));
    b.idle().await;

    assert_eq!(sink.saves.lock().unwrap().len(), 1);
    assert_eq!(*sink.sends.lock().unwrap(), vec![vec!["second".to_string()]]);
    assert_eq!(b.pending(), 0);
}

/// **Test: Storage rejecting the state as too large restarts the conversation.**
///
/// **Setup:** Sink rejecting any non-empty user data; recovery message "restart".
/// **Action:** start with user data and a queued reply; wait for idle.
/// **Expected:** only "restart" is sent; saved state has no user data and an empty stack;
/// take_reset is true once; an Error event is emitted.
#[tokio::test(start_paused = true)]
async fn test_unsaveable_state_resets_conversation() {
    let sink = Arc::new(RecordingSink {
        reject_user_data: true,
        ..Default::default()
    });
    let events = EventBus::default();
    let mut rx = events.subscribe();
    let b = Batcher::new(sink.clone(), Duration::from_millis(250), events);
    b.set_recovery_message("restart".to_string());

    let mut snapshot = PersistedSession::default();
    snapshot.user_data.insert("blob".into(), json!("x".repeat(64)));
    snapshot
        .session_state
        .push(dbot_core::StackEntry::new("*:/"));
    b.push("reply".to_string());
    b.start(snapshot);
    b.idle().await;

    assert_eq!(*sink.sends.lock().unwrap(), vec![vec!["restart".to_string()]]);
    let saves = sink.saves.lock().unwrap();
    assert_eq!(saves.len(), 1);
    assert!(saves[0].user_data.is_empty());
    assert!(saves[0].session_state.is_empty());
    assert!(b.take_reset());
    assert!(!b.take_reset());
    assert!(matches!(rx.try_recv(), Ok(BotEvent::Error(_))));
}
