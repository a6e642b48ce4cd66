//! Integration tests for [`dbot_dialogs::IntentRecognizerSet`].
//!
//! Covers: parallel mode taking the maximum score regardless of completion order, the threshold,
//! series mode stopping on an exact match, and errors aborting the aggregation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbot_core::{BotError, DataMap, Message, RecognizeContext, RecognizeResult, Result};
use dbot_dialogs::{IntentRecognizer, IntentRecognizerSet, IntentRecognizerSetOptions, RecognizeOrder};

struct Fixed {
    intent: &'static str,
    score: f64,
    delay_ms: u64,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl IntentRecognizer for Fixed {
    async fn recognize(&self, _ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        Ok(RecognizeResult::intent(self.intent, self.score))
    }
}

struct Broken;

#[async_trait]
impl IntentRecognizer for Broken {
    async fn recognize(&self, _ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        Err(BotError::Recognizer("service unavailable".into()))
    }
}

fn fixed(intent: &'static str, score: f64, delay_ms: u64, calls: &Arc<AtomicUsize>) -> Arc<dyn IntentRecognizer> {
    Arc::new(Fixed {
        intent,
        score,
        delay_ms,
        calls: calls.clone(),
    })
}

async fn run(set: &IntentRecognizerSet) -> Result<RecognizeResult> {
    let message = Message::text("hello");
    let data = DataMap::new();
    let ctx = RecognizeContext {
        message: &message,
        locale: "en",
        dialog_data: &data,
        active_dialog: true,
    };
    set.recognize(&ctx).await
}

/// **Test: Parallel mode returns the maximum score, whatever finishes first.**
///
/// **Setup:** Scores 0.3 (slow), 0.9 (slowest), 0.5 (fast).
/// **Expected:** intent "b" with score 0.9; all three recognizers ran.
#[tokio::test]
async fn test_parallel_takes_max() {
    let calls = Arc::new(AtomicUsize::new(0));
    let set = IntentRecognizerSet::default()
        .recognizer(fixed("a", 0.3, 20, &calls))
        .recognizer(fixed("b", 0.9, 40, &calls))
        .recognizer(fixed("c", 0.5, 0, &calls));

    let result = run(&set).await.unwrap();
    assert_eq!(result.intent.as_deref(), Some("b"));
    assert_eq!(result.score, 0.9);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// **Test: Equal scores resolve to the first registered recognizer.**
#[tokio::test]
async fn test_parallel_tie_keeps_registration_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let set = IntentRecognizerSet::default()
        .recognizer(fixed("first", 0.7, 30, &calls))
        .recognizer(fixed("second", 0.7, 0, &calls));

    let result = run(&set).await.unwrap();
    assert_eq!(result.intent.as_deref(), Some("first"));
}

/// **Test: Scores below the threshold yield a zero result.**
#[tokio::test]
async fn test_below_threshold_scores_zero() {
    let calls = Arc::new(AtomicUsize::new(0));
    let set = IntentRecognizerSet::new(IntentRecognizerSetOptions {
        intent_threshold: 0.5,
        ..Default::default()
    })
    .recognizer(fixed("a", 0.2, 0, &calls))
    .recognizer(fixed("b", 0.4, 0, &calls));

    let result = run(&set).await.unwrap();
    assert_eq!(result.score, 0.0);
    assert!(result.intent.is_none());
}

/// **Test: Series mode stops after an exact match.**
///
/// **Setup:** Series order; scores 0.4, 1.0, 0.8 each counting calls separately.
/// **Expected:** the third recognizer is never invoked; result is the exact match.
#[tokio::test]
async fn test_series_stops_on_exact_match() {
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let set = IntentRecognizerSet::new(IntentRecognizerSetOptions {
        recognize_order: RecognizeOrder::Series,
        ..Default::default()
    })
    .recognizer(fixed("a", 0.4, 0, &before))
    .recognizer(fixed("exact", 1.0, 0, &before))
    .recognizer(fixed("late", 0.8, 0, &after));

    let result = run(&set).await.unwrap();
    assert_eq!(result.intent.as_deref(), Some("exact"));
    assert_eq!(before.load(Ordering::SeqCst), 2);
    assert_eq!(after.load(Ordering::SeqCst), 0);
}

/// **Test: Series mode without stop_if_exact_match runs every recognizer.**
#[tokio::test]
async fn test_series_runs_all_without_stop() {
    let calls = Arc::new(AtomicUsize::new(0));
    let set = IntentRecognizerSet::new(IntentRecognizerSetOptions {
        recognize_order: RecognizeOrder::Series,
        stop_if_exact_match: false,
        ..Default::default()
    })
    .recognizer(fixed("exact", 1.0, 0, &calls))
    .recognizer(fixed("late", 0.8, 0, &calls));

    let result = run(&set).await.unwrap();
    assert_eq!(result.intent.as_deref(), Some("exact"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// **Test: Any recognizer error fails the whole aggregation.**
#[tokio::test]
async fn test_error_aborts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let set = IntentRecognizerSet::default()
        .recognizer(fixed("a", 0.9, 0, &calls))
        .recognizer(Arc::new(Broken));

    let err = run(&set).await.unwrap_err();
    assert!(matches!(err, BotError::Recognizer(_)));
}
