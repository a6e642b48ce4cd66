//! Integration tests for [`dbot_dialogs::Waterfall`], [`dbot_dialogs::IntentDialog`] and
//! [`dbot_dialogs::ActionSet`] driven through a recording session.

mod common;

use common::MockSession;
use dbot_core::consts::data::{INTENT, WATERFALL_STEP};
use dbot_core::{BotError, Dialog, DialogResult, DialogSession, DialogTarget, RecognizeResult, ResumeReason};
use dbot_dialogs::{ActionSet, IntentAction, IntentDialog, RecognizeMode, StepArgs, StepResult, Waterfall};
use regex::Regex;
use serde_json::json;

fn two_steps() -> Waterfall<MockSession> {
    Waterfall::new()
        .step(|s: &mut MockSession, _args| {
            Box::pin(async move {
                s.send_text("What's your name?");
                Ok(StepResult::Wait)
            })
        })
        .step(|s: &mut MockSession, args| {
            Box::pin(async move {
                let name = args.response().and_then(|v| v.as_str()).unwrap_or("?").to_string();
                s.send_text(&format!("Hi {}", name));
                Ok(StepResult::Wait)
            })
        })
}

/// **Test: Waterfall steps advance on resume and the dialog ends past the last step.**
///
/// **Setup:** Two-step waterfall on a stack [*:/].
/// **Action:** begin; resume with "Ann"; resume again.
/// **Expected:** both prompts sent in order; step index tracked; final resume ends the dialog.
#[tokio::test]
async fn test_waterfall_advances_and_ends() {
    let w = two_steps();
    let mut s = MockSession::with_stack(&["*:/"], "hi");

    w.begin(&mut s, None).await.unwrap();
    assert_eq!(s.dialog_data()[WATERFALL_STEP], json!(0));

    w.dialog_resumed(&mut s, DialogResult::completed(Some(json!("Ann"))))
        .await
        .unwrap();
    assert_eq!(s.sent, vec!["What's your name?", "Hi Ann"]);
    assert_eq!(s.dialog_data()[WATERFALL_STEP], json!(1));

    w.dialog_resumed(&mut s, DialogResult::completed(Some(json!("done"))))
        .await
        .unwrap();
    assert_eq!(s.ended.len(), 1);
    assert_eq!(s.ended[0].response, Some(json!("done")));
    assert!(s.state.is_empty());
}

/// **Test: `back` re-runs the previous step; a reply without a prompt answers the current step.**
#[tokio::test]
async fn test_waterfall_back_and_plain_reply() {
    let w = two_steps();
    let mut s = MockSession::with_stack(&["*:/"], "Bob");

    w.begin(&mut s, None).await.unwrap();
    w.reply_received(&mut s, RecognizeResult::with_score(0.1)).await.unwrap();
    assert_eq!(s.sent.last().map(String::as_str), Some("Hi Bob"));

    w.dialog_resumed(&mut s, DialogResult::with_reason(ResumeReason::Back))
        .await
        .unwrap();
    assert_eq!(s.dialog_data()[WATERFALL_STEP], json!(0));
    assert_eq!(s.sent.last().map(String::as_str), Some("What's your name?"));
}

/// **Test: A step returning Next runs the following step immediately.**
#[tokio::test]
async fn test_waterfall_skip() {
    let w: Waterfall<MockSession> = Waterfall::new()
        .step(|_s: &mut MockSession, _args| Box::pin(async move { Ok(StepResult::next_with(json!(7))) }))
        .step(|s: &mut MockSession, args| {
            Box::pin(async move {
                assert_eq!(args.resumed(), Some(ResumeReason::Forward));
                s.send_text(&format!("got {}", args.response().cloned().unwrap_or_default()));
                Ok(StepResult::Wait)
            })
        });
    let mut s = MockSession::with_stack(&["*:/"], "");

    w.begin(&mut s, None).await.unwrap();
    assert_eq!(s.sent, vec!["got 7"]);
}

/// **Test: An empty waterfall ends immediately with `forward`.**
#[tokio::test]
async fn test_empty_waterfall_ends() {
    let w: Waterfall<MockSession> = Waterfall::new();
    let mut s = MockSession::with_stack(&["*:/"], "");
    w.begin(&mut s, None).await.unwrap();
    assert_eq!(s.ended[0].resumed, ResumeReason::Forward);
}

fn greeter() -> IntentDialog<MockSession> {
    IntentDialog::default()
        .matches_regex(
            Regex::new("(?i)^hello").unwrap(),
            Waterfall::new().step(|s: &mut MockSession, args: StepArgs| {
                Box::pin(async move {
                    assert!(args.intent().is_some());
                    s.send_text("Hello there!");
                    Ok(StepResult::Wait)
                })
            }),
        )
        .unwrap()
        .matches("help", IntentAction::begin_dialog("/help", Some(json!({"topic": "all"}))))
        .unwrap()
        .on_default(Waterfall::new().step(|s: &mut MockSession, _args| {
            Box::pin(async move {
                s.send_text("I didn't get that.");
                Ok(StepResult::Wait)
            })
        }))
}

/// **Test: Registering two handlers for one intent fails.**
#[tokio::test]
async fn test_duplicate_intent_handler() {
    let err = IntentDialog::<MockSession>::default()
        .matches("x", IntentAction::begin_dialog("/a", None))
        .unwrap()
        .matches("x", IntentAction::begin_dialog("/b", None))
        .err()
        .unwrap();
    assert!(matches!(err, BotError::AlreadyExists(_)));
}

/// **Test: The root IntentDialog recognizes on begin and remembers the active intent.**
#[tokio::test]
async fn test_intent_dialog_recognizes_on_begin_when_root() {
    let d = greeter();
    let mut s = MockSession::with_stack(&["*:/"], "hello bot");

    d.begin(&mut s, None).await.unwrap();
    assert_eq!(s.sent, vec!["Hello there!"]);
    assert_eq!(s.dialog_data()[INTENT], json!("(?i)^hello"));
}

/// **Test: OnBeginIfRoot does not recognize when the dialog is not the root.**
#[tokio::test]
async fn test_intent_dialog_skips_recognition_when_nested() {
    let d = greeter().recognize_mode(RecognizeMode::OnBeginIfRoot);
    let mut s = MockSession::with_stack(&["*:/", "*:/greet"], "hello");

    d.begin(&mut s, None).await.unwrap();
    assert!(s.sent.is_empty());
}

/// **Test: OnBegin recognizes on begin even when the dialog is nested.**
#[tokio::test]
async fn test_intent_dialog_on_begin_recognizes_when_nested() {
    let d = greeter().recognize_mode(RecognizeMode::OnBegin);
    let mut s = MockSession::with_stack(&["*:/", "*:/greet"], "hello");

    d.begin(&mut s, None).await.unwrap();
    assert_eq!(s.sent, vec!["Hello there!"]);
    assert_eq!(s.dialog_data()[INTENT], json!("(?i)^hello"));
}

/// **Test: OnReply never recognizes on begin, even as the root; the next reply is handled.**
#[tokio::test]
async fn test_intent_dialog_on_reply_waits_for_reply() {
    let d = greeter().recognize_mode(RecognizeMode::OnReply);
    let mut s = MockSession::with_stack(&["*:/"], "hello bot");

    d.begin(&mut s, None).await.unwrap();
    assert!(s.sent.is_empty());
    assert!(s.dialog_data().get(INTENT).is_none());

    d.reply_received(&mut s, RecognizeResult::default()).await.unwrap();
    assert_eq!(s.sent, vec!["I didn't get that."]);
}

/// **Test: Unmatched intents go to the default handler.**
#[tokio::test]
async fn test_intent_dialog_default_handler() {
    let d = greeter();
    let mut s = MockSession::with_stack(&["*:/"], "blah");

    d.reply_received(&mut s, RecognizeResult::default()).await.unwrap();
    assert_eq!(s.sent, vec!["I didn't get that."]);
    assert_eq!(s.dialog_data()[INTENT], json!("default"));
}

/// **Test: A begin-dialog handler passes the recognize result merged with its args; resuming is a no-op.**
#[tokio::test]
async fn test_intent_begin_dialog_handler() {
    let d = greeter();
    let mut s = MockSession::with_stack(&["*:/"], "help");

    d.reply_received(&mut s, RecognizeResult::intent("help", 1.0)).await.unwrap();
    let (id, args) = &s.begun[0];
    assert_eq!(id, "/help");
    let args = args.as_ref().unwrap();
    assert_eq!(args["intent"], json!("help"));
    assert_eq!(args["topic"], json!("all"));

    s.state.pop();
    d.dialog_resumed(&mut s, DialogResult::completed(None)).await.unwrap();
    assert_eq!(s.begun.len(), 1);
    assert!(s.errors.is_empty());
}

/// **Test: Dialog-scoped cancel action cancels the owning dialog by stack index.**
#[tokio::test]
async fn test_scoped_cancel_action() {
    let d = greeter().actions(ActionSet::new().cancel_action(
        "cancel",
        Some("Canceled."),
        Some(Regex::new("(?i)^cancel$").unwrap()),
    ));
    let mut s = MockSession::with_stack(&["*:/", "*:/order", "*:/ask"], "cancel");

    let mut r = d.recognize_action(&s.message.clone()).await.unwrap();
    assert_eq!(r.score, 1.0);
    r.dialog_id = Some("*:/order".into());
    r.dialog_index = Some(1);
    d.invoke_action(&mut s, r).await.unwrap();

    assert_eq!(s.sent, vec!["Canceled."]);
    assert_eq!(s.state.depth(), 1);
    assert_eq!(s.canceled[0].0, DialogTarget::Index(1));
}
