//! The [`Dialog`] capability and the [`DialogSession`] surface dialogs drive.
//!
//! A dialog is a unit of conversational logic. The engine calls its hooks;
//! the dialog answers by mutating the session (sending, pushing or popping
//! stack entries). Dialogs are generic over the session type so the same
//! building blocks serve chat and call sessions.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BotError, Result};
use crate::recognize::{DialogResult, RecognizeContext, RecognizeResult};
use crate::stack::{DialogTarget, SessionState};
use crate::types::{DataMap, Message};

/// Operations a dialog may perform on the session driving it.
#[async_trait]
pub trait DialogSession: Send {
    /// Message being processed this turn.
    fn message(&self) -> &Message;

    fn preferred_locale(&self) -> String;

    fn session_state(&self) -> &SessionState;

    /// State of the active stack entry.
    fn dialog_data(&self) -> &DataMap;

    fn dialog_data_mut(&mut self) -> &mut DataMap;

    /// True once anything was queued for delivery this turn.
    fn message_sent(&self) -> bool;

    /// Localizes `text` and queues it for delivery.
    fn send_text(&mut self, text: &str);

    async fn begin_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()>;

    async fn replace_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()>;

    async fn end_dialog_with_result(&mut self, result: DialogResult) -> Result<()>;

    async fn cancel_dialog(
        &mut self,
        target: DialogTarget,
        replacement: Option<(String, Option<Value>)>,
    ) -> Result<()>;

    /// Ends the conversation, optionally sending `text` (localized) first.
    async fn end_conversation_with_text(&mut self, text: Option<&str>) -> Result<()>;

    /// Reports a failure: ends the conversation with an apology and notifies listeners.
    async fn error(&mut self, err: BotError);
}

/// Conversational unit with lifecycle and recognition hooks.
#[async_trait]
pub trait Dialog<S: DialogSession>: Send + Sync {
    /// Called when the dialog is pushed onto the stack.
    async fn begin(&self, session: &mut S, args: Option<Value>) -> Result<()> {
        let _ = args;
        self.reply_received(session, RecognizeResult::default()).await
    }

    /// Called with the user's reply while this dialog is active.
    async fn reply_received(&self, session: &mut S, result: RecognizeResult) -> Result<()>;

    /// Called when a child dialog ends and this dialog becomes active again.
    async fn dialog_resumed(&self, session: &mut S, result: DialogResult) -> Result<()> {
        if let Some(err) = result.error {
            session.error(BotError::Dialog(err)).await;
        }
        Ok(())
    }

    /// Scores how well this dialog understands the utterance while active.
    async fn recognize(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        let _ = ctx;
        Ok(RecognizeResult::with_score(0.1))
    }

    /// Scores the dialog's own interrupt actions (help, cancel, ...) while it is on the stack.
    async fn recognize_action(&self, message: &Message) -> Result<RecognizeResult> {
        let _ = message;
        Ok(RecognizeResult::default())
    }

    /// Runs an action previously matched by [`Dialog::recognize_action`].
    async fn invoke_action(&self, session: &mut S, result: RecognizeResult) -> Result<()> {
        let _ = session;
        Err(BotError::NotFound(format!(
            "action {}",
            result.action.unwrap_or_default()
        )))
    }
}
