//! Shared test session: a minimal [`DialogSession`] that records what dialogs ask of it.

#![allow(dead_code)]

use async_trait::async_trait;
use dbot_core::{
    Address, BotError, DataMap, DialogResult, DialogSession, DialogTarget, Message, Result,
    SessionState, StackEntry,
};
use serde_json::Value;

#[derive(Default)]
pub struct MockSession {
    pub message: Message,
    pub state: SessionState,
    pub scratch: DataMap,
    pub sent: Vec<String>,
    pub begun: Vec<(String, Option<Value>)>,
    pub ended: Vec<DialogResult>,
    pub canceled: Vec<(DialogTarget, Option<(String, Option<Value>)>)>,
    pub errors: Vec<String>,
    pub conversation_ended: bool,
}

impl MockSession {
    /// Session with `ids` on the stack (bottom first) and `text` as the current message.
    pub fn with_stack(ids: &[&str], text: &str) -> Self {
        let mut session = Self {
            message: Message::inbound(Address::new("test", "user1"), text),
            ..Default::default()
        };
        for id in ids {
            session.state.push(StackEntry::new(*id));
        }
        session
    }
}

#[async_trait]
impl DialogSession for MockSession {
    fn message(&self) -> &Message {
        &self.message
    }

    fn preferred_locale(&self) -> String {
        "en".to_string()
    }

    fn session_state(&self) -> &SessionState {
        &self.state
    }

    fn dialog_data(&self) -> &DataMap {
        self.state.current().map(|e| &e.state).unwrap_or(&self.scratch)
    }

    fn dialog_data_mut(&mut self) -> &mut DataMap {
        match self.state.current_mut() {
            Some(e) => &mut e.state,
            None => &mut self.scratch,
        }
    }

    fn message_sent(&self) -> bool {
        !self.sent.is_empty()
    }

    fn send_text(&mut self, text: &str) {
        self.sent.push(text.to_string());
    }

    async fn begin_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        self.state.push(StackEntry::new(id));
        self.begun.push((id.to_string(), args));
        Ok(())
    }

    async fn replace_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        self.state.pop();
        self.begin_dialog(id, args).await
    }

    async fn end_dialog_with_result(&mut self, result: DialogResult) -> Result<()> {
        self.state.pop();
        self.ended.push(result);
        Ok(())
    }

    async fn cancel_dialog(
        &mut self,
        target: DialogTarget,
        replacement: Option<(String, Option<Value>)>,
    ) -> Result<()> {
        let index = self
            .state
            .find(&target)
            .ok_or_else(|| BotError::NotFound(format!("{:?}", target)))?;
        self.state.truncate(index);
        self.canceled.push((target, replacement));
        Ok(())
    }

    async fn end_conversation_with_text(&mut self, text: Option<&str>) -> Result<()> {
        if let Some(text) = text {
            self.sent.push(text.to_string());
        }
        self.state.clear();
        self.conversation_ended = true;
        Ok(())
    }

    async fn error(&mut self, err: BotError) {
        self.errors.push(err.to_string());
    }
}
