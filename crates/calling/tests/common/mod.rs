//! Shared call test helpers: a workflow-recording sink and call notifications.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dbot_core::{Address, BatchSink, Library, Message, PassthroughLocalizer, PersistedSession, Result};
use dbot_calling::workflow::event_type;
use dbot_calling::{CallAction, CallSession, CallSessionOptions, Workflow};

#[derive(Default)]
pub struct RecordingSink {
    pub workflows: Mutex<Vec<Workflow>>,
    pub saved: Mutex<Vec<PersistedSession>>,
}

#[async_trait]
impl BatchSink<Workflow> for RecordingSink {
    async fn save(&self, snapshot: &PersistedSession) -> Result<()> {
        self.saved.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn send(&self, batch: Vec<Workflow>) -> Result<()> {
        self.workflows.lock().unwrap().extend(batch);
        Ok(())
    }
}

impl RecordingSink {
    /// Action kinds of every workflow, one list per workflow.
    pub fn kinds(&self) -> Vec<Vec<&'static str>> {
        self.workflows
            .lock()
            .unwrap()
            .iter()
            .map(|w| w.actions.iter().map(kind).collect())
            .collect()
    }

    /// Every spoken text, in order.
    pub fn spoken(&self) -> Vec<String> {
        let mut out = Vec::new();
        for workflow in self.workflows.lock().unwrap().iter() {
            for action in &workflow.actions {
                if let CallAction::PlayPrompt { prompts, .. } = action {
                    out.extend(prompts.iter().filter_map(|p| p.value.clone()));
                }
            }
        }
        out
    }
}

pub fn kind(action: &CallAction) -> &'static str {
    match action {
        CallAction::Answer { .. } => "answer",
        CallAction::Hangup { .. } => "hangup",
        CallAction::Reject { .. } => "reject",
        CallAction::PlayPrompt { .. } => "playPrompt",
    }
}

pub fn address() -> Address {
    Address::new("skype", "caller").with_conversation("call1")
}

/// Incoming call notification.
pub fn incoming_call() -> Message {
    Message {
        message_type: event_type::CONVERSATION.to_string(),
        source: "skype".to_string(),
        address: address(),
        ..Default::default()
    }
}

/// Outcome notification for a workflow the bot sent.
pub fn call_result() -> Message {
    Message {
        message_type: event_type::CONVERSATION_RESULT.to_string(),
        source: "skype".to_string(),
        address: address(),
        source_event: serde_json::json!({ "operationOutcome": { "outcome": "success" } }),
        ..Default::default()
    }
}

pub fn options(library: Library<CallSession>) -> Arc<CallSessionOptions> {
    Arc::new(CallSessionOptions::new(
        Arc::new(library),
        Arc::new(PassthroughLocalizer::default()),
    ))
}
