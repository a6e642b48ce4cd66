//! Call-control workflow: the actions a call bot answers a notification with.
//!
//! A [`Workflow`] is the outbound unit for calls: one batch of [`CallAction`]s
//! addressed to the call. Before a workflow leaves, [`add_call_control`] makes
//! sure an unanswered call is answered ahead of any media action, and that a
//! finished conversation hangs up (or rejects a call that was never answered).

use dbot_core::consts::AGENT;
use dbot_core::Address;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound call event types.
pub mod event_type {
    /// Incoming call (or call state change) notification; the call is not answered yet.
    pub const CONVERSATION: &str = "conversation";
    /// Outcome of a previously sent workflow.
    pub const CONVERSATION_RESULT: &str = "conversationResult";
    /// Outbound workflow.
    pub const WORKFLOW: &str = "workflow";
}

/// Notification the bot subscribes to with every workflow.
pub const CALL_STATE_CHANGE: &str = "callStateChange";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallState {
    Idle,
    Incoming,
    Establishing,
    Established,
    Hold,
    Unhold,
    Transferring,
    Redirecting,
    Terminating,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModalityType {
    #[default]
    Audio,
    Video,
    VideoBasedScreenSharing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationOutcome {
    Success,
    Failure,
}

/// One piece of audio to play: synthesized text or silence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_length_in_milliseconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emphasize: Option<bool>,
}

impl Prompt {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn silence(millis: u64) -> Self {
        Self {
            silence_length_in_milliseconds: Some(millis),
            ..Default::default()
        }
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }
}

/// A call-control or media action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CallAction {
    #[serde(rename_all = "camelCase")]
    Answer {
        operation_id: String,
        accept_modality_types: Vec<ModalityType>,
    },
    #[serde(rename_all = "camelCase")]
    Hangup { operation_id: String },
    #[serde(rename_all = "camelCase")]
    Reject { operation_id: String },
    #[serde(rename_all = "camelCase")]
    PlayPrompt {
        operation_id: String,
        prompts: Vec<Prompt>,
    },
}

fn operation_id() -> String {
    Uuid::new_v4().to_string()
}

impl CallAction {
    /// Answers with audio.
    pub fn answer() -> Self {
        CallAction::Answer {
            operation_id: operation_id(),
            accept_modality_types: vec![ModalityType::Audio],
        }
    }

    pub fn hangup() -> Self {
        CallAction::Hangup {
            operation_id: operation_id(),
        }
    }

    pub fn reject() -> Self {
        CallAction::Reject {
            operation_id: operation_id(),
        }
    }

    pub fn play_prompt(prompts: Vec<Prompt>) -> Self {
        CallAction::PlayPrompt {
            operation_id: operation_id(),
            prompts,
        }
    }

    /// Speaks `text`.
    pub fn say(text: impl Into<String>) -> Self {
        Self::play_prompt(vec![Prompt::text(text)])
    }

    pub fn operation_id(&self) -> &str {
        match self {
            CallAction::Answer { operation_id, .. }
            | CallAction::Hangup { operation_id }
            | CallAction::Reject { operation_id }
            | CallAction::PlayPrompt { operation_id, .. } => operation_id,
        }
    }

    /// True for actions that end the call.
    pub fn ends_call(&self) -> bool {
        matches!(self, CallAction::Hangup { .. } | CallAction::Reject { .. })
    }
}

impl From<Prompt> for CallAction {
    fn from(prompt: Prompt) -> Self {
        CallAction::play_prompt(vec![prompt])
    }
}

/// Batch of actions sent to a call in one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub agent: String,
    pub source: String,
    pub address: Address,
    pub actions: Vec<CallAction>,
    pub notification_subscriptions: Vec<String>,
}

impl Workflow {
    pub fn new(address: Address, actions: Vec<CallAction>) -> Self {
        Self {
            workflow_type: event_type::WORKFLOW.to_string(),
            agent: AGENT.to_string(),
            source: address.channel_id.clone(),
            address,
            actions,
            notification_subscriptions: vec![CALL_STATE_CHANGE.to_string()],
        }
    }
}

/// Adds the call-control actions `actions` needs.
///
/// An unanswered call gets an answer in front of any other action. With
/// `also_end_call` and no hangup/reject already queued, a hangup (answered) or
/// reject (unanswered) is appended. Returns whether the call is answered afterwards.
pub fn add_call_control(actions: &mut Vec<CallAction>, answered: bool, also_end_call: bool) -> bool {
    let mut has_answer = answered;
    let mut has_end_call = false;
    let mut has_other = false;
    for action in actions.iter() {
        match action {
            CallAction::Answer { .. } => has_answer = true,
            CallAction::Hangup { .. } | CallAction::Reject { .. } => has_end_call = true,
            CallAction::PlayPrompt { .. } => has_other = true,
        }
    }
    if !has_answer && has_other {
        actions.insert(0, CallAction::answer());
        has_answer = true;
    }
    if also_end_call && !has_end_call {
        if has_answer {
            actions.push(CallAction::hangup());
        } else {
            actions.push(CallAction::reject());
        }
    }
    has_answer
}
