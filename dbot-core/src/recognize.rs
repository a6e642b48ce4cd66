//! Recognition and resume results: the shared "confidence + payload" contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{DataMap, Message};

/// Why a parent dialog is being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumeReason {
    Completed,
    NotCompleted,
    Canceled,
    Back,
    Forward,
}

/// Kind of value a prompt collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptType {
    Text,
    Number,
    Confirm,
    Choice,
    Time,
    Attachment,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::Text => "text",
            PromptType::Number => "number",
            PromptType::Confirm => "confirm",
            PromptType::Choice => "choice",
            PromptType::Time => "time",
            PromptType::Attachment => "attachment",
        }
    }
}

/// Entity extracted from an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Value>,
}

/// Result of scoring an utterance: used for dialog self-scoring, intents, actions, and prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeResult {
    /// Confidence in [0, 1].
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    /// Regex capture groups (whole match first) for pattern-based recognizers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed: Option<ResumeReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_type: Option<PromptType>,
    /// Name of the matched action (action recognition only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Payload carried by an `action?name=data` utterance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Dialog on the stack that owns the matched action; `None` for global actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecognizeResult {
    pub fn with_score(score: f64) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }

    pub fn intent(intent: impl Into<String>, score: f64) -> Self {
        Self {
            score,
            intent: Some(intent.into()),
            ..Default::default()
        }
    }
}

/// Result handed to a parent's `dialog_resumed` hook when a child ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogResult {
    pub resumed: ResumeReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_type: Option<PromptType>,
}

impl Default for DialogResult {
    fn default() -> Self {
        Self::completed(None)
    }
}

impl DialogResult {
    pub fn completed(response: Option<Value>) -> Self {
        Self {
            resumed: ResumeReason::Completed,
            response,
            child_id: None,
            error: None,
            prompt_type: None,
        }
    }

    pub fn with_reason(resumed: ResumeReason) -> Self {
        Self {
            resumed,
            ..Self::completed(None)
        }
    }

    pub fn canceled() -> Self {
        Self::with_reason(ResumeReason::Canceled)
    }
}

impl From<RecognizeResult> for DialogResult {
    fn from(r: RecognizeResult) -> Self {
        Self {
            resumed: r.resumed.unwrap_or(ResumeReason::Completed),
            response: r.response,
            child_id: None,
            error: r.error,
            prompt_type: r.prompt_type,
        }
    }
}

/// What a dialog or recognizer sees when scoring the current utterance.
#[derive(Debug, Clone, Copy)]
pub struct RecognizeContext<'a> {
    pub message: &'a Message,
    pub locale: &'a str,
    pub dialog_data: &'a DataMap,
    pub active_dialog: bool,
}

impl<'a> RecognizeContext<'a> {
    pub fn text(&self) -> &'a str {
        self.message.text.as_str()
    }
}
