//! Core types: addresses, messages, attachments, and the [`Sendable`] capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consts;

/// Free-form JSON object used for user, conversation, and per-dialog data.
pub type DataMap = serde_json::Map<String, Value>;

/// Identity of a user or bot on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Identity of a conversation on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default)]
    pub is_group: bool,
}

/// Where a message came from and where replies go: channel, user, bot, conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub channel_id: String,
    pub user: ChannelAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

impl Address {
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            user: ChannelAccount::new(user_id),
            ..Default::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation = Some(ConversationAccount {
            id: conversation_id.into(),
            is_group: false,
        });
        self
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.id.as_str())
    }
}

/// File, card, or keyboard attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Inbound or outbound event. Inbound messages are not modified after dispatch
/// except for locale annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_locale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub source_event: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Resolved user (after an optional user lookup); defaults to `address.user`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChannelAccount>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            message_type: consts::message_type::MESSAGE.to_string(),
            agent: consts::AGENT.to_string(),
            source: String::new(),
            address: Address::default(),
            text: String::new(),
            text_locale: None,
            attachments: Vec::new(),
            source_event: Value::Null,
            timestamp: Utc::now(),
            user: None,
        }
    }
}

impl Message {
    /// New `message` event with the given text and no address (filled in when sent).
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Inbound message from `address`.
    pub fn inbound(address: Address, text: impl Into<String>) -> Self {
        Self {
            source: address.channel_id.clone(),
            address,
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn typing() -> Self {
        Self {
            message_type: consts::message_type::TYPING.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.text_locale = Some(locale.into());
        self
    }

    /// True when this is a user utterance rather than a system/typing event.
    pub fn is_message(&self) -> bool {
        self.message_type.eq_ignore_ascii_case(consts::message_type::MESSAGE)
    }

    /// Id of the user the message belongs to (looked-up user first, then address).
    pub fn user_id(&self) -> &str {
        self.user
            .as_ref()
            .map(|u| u.id.as_str())
            .unwrap_or(self.address.user.id.as_str())
    }
}

/// Anything that can be turned into an outbound [`Message`].
pub trait Sendable {
    fn to_message(&self) -> Message;
}

impl Sendable for Message {
    fn to_message(&self) -> Message {
        self.clone()
    }
}
