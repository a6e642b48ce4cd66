//! Row of the `bot_state` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which data bag a row holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    User,
    Conversation,
    PrivateConversation,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::User => "user",
            StateKind::Conversation => "conversation",
            StateKind::PrivateConversation => "private",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StateRecord {
    pub kind: String,
    pub id: String,
    /// JSON object text.
    pub data: String,
    pub updated_at: DateTime<Utc>,
}
