//! Which records a load or save touches.

use dbot_core::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageContext {
    pub user_id: String,
    /// Conversation and private conversation data are only touched when set.
    pub conversation_id: Option<String>,
    pub address: Option<Address>,
    pub persist_user_data: bool,
    pub persist_conversation_data: bool,
}

impl StorageContext {
    /// Context for the user and conversation of `address`.
    pub fn for_address(address: &Address, persist_user_data: bool, persist_conversation_data: bool) -> Self {
        Self {
            user_id: address.user.id.clone(),
            conversation_id: address.conversation_id().map(str::to_string),
            address: Some(address.clone()),
            persist_user_data,
            persist_conversation_data,
        }
    }

    /// Key for per-user-per-conversation data.
    pub fn private_key(&self) -> Option<String> {
        self.conversation_id
            .as_ref()
            .map(|c| format!("{}:{}", self.user_id, c))
    }
}
