//! In-process [`BotStorage`]: data bags serialized to JSON and kept in maps.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use dbot_core::DataMap;
use tracing::debug;

use crate::error::StorageError;
use crate::models::{BotStorageData, StateKind, StorageContext};
use crate::repository::BotStorage;

#[derive(Debug, Default)]
pub struct MemoryBotStorage {
    users: RwLock<HashMap<String, String>>,
    conversations: RwLock<HashMap<String, String>>,
    private_conversations: RwLock<HashMap<String, String>>,
    max_entry_bytes: Option<usize>,
}

impl MemoryBotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any single bag whose JSON exceeds `bytes` with [`StorageError::MessageTooLarge`].
    pub fn with_max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = Some(bytes);
        self
    }

    /// Drops everything stored.
    pub fn delete_all(&self) {
        for store in [&self.users, &self.conversations, &self.private_conversations] {
            store.write().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    fn store(&self, kind: StateKind) -> &RwLock<HashMap<String, String>> {
        match kind {
            StateKind::User => &self.users,
            StateKind::Conversation => &self.conversations,
            StateKind::PrivateConversation => &self.private_conversations,
        }
    }

    fn load(&self, kind: StateKind, key: &str) -> Result<DataMap, StorageError> {
        let store = self.store(kind).read().unwrap_or_else(PoisonError::into_inner);
        match store.get(key) {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(DataMap::new()),
        }
    }

    fn encode(&self, kind: StateKind, data: &DataMap) -> Result<String, StorageError> {
        let json = serde_json::to_string(data)?;
        if let Some(max) = self.max_entry_bytes {
            if json.len() > max {
                return Err(StorageError::MessageTooLarge(format!(
                    "{} data is {} bytes (limit {})",
                    kind.as_str(),
                    json.len(),
                    max
                )));
            }
        }
        Ok(json)
    }
}

#[async_trait]
impl BotStorage for MemoryBotStorage {
    async fn get_data(&self, context: &StorageContext) -> Result<BotStorageData, StorageError> {
        let mut data = BotStorageData::default();
        if context.persist_user_data {
            data.user_data = Some(self.load(StateKind::User, &context.user_id)?);
        }
        if let Some(conversation_id) = &context.conversation_id {
            if context.persist_conversation_data {
                data.conversation_data = Some(self.load(StateKind::Conversation, conversation_id)?);
            }
            if let Some(key) = context.private_key() {
                data.private_conversation_data =
                    Some(self.load(StateKind::PrivateConversation, &key)?);
            }
        }
        debug!(user_id = %context.user_id, "memory storage: loaded");
        Ok(data)
    }

    async fn save_data(
        &self,
        context: &StorageContext,
        data: &BotStorageData,
    ) -> Result<(), StorageError> {
        // Encode everything first so a rejected bag leaves the store untouched.
        let mut writes = Vec::new();
        if context.persist_user_data {
            if let Some(user) = &data.user_data {
                writes.push((StateKind::User, context.user_id.clone(), self.encode(StateKind::User, user)?));
            }
        }
        if let Some(conversation_id) = &context.conversation_id {
            if context.persist_conversation_data {
                if let Some(conv) = &data.conversation_data {
                    writes.push((
                        StateKind::Conversation,
                        conversation_id.clone(),
                        self.encode(StateKind::Conversation, conv)?,
                    ));
                }
            }
            if let (Some(private), Some(key)) = (&data.private_conversation_data, context.private_key()) {
                writes.push((
                    StateKind::PrivateConversation,
                    key,
                    self.encode(StateKind::PrivateConversation, private)?,
                ));
            }
        }
        for (kind, key, json) in writes {
            self.store(kind)
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, json);
        }
        debug!(user_id = %context.user_id, "memory storage: saved");
        Ok(())
    }
}
