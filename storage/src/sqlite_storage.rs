//! SQLite-backed [`BotStorage`]: one `bot_state` row per (kind, id) holding the bag as JSON.
//!
//! Uses [`SqlitePoolManager`] and [`StateRecord`]. All writes of a save run in one transaction.

use async_trait::async_trait;
use chrono::Utc;
use dbot_core::DataMap;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::models::{BotStorageData, StateKind, StateRecord, StorageContext};
use crate::repository::BotStorage;
use crate::sqlite_pool::SqlitePoolManager;

#[derive(Clone)]
pub struct SqliteBotStorage {
    pool_manager: SqlitePoolManager,
    max_entry_bytes: Option<usize>,
}

impl SqliteBotStorage {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(database_url).await?;
        let storage = Self {
            pool_manager,
            max_entry_bytes: None,
        };
        storage.init().await?;
        Ok(storage)
    }

    /// Rejects any single bag whose JSON exceeds `bytes` with [`StorageError::MessageTooLarge`].
    pub fn with_max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = Some(bytes);
        self
    }

    async fn init(&self) -> Result<(), StorageError> {
        info!("Creating bot_state table if not exist");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_state (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            )
            "#,
        )
        .execute(self.pool_manager.pool())
        .await?;

        Ok(())
    }

    /// Raw row for `(kind, id)`, if stored.
    pub async fn get_record(
        &self,
        kind: StateKind,
        id: &str,
    ) -> Result<Option<StateRecord>, StorageError> {
        let record = sqlx::query_as::<_, StateRecord>(
            "SELECT kind, id, data, updated_at FROM bot_state WHERE kind = ? AND id = ?",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(self.pool_manager.pool())
        .await?;
        Ok(record)
    }

    async fn load(&self, kind: StateKind, id: &str) -> Result<DataMap, StorageError> {
        match self.get_record(kind, id).await? {
            Some(record) => Ok(serde_json::from_str(&record.data)?),
            None => Ok(DataMap::new()),
        }
    }

    fn encode(&self, kind: StateKind, data: &DataMap) -> Result<String, StorageError> {
        let json = serde_json::to_string(data)?;
        match self.max_entry_bytes {
            Some(max) if json.len() > max => Err(StorageError::MessageTooLarge(format!(
                "{} data is {} bytes (limit {})",
                kind.as_str(),
                json.len(),
                max
            ))),
            _ => Ok(json),
        }
    }

    /// Number of stored rows.
    pub async fn count(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bot_state")
            .fetch_one(self.pool_manager.pool())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl BotStorage for SqliteBotStorage {
    async fn get_data(&self, context: &StorageContext) -> Result<BotStorageData, StorageError> {
        let mut data = BotStorageData::default();
        if context.persist_user_data {
            data.user_data = Some(self.load(StateKind::User, &context.user_id).await?);
        }
        if let Some(conversation_id) = &context.conversation_id {
            if context.persist_conversation_data {
                data.conversation_data =
                    Some(self.load(StateKind::Conversation, conversation_id).await?);
            }
            if let Some(key) = context.private_key() {
                data.private_conversation_data =
                    Some(self.load(StateKind::PrivateConversation, &key).await?);
            }
        }
        debug!(user_id = %context.user_id, "sqlite storage: loaded");
        Ok(data)
    }

    async fn save_data(
        &self,
        context: &StorageContext,
        data: &BotStorageData,
    ) -> Result<(), StorageError> {
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

        let mut tx = self.pool_manager.pool().begin().await?;
        let now = Utc::now();
        for (kind, id, json) in &writes {
            sqlx::query(
                r#"
                INSERT INTO bot_state (kind, id, data, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(kind, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
                "#,
            )
            .bind(kind.as_str())
            .bind(id)
            .bind(json)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(user_id = %context.user_id, rows = writes.len(), "sqlite storage: saved");
        Ok(())
    }
}
