use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{BotStorageData, StorageContext};

/// Persistence contract for user, conversation, and private conversation data.
///
/// `get_data` only loads the bags the context enables; `save_data` only writes the bags
/// that are `Some` and enabled.
#[async_trait]
pub trait BotStorage: Send + Sync {
    async fn get_data(&self, context: &StorageContext) -> Result<BotStorageData, StorageError>;
    async fn save_data(
        &self,
        context: &StorageContext,
        data: &BotStorageData,
    ) -> Result<(), StorageError>;
}
