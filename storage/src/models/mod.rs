//! Storage models: the lookup context, the loaded/saved payload, and the SQLite row.

mod state_record;
mod storage_context;
mod storage_data;

pub use state_record::{StateKind, StateRecord};
pub use storage_context::StorageContext;
pub use storage_data::BotStorageData;
