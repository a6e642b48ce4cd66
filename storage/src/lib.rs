//! Storage crate: persistence of per-user and per-conversation bot state.
//!
//! ## Modules
//!
//! - [`error`] – Storage error types
//! - [`models`] – StorageContext, BotStorageData, StateRecord
//! - [`repository`] – BotStorage trait
//! - [`memory_storage`] – MemoryBotStorage (in-process)
//! - [`sqlite_storage`] – SqliteBotStorage (SQLite)
//! - [`sqlite_pool`] – SqlitePoolManager

mod error;
mod memory_storage;
mod models;
mod repository;
mod sqlite_pool;
mod sqlite_storage;


pub use error::StorageError;
pub use memory_storage::MemoryBotStorage;
pub use models::{BotStorageData, StateKind, StateRecord, StorageContext};
pub use repository::BotStorage;
pub use sqlite_pool::SqlitePoolManager;
pub use sqlite_storage::SqliteBotStorage;
