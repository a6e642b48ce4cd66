//! Storage error types.
//!
//! Used by [`crate::BotStorage`] implementations. Converts into [`dbot_core::BotError`] so the
//! engine can tell recoverable failures from payloads that will never save.

use dbot_core::BotError;
use thiserror::Error;

/// Errors that can occur when loading or saving bot state.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Entry exceeds the store's size limit.
    #[error("Message too large: {0}")]
    MessageTooLarge(String),
    /// Entry was rejected as malformed.
    #[error("Bad message: {0}")]
    BadMessage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<StorageError> for BotError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::MessageTooLarge(m) => BotError::MessageTooLarge(m),
            StorageError::BadMessage(m) => BotError::BadMessage(m),
            other => BotError::Persistence(other.to_string()),
        }
    }
}
