use thiserror::Error;

/// Errors raised by the dialog engine and its collaborators.
#[derive(Error, Debug, Clone)]
pub enum BotError {
    /// Unknown dialog id on begin/replace/cancel, or an unknown target on the stack.
    #[error("Dialog[{0}] not found.")]
    NotFound(String),

    /// The persisted callstack references something the registry cannot resolve.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Recognizer error: {0}")]
    Recognizer(String),

    #[error("Storage error: {0}")]
    Persistence(String),

    /// Storage rejected the payload as too large; triggers a conversation reset.
    #[error("Storage rejected data as too large: {0}")]
    MessageTooLarge(String),

    /// Storage rejected the payload as malformed; triggers a conversation reset.
    #[error("Storage rejected data as malformed: {0}")]
    BadMessage(String),

    #[error("Middleware error: {0}")]
    Middleware(String),

    #[error("Dialog error: {0}")]
    Dialog(String),

    #[error("Connector error: {0}")]
    Connector(String),

    #[error("Localizer error: {0}")]
    Localizer(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl BotError {
    /// True for storage failures that can never succeed on retry with the same payload.
    pub fn is_unsaveable(&self) -> bool {
        matches!(self, BotError::MessageTooLarge(_) | BotError::BadMessage(_))
    }
}

impl From<std::io::Error> for BotError {
    fn from(e: std::io::Error) -> Self {
        BotError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Json(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = BotError::NotFound("*:/missing".to_string());
        assert_eq!(err.to_string(), "Dialog[*:/missing] not found.");
    }

    #[test]
    fn test_unsaveable() {
        assert!(BotError::MessageTooLarge("x".into()).is_unsaveable());
        assert!(BotError::BadMessage("x".into()).is_unsaveable());
        assert!(!BotError::Persistence("x".into()).is_unsaveable());
    }
}
