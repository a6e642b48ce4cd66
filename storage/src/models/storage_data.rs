//! Payload exchanged with a [`crate::BotStorage`].

use dbot_core::consts::data::SESSION_STATE;
use dbot_core::{DataMap, PersistedSession, SessionState};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The three data bags a session persists. `None` means "not loaded" or "do not save".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStorageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<DataMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_data: Option<DataMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_conversation_data: Option<DataMap>,
}

impl BotStorageData {
    /// Bags to save for `snapshot`; the dialog stack rides in the private conversation data.
    pub fn from_snapshot(snapshot: &PersistedSession) -> Result<Self, serde_json::Error> {
        let mut private = snapshot.private_conversation_data.clone();
        private.insert(
            SESSION_STATE.to_string(),
            serde_json::to_value(&snapshot.session_state)?,
        );
        Ok(Self {
            user_data: Some(snapshot.user_data.clone()),
            conversation_data: Some(snapshot.conversation_data.clone()),
            private_conversation_data: Some(private),
        })
    }

    /// Splits loaded bags into session data plus the stored dialog stack, if any.
    ///
    /// A stack that no longer deserializes is dropped, which starts the
    /// conversation over.
    pub fn into_session(self) -> (PersistedSession, Option<SessionState>) {
        let mut private = self.private_conversation_data.unwrap_or_default();
        let state = private
            .remove(SESSION_STATE)
            .and_then(|v| match serde_json::from_value::<SessionState>(v) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(error = %e, "stored session state is unreadable; starting over");
                    None
                }
            });
        let session = PersistedSession {
            user_data: self.user_data.unwrap_or_default(),
            conversation_data: self.conversation_data.unwrap_or_default(),
            private_conversation_data: private,
            session_state: state.clone().unwrap_or_default(),
        };
        (session, state)
    }
}
