//! Ends conversations whose stored stack predates the bot's current dialog version.

use async_trait::async_trait;
use dbot_core::{Flow, Message, Middleware, Result};
use dbot_session::Session;
use regex::Regex;
use tracing::info;

/// Sent when a conversation is ended because of an upgrade or a reset command.
pub const DEFAULT_UPGRADE_MESSAGE: &str = "Sorry. The service was upgraded and we need to start over.";

/// Session middleware tracking the dialog version in the stored session state.
///
/// A conversation in progress under a different major version is ended with
/// the upgrade message. So is any conversation where the user types the reset
/// command. Otherwise the current version is stamped and routing continues.
pub struct DialogVersion {
    version: f64,
    message: Option<String>,
    reset_command: Option<Regex>,
}

impl DialogVersion {
    pub fn new(version: f64) -> Self {
        Self {
            version,
            message: None,
            reset_command: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_reset_command(mut self, command: Regex) -> Self {
        self.reset_command = Some(command);
        self
    }

    async fn restart(&self, session: &mut Session) -> Result<Flow> {
        let text = session.gettext(self.message.as_deref().unwrap_or(DEFAULT_UPGRADE_MESSAGE), &[]);
        session.end_conversation(Some(Message::text(text))).await?;
        Ok(Flow::Stop)
    }
}

#[async_trait]
impl Middleware<Session> for DialogVersion {
    async fn handle(&self, session: &mut Session) -> Result<Flow> {
        let stored = session.state().version;
        if !session.state().is_empty() && stored.floor() != self.version.floor() {
            info!(stored, current = self.version, "dialog version changed; ending conversation");
            return self.restart(session).await;
        }
        if let Some(command) = &self.reset_command {
            if command.is_match(&session.message.text) {
                info!("reset command received; ending conversation");
                return self.restart(session).await;
            }
        }
        session.set_version(self.version);
        Ok(Flow::Continue)
    }

    fn name(&self) -> &str {
        "dialog_version"
    }
}
