//! Routes users through an onboarding dialog the first time they talk to the bot.

use async_trait::async_trait;
use dbot_core::consts::data::FIRST_RUN_VERSION;
use dbot_core::{Flow, Middleware, Result};
use dbot_session::Session;
use serde_json::{json, Value};
use tracing::info;

/// Session middleware that begins `dialog_id` for users who have not seen the
/// current major version, or `upgrade_dialog_id` after a minor version bump.
///
/// Only applies when no dialog is active. The version is recorded in user data
/// under `BotBuilder.Data.FirstRunVersion` when the dialog is started.
pub struct FirstRun {
    version: f64,
    dialog_id: String,
    upgrade_dialog_id: Option<String>,
}

impl FirstRun {
    pub fn new(version: f64, dialog_id: impl Into<String>) -> Self {
        Self {
            version,
            dialog_id: dialog_id.into(),
            upgrade_dialog_id: None,
        }
    }

    pub fn with_upgrade_dialog(mut self, dialog_id: impl Into<String>) -> Self {
        self.upgrade_dialog_id = Some(dialog_id.into());
        self
    }

    /// Dialog to start for a user last onboarded at `seen`, if any.
    fn dialog_for(&self, seen: f64) -> Option<&str> {
        if seen == 0.0 || seen.floor() < self.version.floor() {
            return Some(self.dialog_id.as_str());
        }
        match &self.upgrade_dialog_id {
            Some(id) if seen < self.version => Some(id.as_str()),
            _ => None,
        }
    }
}

#[async_trait]
impl Middleware<Session> for FirstRun {
    async fn handle(&self, session: &mut Session) -> Result<Flow> {
        if !session.state().is_empty() {
            return Ok(Flow::Continue);
        }
        let seen = session
            .user_data
            .get(FIRST_RUN_VERSION)
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let Some(dialog_id) = self.dialog_for(seen).map(str::to_string) else {
            return Ok(Flow::Continue);
        };
        info!(seen, current = self.version, dialog_id = %dialog_id, "first run");
        session
            .user_data
            .insert(FIRST_RUN_VERSION.to_string(), json!(self.version));
        session
            .begin_dialog(&dialog_id, Some(json!({ "version": self.version })))
            .await?;
        Ok(Flow::Stop)
    }

    fn name(&self) -> &str {
        "first_run"
    }
}
