//! Bot configuration, with defaults and `DBOT_*` environment overrides.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dbot_core::{BotError, Result};
use dbot_session::DEFAULT_BATCH_DELAY;
use serde_json::Value;

/// How a [`crate::UniversalBot`] processes, persists, and starts conversations.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Inbound messages processed concurrently per receive call.
    pub process_limit: usize,
    pub persist_user_data: bool,
    pub persist_conversation_data: bool,
    pub auto_batch_delay: Duration,
    pub default_dialog_id: String,
    pub default_dialog_args: Option<Value>,
    pub dialog_error_message: Option<String>,
    pub default_locale: String,
    /// Directory holding the bot's `<locale>/index.json` files.
    pub locale_path: Option<PathBuf>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            process_limit: 4,
            persist_user_data: true,
            persist_conversation_data: false,
            auto_batch_delay: DEFAULT_BATCH_DELAY,
            default_dialog_id: "/".to_string(),
            default_dialog_args: None,
            dialog_error_message: None,
            default_locale: "en".to_string(),
            locale_path: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BotError::Config(format!("{} has an invalid value: {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}

impl BotSettings {
    /// Defaults overridden by `DBOT_PROCESS_LIMIT`, `DBOT_PERSIST_USER_DATA`,
    /// `DBOT_PERSIST_CONVERSATION_DATA`, `DBOT_AUTO_BATCH_DELAY_MS`,
    /// `DBOT_DEFAULT_DIALOG`, `DBOT_DIALOG_ERROR_MESSAGE`, `DBOT_DEFAULT_LOCALE`
    /// and `DBOT_LOCALE_PATH`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let process_limit = parse_var("DBOT_PROCESS_LIMIT", defaults.process_limit)?;
        if process_limit == 0 {
            return Err(BotError::Config("DBOT_PROCESS_LIMIT must be at least 1".into()));
        }
        let delay_ms = parse_var(
            "DBOT_AUTO_BATCH_DELAY_MS",
            defaults.auto_batch_delay.as_millis() as u64,
        )?;

        Ok(Self {
            process_limit,
            persist_user_data: parse_var("DBOT_PERSIST_USER_DATA", defaults.persist_user_data)?,
            persist_conversation_data: parse_var(
                "DBOT_PERSIST_CONVERSATION_DATA",
                defaults.persist_conversation_data,
            )?,
            auto_batch_delay: Duration::from_millis(delay_ms),
            default_dialog_id: env::var("DBOT_DEFAULT_DIALOG").unwrap_or(defaults.default_dialog_id),
            default_dialog_args: None,
            dialog_error_message: env::var("DBOT_DIALOG_ERROR_MESSAGE").ok(),
            default_locale: env::var("DBOT_DEFAULT_LOCALE").unwrap_or(defaults.default_locale),
            locale_path: env::var("DBOT_LOCALE_PATH").ok().map(PathBuf::from),
        })
    }
}
