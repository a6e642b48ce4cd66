//! # dbot-cli
//!
//! Argument parsing, settings loading, and the demo bot the `dbot` binary runs.

pub mod cli;
pub mod demo;

use std::sync::Arc;

use anyhow::{Context, Result};
use bot_runtime::{BotSettings, UniversalBot};
use middleware::{DialogVersion, FirstRun, LoggingMiddleware};
use regex::Regex;
use storage::SqliteBotStorage;
use tracing::info;

pub use cli::{load_settings, Cli, Commands, RunArgs};
pub use demo::{demo_actions, demo_library, DEMO_VERSION};

/// The demo bot over SQLite when `database_url` is set, in-memory storage otherwise.
pub async fn build_bot(settings: BotSettings, database_url: Option<&str>) -> Result<UniversalBot> {
    let mut bot = UniversalBot::new(demo_library()?, settings)
        .context("Create bot")?
        .with_actions(demo_actions()?)
        .use_receive(Arc::new(LoggingMiddleware::inbound()))
        .use_send(Arc::new(LoggingMiddleware::outbound()))
        .use_session(Arc::new(
            DialogVersion::new(DEMO_VERSION).with_reset_command(Regex::new(r"(?i)^/reset$")?),
        ))
        .use_session(Arc::new(FirstRun::new(DEMO_VERSION, "welcome")));

    if let Some(url) = database_url {
        info!(database_url = %url, "using SQLite bot storage");
        let storage = SqliteBotStorage::new(url)
            .await
            .with_context(|| format!("Open SQLite storage at {}", url))?;
        bot = bot.with_storage(Arc::new(storage));
    }
    Ok(bot)
}
