//! CLI parser and settings loading.

use anyhow::{Context, Result};
use bot_runtime::BotSettings;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dbot")]
#[command(about = "Dialog bot CLI: chat with the demo bot on the console", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Append logs to this file as well as stdout.
    #[arg(long, global = true, env = "DBOT_LOG_FILE")]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo bot on stdin/stdout (settings from DBOT_* env vars).
    Run(RunArgs),
    /// Print every dialog id the demo bot registers.
    ListDialogs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// SQLite database for bot state; in-memory storage when unset.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Dialog new conversations start in.
    #[arg(long)]
    pub dialog: Option<String>,

    /// Locale used when the user has none.
    #[arg(long)]
    pub locale: Option<String>,
}

/// Settings from the environment, with command-line overrides applied.
pub fn load_settings(args: &RunArgs) -> Result<BotSettings> {
    let mut settings = BotSettings::from_env().context("Load bot settings from DBOT_* variables")?;
    if let Some(dialog) = &args.dialog {
        settings.default_dialog_id = dialog.clone();
    }
    if let Some(locale) = &args.locale {
        settings.default_locale = locale.clone();
    }
    Ok(settings)
}
