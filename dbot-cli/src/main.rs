//! dbot CLI: chat with the demo bot on the console, or list its dialogs.

use std::sync::Arc;

use anyhow::{Context, Result};
use bot_runtime::{ConsoleConnector, CONSOLE_CHANNEL};
use clap::Parser;
use dbot_cli::{build_bot, load_settings, Cli, Commands, RunArgs};
use dbot_core::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            // Chat replies share stdout with the logs; keep the logs quiet unless asked.
            if std::env::var_os("RUST_LOG").is_none() {
                std::env::set_var("RUST_LOG", "warn");
            }
            init_tracing(cli.log_file.as_deref())?;
            run(args).await
        }
        Commands::ListDialogs => list_dialogs(),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let settings = load_settings(&args)?;
    let bot = Arc::new(build_bot(settings, args.database_url.as_deref()).await?);
    let console = Arc::new(ConsoleConnector::new());
    bot.connector(CONSOLE_CHANNEL, console.clone()).await;

    println!("dbot demo: say 'hi' to start, 'quit' to exit.");
    console.listen().await.context("Console connector failed")?;
    Ok(())
}

fn list_dialogs() -> Result<()> {
    let library = dbot_cli::demo_library()?;
    for id in library.dialog_ids() {
        println!("{}:{}", library.name(), id);
    }
    Ok(())
}
