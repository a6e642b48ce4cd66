//! The demo bot: greets users, takes pizza orders, and answers "help" anywhere.

use std::sync::Arc;

use anyhow::Result;
use dbot_core::Library;
use dbot_dialogs::{
    ActionSet, IntentAction, IntentDialog, IntentRecognizerSetOptions, StepResult, Waterfall,
};
use dbot_session::{PromptOptions, Prompts, Session};
use regex::Regex;
use serde_json::Value;

pub const DEMO_VERSION: f64 = 1.0;

const HELP_TEXT: &str =
    "Say 'hi' to introduce yourself, 'order' for a pizza, 'bye' to end the chat, or 'quit' to exit.";

/// Dialogs of the demo bot, registered in the default library.
pub fn demo_library() -> Result<Library<Session>> {
    let root = IntentDialog::new(IntentRecognizerSetOptions::default())
        .matches_regex(Regex::new(r"(?i)^(hi|hello)\b")?, greet())?
        .matches_regex(
            Regex::new(r"(?i)\b(order|pizza)\b")?,
            IntentAction::begin_dialog("order", None),
        )?
        .on_default(Waterfall::new().step(|s: &mut Session, _args| {
            Box::pin(async move {
                s.send_text("I can say hello or take a pizza order. Type 'help' for more.");
                Ok(StepResult::Wait)
            })
        }));

    let mut lib = Library::new("*");
    lib.register("/", Arc::new(root))?;
    lib.register("order", Arc::new(order()))?;
    lib.register("help", Arc::new(help()))?;
    lib.register("welcome", Arc::new(welcome()))?;
    Ok(lib)
}

/// Actions available whatever dialog is active.
pub fn demo_actions() -> Result<ActionSet> {
    Ok(ActionSet::new()
        .begin_dialog_action("help", "*:help", Some(Regex::new(r"(?i)^help$")?))
        .end_conversation_action(
            "goodbye",
            Some("Goodbye!"),
            Some(Regex::new(r"(?i)^(bye|goodbye)$")?),
        ))
}

fn greet() -> Waterfall<Session> {
    Waterfall::new()
        .step(|s: &mut Session, _args| {
            Box::pin(async move {
                let known = s.user_data.get("name").and_then(Value::as_str).map(str::to_string);
                match known {
                    Some(name) => {
                        s.send_text(&format!("Hi again, {}!", name));
                    }
                    None => {
                        Prompts::text(s, "Hello! What's your name?", PromptOptions::default())
                            .await?;
                    }
                }
                Ok(StepResult::Wait)
            })
        })
        .step(|s: &mut Session, args| {
            Box::pin(async move {
                if let Some(name) = args.response().and_then(Value::as_str) {
                    s.user_data.insert("name".into(), Value::String(name.to_string()));
                    s.send_text(&format!("Nice to meet you, {}!", name));
                }
                Ok(StepResult::Wait)
            })
        })
}

fn order() -> Waterfall<Session> {
    Waterfall::new()
        .step(|s: &mut Session, _args| {
            Box::pin(async move {
                Prompts::choice(s, "What size?", "Small|Medium|Large", PromptOptions::default())
                    .await?;
                Ok(StepResult::Wait)
            })
        })
        .step(|s: &mut Session, args| {
            Box::pin(async move {
                let size = args
                    .response()
                    .and_then(|r| r.get("entity"))
                    .and_then(Value::as_str)
                    .unwrap_or("Medium")
                    .to_string();
                s.dialog_data_mut()
                    .insert("size".into(), Value::String(size.clone()));
                let question = format!("Order a {} pizza?", size.to_lowercase());
                Prompts::confirm(s, question, PromptOptions::default()).await?;
                Ok(StepResult::Wait)
            })
        })
        .step(|s: &mut Session, args| {
            Box::pin(async move {
                let size = s
                    .dialog_data()
                    .get("size")
                    .and_then(Value::as_str)
                    .unwrap_or("Medium")
                    .to_lowercase();
                if args.response().and_then(Value::as_bool) == Some(true) {
                    s.send_text(&format!("Your {} pizza is on its way.", size));
                } else {
                    s.send_text("No problem, the order is cancelled.");
                }
                s.end_dialog().await?;
                Ok(StepResult::Wait)
            })
        })
}

fn help() -> Waterfall<Session> {
    Waterfall::new().step(|s: &mut Session, _args| {
        Box::pin(async move {
            s.send_text(HELP_TEXT);
            s.end_dialog().await?;
            Ok(StepResult::Wait)
        })
    })
}

fn welcome() -> Waterfall<Session> {
    Waterfall::new().step(|s: &mut Session, _args| {
        Box::pin(async move {
            s.send_text("Welcome to the demo bot!");
            s.send_text(HELP_TEXT);
            s.end_dialog().await?;
            Ok(StepResult::Wait)
        })
    })
}
