//! # dbot-session
//!
//! The chat [`Session`] dispatch engine and the built-in [`Prompts`] dialog.
//!
//! A bot builds one [`SessionOptions`] (dialog library, localizer, global
//! actions, session middleware) and creates a [`Session`] per inbound message.
//! [`system_library`] holds the dialogs every bot gets for free; add it to the
//! bot's root library so `BotBuilder:Prompts` resolves.

pub mod channel;
mod prompt_recognizer;
mod prompts;
mod session;

use std::sync::Arc;

use dbot_core::consts::{dialog_id, library};
use dbot_core::{split_dialog_id, Library, Result};

pub use prompt_recognizer::{
    PromptRecognizeArgs, PromptRecognizer, SimplePromptRecognizer, CHOICE_THRESHOLD,
};
pub use prompts::{default_retry_prompt, ListStyle, Prompt, PromptArgs, PromptOptions, Prompts};
pub use session::{Session, SessionOptions, DEFAULT_BATCH_DELAY};

/// The `BotBuilder` library with the default [`Prompts`] dialog.
pub fn system_library() -> Result<Library<Session>> {
    system_library_with(Prompts::default())
}

/// The `BotBuilder` library with a customized [`Prompts`] dialog.
pub fn system_library_with(prompts: Prompts) -> Result<Library<Session>> {
    let mut lib = Library::new(library::SYSTEM);
    lib.register(split_dialog_id(dialog_id::PROMPTS).1, Arc::new(prompts))?;
    Ok(lib)
}
