//! # dbot-dialogs
//!
//! Building blocks for conversational logic on top of [`dbot_core::Dialog`]:
//!
//! - [`IntentRecognizerSet`] / [`RegExpRecognizer`] – score utterances against intents
//! - [`IntentDialog`] – dispatch to per-intent handlers
//! - [`Waterfall`] – step sequences driven by an index in dialog data
//! - [`ActionSet`] – global or dialog-scoped interrupt actions
//! - [`EntityRecognizer`] – numbers, yes/no, fuzzy choices, times

mod action_set;
mod entity_recognizer;
mod intent_dialog;
mod intent_recognizer_set;
mod regexp_recognizer;
mod waterfall;

pub use action_set::{ActionKind, ActionSet, NamedAction};
pub use entity_recognizer::{Choices, EntityRecognizer, FoundChoice, TIME_ENTITY};
pub use intent_dialog::{BeginHandler, IntentAction, IntentDialog, RecognizeMode};
pub use intent_recognizer_set::{
    IntentRecognizer, IntentRecognizerSet, IntentRecognizerSetOptions, RecognizeOrder,
};
pub use regexp_recognizer::RegExpRecognizer;
pub use waterfall::{StepArgs, StepFn, StepResult, Waterfall};
