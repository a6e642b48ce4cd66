//! # dbot-core
//!
//! Core types and traits for the dialog bot runtime: [`Message`] and addressing,
//! the [`Dialog`] capability, the [`Library`] registry, the persisted dialog stack,
//! outbound batching, events, and tracing initialization. Transport-agnostic;
//! used by every other crate in the workspace.

pub mod batch;
pub mod connector;
pub mod consts;
pub mod dialog;
pub mod error;
pub mod events;
pub mod library;
pub mod localizer;
pub mod logger;
pub mod middleware;
pub mod recognize;
pub mod stack;
pub mod types;

pub use batch::{BatchSink, Batcher, PersistedSession};
pub use connector::{Connector, EventHandler, UserLookup};
pub use dialog::{Dialog, DialogSession};
pub use error::{BotError, Result};
pub use events::{BotEvent, EventBus};
pub use library::Library;
pub use localizer::{format_template, Localizer, PassthroughLocalizer};
pub use logger::init_tracing;
pub use middleware::{Flow, Middleware};
pub use recognize::{
    DialogResult, Entity, PromptType, RecognizeContext, RecognizeResult, ResumeReason,
};
pub use stack::{split_dialog_id, DialogTarget, SessionState, StackEntry};
pub use types::{Address, Attachment, ChannelAccount, ConversationAccount, DataMap, Message, Sendable};
