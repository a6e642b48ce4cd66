//! # dbot-calling
//!
//! Voice-call flavor of the dialog runtime. [`CallSession`] keeps the same dialog
//! stack semantics as a chat session, but dialogs answer with call-control
//! actions that are batched into a [`Workflow`] per flush. [`UniversalCallBot`]
//! connects a [`CallConnector`] to storage and the session.

mod call_bot;
mod call_session;
mod connector;
pub mod workflow;

pub use call_bot::{CallBotSettings, UniversalCallBot};
pub use call_session::{CallSession, CallSessionOptions, DEFAULT_BATCH_DELAY};
pub use connector::{CallConnector, CallEventHandler};
pub use workflow::{add_call_control, CallAction, CallState, ModalityType, OperationOutcome, Prompt, Workflow};
