//! Well-known identifiers shared by every crate in the runtime.

/// Agent name stamped on inbound and outbound events.
pub const AGENT: &str = "dbot";

/// Separator between library name and dialog id ("library:dialog").
pub const NAMESPACE_SEPARATOR: char = ':';

/// Prefix of utterances produced by button clicks that invoke an action directly.
pub const ACTION_PREFIX: &str = "action?";

pub mod library {
    /// Library that bot-level dialogs are registered in.
    pub const DEFAULT: &str = "*";
    /// Library holding built-in dialogs and localized system strings.
    pub const SYSTEM: &str = "BotBuilder";
}

pub mod message_type {
    pub const MESSAGE: &str = "message";
    pub const TYPING: &str = "typing";
    pub const CONVERSATION_UPDATE: &str = "conversationUpdate";
}

pub mod data {
    pub const SESSION_STATE: &str = "BotBuilder.Data.SessionState";
    pub const PREFERRED_LOCALE: &str = "BotBuilder.Data.PreferredLocale";
    pub const INTENT: &str = "BotBuilder.Data.Intent";
    pub const WATERFALL_STEP: &str = "BotBuilder.Data.WaterfallStep";
    pub const FIRST_RUN_VERSION: &str = "BotBuilder.Data.FirstRunVersion";
}

pub mod dialog_id {
    pub const PROMPTS: &str = "BotBuilder:Prompts";
}

pub mod intents {
    /// Handler id used when no recognized intent has a handler.
    pub const DEFAULT: &str = "default";
}

/// Message sent when a turn fails and no custom error message is configured.
pub const DEFAULT_ERROR_MESSAGE: &str = "Oops. Something went wrong and we need to start over.";
