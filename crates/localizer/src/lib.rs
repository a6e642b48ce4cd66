//! # dbot-localizer
//!
//! [`DefaultLocalizer`]: loads `<path>/<locale>/<namespace>.json` tables for every library in the
//! bot and resolves message ids with locale fallback. Ships the English system strings used by
//! prompts and error handling.

mod default_localizer;

pub use default_localizer::{fallback_locale, DefaultLocalizer};

/// Built-in English strings of the system library namespace.
pub const SYSTEM_STRINGS_EN: &str = include_str!("../locale/en/BotBuilder.json");
