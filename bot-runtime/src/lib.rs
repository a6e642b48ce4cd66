//! # bot-runtime
//!
//! [`UniversalBot`] ties the pieces together: connectors deliver messages, the
//! bot looks up the user, loads stored data, routes through a [`dbot_session::Session`],
//! saves the result and sends replies back out through the right connector.
//! [`ConsoleConnector`] is the built-in stdin/stdout channel.

mod console;
mod settings;
mod universal_bot;

pub use console::{ConsoleConnector, CONSOLE_CHANNEL};
pub use settings::BotSettings;
pub use universal_bot::{UniversalBot, DEFAULT_CONNECTOR};
