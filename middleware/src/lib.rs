//! Ready-made middleware.
//!
//! - [`LoggingMiddleware`] – logs inbound or outbound messages; always continues
//! - [`DialogVersion`] – session middleware ending conversations built by an older major version
//! - [`FirstRun`] – session middleware sending new users through an onboarding dialog

mod dialog_version;
mod first_run;
mod logging;

#[cfg(test)]
mod test;

pub use dialog_version::DialogVersion;
pub use first_run::FirstRun;
pub use logging::{Direction, LoggingMiddleware};
