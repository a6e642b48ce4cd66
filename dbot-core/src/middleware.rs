//! Middleware contract shared by the receive, send, and session pipelines.

use async_trait::async_trait;

use crate::error::Result;

/// What the pipeline does after a middleware stage returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the next stage (and eventually the engine).
    Continue,
    /// End the pipeline here; the event is considered handled.
    Stop,
}

/// One stage of an ordered pipeline over `T` (an inbound [`crate::Message`],
/// an outbound message, or a session).
#[async_trait]
pub trait Middleware<T: Send>: Send + Sync {
    async fn handle(&self, target: &mut T) -> Result<Flow>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
