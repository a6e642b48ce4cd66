//! Transport contract for calls: delivers call notifications, accepts workflows.

use std::sync::Arc;

use async_trait::async_trait;
use dbot_core::{Message, Result};
use futures::future::BoxFuture;

use crate::workflow::Workflow;

/// Callback a call connector invokes with each notification.
pub type CallEventHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[async_trait]
pub trait CallConnector: Send + Sync {
    fn on_event(&self, handler: CallEventHandler);

    /// Delivers the response workflow for the call in `workflow.address`.
    async fn send(&self, workflow: Workflow) -> Result<()>;
}
