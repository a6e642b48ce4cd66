//! Connector contract: the transport that delivers inbound events and accepts outbound batches.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Address, ChannelAccount, Message};

/// Callback a connector invokes with inbound events.
pub type EventHandler = Arc<dyn Fn(Vec<Message>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Installs the handler the connector calls for every inbound batch.
    fn on_event(&self, handler: EventHandler);

    /// Delivers an outbound batch. Every message carries its own address.
    async fn send(&self, messages: Vec<Message>) -> Result<()>;

    /// Creates a conversation for a proactive message and returns the completed address.
    async fn start_conversation(&self, address: &Address) -> Result<Address>;
}

/// Maps a channel address to the bot's own user record before routing.
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// `None` keeps the address's user.
    async fn lookup_user(&self, address: &Address) -> Result<Option<ChannelAccount>>;
}
