use async_trait::async_trait;
use dbot_core::{Flow, Message, Middleware, Result};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Logs every message passing through a receive or send pipeline; always continues.
pub struct LoggingMiddleware {
    direction: Direction,
}

impl LoggingMiddleware {
    pub fn inbound() -> Self {
        Self {
            direction: Direction::Inbound,
        }
    }

    pub fn outbound() -> Self {
        Self {
            direction: Direction::Outbound,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

#[async_trait]
impl Middleware<Message> for LoggingMiddleware {
    #[instrument(skip(self, message))]
    async fn handle(&self, message: &mut Message) -> Result<Flow> {
        let user_id = message.user_id().to_string();
        match self.direction {
            Direction::Inbound => info!(
                channel = %message.address.channel_id,
                user_id = %user_id,
                event = %message.message_type,
                message_content = %message.text,
                "Received message"
            ),
            Direction::Outbound => info!(
                channel = %message.address.channel_id,
                user_id = %user_id,
                event = %message.message_type,
                message_content = %message.text,
                "Sending message"
            ),
        }
        debug!(attachments = message.attachments.len(), "message details");
        Ok(Flow::Continue)
    }

    fn name(&self) -> &str {
        match self.direction {
            Direction::Inbound => "logging.inbound",
            Direction::Outbound => "logging.outbound",
        }
    }
}
