//! Console connector: one user chatting with the bot over stdin/stdout.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use dbot_core::{Address, BotError, Connector, ConversationAccount, EventHandler, Message, Result};
use tokio::io::{self, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

pub const CONSOLE_CHANNEL: &str = "console";

type Output = Box<dyn AsyncWrite + Send + Unpin>;

pub struct ConsoleConnector {
    address: Address,
    handler: Mutex<Option<EventHandler>>,
    output: tokio::sync::Mutex<Output>,
}

impl Default for ConsoleConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleConnector {
    /// Connector for user "user" in a fresh conversation, replying on stdout.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Same as [`ConsoleConnector::new`], replying to `output`.
    pub fn with_output(output: Output) -> Self {
        let address = Address {
            bot: Some(dbot_core::ChannelAccount::new("bot")),
            ..Address::new(CONSOLE_CHANNEL, "user")
        }
        .with_conversation(uuid::Uuid::new_v4().to_string());
        Self {
            address,
            handler: Mutex::new(None),
            output: tokio::sync::Mutex::new(output),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Delivers one typed line to the bot. Blank lines are ignored.
    pub async fn process_line(&self, line: &str) -> Result<()> {
        let text = line.trim();
        if text.is_empty() {
            return Ok(());
        }
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| BotError::Connector("console connector has no bot attached".into()))?;
        handler(vec![Message::inbound(self.address.clone(), text)]).await
    }

    /// Reads stdin line by line until EOF or `quit`.
    pub async fn listen(&self) -> Result<()> {
        info!("console connector listening");
        let mut lines = BufReader::new(io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().eq_ignore_ascii_case("quit") {
                break;
            }
            if let Err(err) = self.process_line(&line).await {
                self.write_line(&format!("error: {}", err)).await?;
            }
        }
        info!("console connector stopped");
        Ok(())
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut output = self.output.lock().await;
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Connector for ConsoleConnector {
    fn on_event(&self, handler: EventHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    async fn send(&self, messages: Vec<Message>) -> Result<()> {
        for message in messages {
            if !message.is_message() {
                debug!(message_type = %message.message_type, "console skips non-message");
                continue;
            }
            if !message.text.is_empty() {
                self.write_line(&message.text).await?;
            }
            for attachment in &message.attachments {
                let name = attachment.name.as_deref().unwrap_or(&attachment.content_type);
                self.write_line(&format!("[attachment: {}]", name)).await?;
            }
        }
        Ok(())
    }

    async fn start_conversation(&self, address: &Address) -> Result<Address> {
        let mut address = address.clone();
        address.conversation = Some(ConversationAccount {
            id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        });
        Ok(address)
    }
}
