//! [`UniversalBot`]: the chat bot runtime.
//!
//! Connectors deliver inbound messages; each message passes the user lookup and
//! the receive middleware, gets its stored data loaded, and is dispatched through
//! a fresh [`Session`]. Whatever the session flushes is saved back to storage and
//! then delivered through the send middleware to the connector of its channel.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use chrono::{DateTime, Utc};
use dbot_core::consts::{self, message_type};
use dbot_core::{
    Address, BatchSink, BotError, BotEvent, Connector, EventBus, EventHandler, Flow, Library,
    Localizer, Message, Middleware, PersistedSession, Result, UserLookup,
};
use dbot_dialogs::ActionSet;
use dbot_localizer::DefaultLocalizer;
use dbot_session::{system_library, Session, SessionOptions};
use futures::stream::{self, StreamExt};
use handler_chain::MiddlewareChain;
use serde_json::Value;
use storage::{BotStorage, BotStorageData, MemoryBotStorage, StorageContext};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::settings::BotSettings;

/// Channel id of the connector used when no connector is registered for a channel.
pub const DEFAULT_CONNECTOR: &str = "*";

pub struct UniversalBot {
    settings: BotSettings,
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
    library: Arc<Library<Session>>,
    actions: Option<Arc<ActionSet>>,
    storage: Arc<dyn BotStorage>,
    localizer: Arc<dyn Localizer>,
    lookup: Option<Arc<dyn UserLookup>>,
    receive_middleware: MiddlewareChain<Message>,
    send_middleware: MiddlewareChain<Message>,
    session_middleware: MiddlewareChain<Session>,
    events: EventBus,
}

impl UniversalBot {
    /// Bot over `library` (the system library is added) with in-memory storage
    /// and a localizer reading the bot's and libraries' locale files.
    pub fn new(mut library: Library<Session>, settings: BotSettings) -> Result<Self> {
        if let Some(path) = &settings.locale_path {
            library.set_locale_path(path.clone());
        }
        library.add_library(Arc::new(system_library()?));
        let localizer = DefaultLocalizer::new(library.locale_paths(), &settings.default_locale);
        Ok(Self {
            settings,
            connectors: RwLock::new(HashMap::new()),
            library: Arc::new(library),
            actions: None,
            storage: Arc::new(MemoryBotStorage::new()),
            localizer: Arc::new(localizer),
            lookup: None,
            receive_middleware: MiddlewareChain::new(),
            send_middleware: MiddlewareChain::new(),
            session_middleware: MiddlewareChain::new(),
            events: EventBus::default(),
        })
    }

    pub fn with_storage(mut self, storage: Arc<dyn BotStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn with_user_lookup(mut self, lookup: Arc<dyn UserLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Global actions, available whatever dialog is active.
    pub fn with_actions(mut self, actions: ActionSet) -> Self {
        self.actions = Some(Arc::new(actions));
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn use_receive(mut self, middleware: Arc<dyn Middleware<Message>>) -> Self {
        self.receive_middleware.push(middleware);
        self
    }

    pub fn use_send(mut self, middleware: Arc<dyn Middleware<Message>>) -> Self {
        self.send_middleware.push(middleware);
        self
    }

    pub fn use_session(mut self, middleware: Arc<dyn Middleware<Session>>) -> Self {
        self.session_middleware.push(middleware);
        self
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    pub fn library(&self) -> &Library<Session> {
        &self.library
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers `connector` for `channel_id` and starts taking its messages.
    pub async fn connector(self: &Arc<Self>, channel_id: &str, connector: Arc<dyn Connector>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handler: EventHandler = Arc::new(move |messages: Vec<Message>| -> BoxFuture<'static, Result<()>> {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(bot) => bot.receive(messages).await,
                    None => Err(BotError::Connector("bot was dropped".into())),
                }
            })
        });
        connector.on_event(handler);
        info!(channel = channel_id, "connector registered");
        self.connectors
            .write()
            .await
            .insert(channel_id.to_string(), connector);
    }

    /// Connector for `channel_id`, else the default connector.
    pub async fn find_connector(&self, channel_id: &str) -> Option<Arc<dyn Connector>> {
        let connectors = self.connectors.read().await;
        connectors
            .get(channel_id)
            .or_else(|| connectors.get(DEFAULT_CONNECTOR))
            .cloned()
    }

    /// Processes inbound messages, at most `process_limit` at a time.
    ///
    /// Every failure is reported on the event bus; the first one is returned.
    pub async fn receive(self: &Arc<Self>, messages: Vec<Message>) -> Result<()> {
        let results: Vec<Result<()>> = stream::iter(messages)
            .map(|message| self.receive_one(message))
            .buffer_unordered(self.settings.process_limit.max(1))
            .collect()
            .await;
        self.first_error(results)
    }

    #[instrument(skip(self, message), fields(channel = %message.address.channel_id))]
    async fn receive_one(self: &Arc<Self>, mut message: Message) -> Result<()> {
        message.agent = consts::AGENT.to_string();
        if message.message_type.is_empty() {
            message.message_type = message_type::MESSAGE.to_string();
        }
        message.user = Some(self.lookup_user(&message.address).await?);

        self.events.emit(BotEvent::Receive(message.clone()));
        if self.receive_middleware.run_tolerant(&mut message).await == Flow::Stop {
            debug!("receive middleware consumed the message");
            return Ok(());
        }
        if !message.is_message() {
            self.events.emit(BotEvent::Event(message));
            return Ok(());
        }
        self.events.emit(BotEvent::Incoming(message.clone()));

        let context = self.storage_context(&message, self.settings.persist_user_data);
        let (dialog_id, args) = (
            self.settings.default_dialog_id.clone(),
            self.settings.default_dialog_args.clone(),
        );
        self.route(context, message, dialog_id, args, false).await
    }

    /// Starts `dialog_id` for the user at `address`, discarding any stack in progress.
    pub async fn begin_dialog(
        self: &Arc<Self>,
        address: Address,
        dialog_id: &str,
        args: Option<Value>,
    ) -> Result<()> {
        let user = self.lookup_user(&address).await?;
        let address = self.ensure_conversation(address).await?;
        let message = Message {
            source: address.channel_id.clone(),
            address,
            user: Some(user),
            ..Default::default()
        };
        info!(dialog_id, "bot.begin_dialog");
        let context = self.storage_context(&message, self.settings.persist_user_data);
        self.route(context, message, dialog_id.to_string(), args, true)
            .await
    }

    async fn route(
        self: &Arc<Self>,
        context: StorageContext,
        message: Message,
        dialog_id: String,
        args: Option<Value>,
        new_stack: bool,
    ) -> Result<()> {
        self.events.emit(BotEvent::GetStorageData {
            user_id: context.user_id.clone(),
            conversation_id: context.conversation_id.clone(),
        });
        let (data, state) = self.storage.get_data(&context).await?.into_session();
        let state = if new_stack { None } else { state };

        let sink = Arc::new(StorageSink {
            bot: self.clone(),
            context,
        });
        let mut session = Session::new(self.session_options(dialog_id, args), sink);
        session.user_data = data.user_data;
        session.conversation_data = data.conversation_data;
        session.private_conversation_data = data.private_conversation_data;

        self.events.emit(BotEvent::Routing(message.address.clone()));
        session.dispatch(state, message).await;
        session.idle().await;
        Ok(())
    }

    fn session_options(&self, dialog_id: String, args: Option<Value>) -> Arc<SessionOptions> {
        let mut options = SessionOptions::new(self.library.clone(), self.localizer.clone())
            .with_middleware(self.session_middleware.clone())
            .with_default_dialog(dialog_id, args)
            .with_batch_delay(self.settings.auto_batch_delay)
            .with_events(self.events.clone());
        options.actions = self.actions.clone();
        if let Some(message) = &self.settings.dialog_error_message {
            options = options.with_error_message(message.clone());
        }
        Arc::new(options)
    }

    /// Runs outbound messages through the send middleware and delivers them,
    /// creating conversations for messages addressed to a user only.
    pub async fn send(&self, messages: Vec<Message>) -> Result<()> {
        let mut by_channel: Vec<(String, Vec<Message>)> = Vec::new();
        for mut message in messages {
            message.address = self.ensure_conversation(message.address).await?;
            self.events.emit(BotEvent::Send(message.clone()));
            if self.send_middleware.run_tolerant(&mut message).await == Flow::Stop {
                debug!("send middleware consumed an outbound message");
                continue;
            }
            self.events.emit(BotEvent::Outgoing(message.clone()));
            let channel = message.address.channel_id.clone();
            match by_channel.iter_mut().find(|(c, _)| *c == channel) {
                Some((_, batch)) => batch.push(message),
                None => by_channel.push((channel, vec![message])),
            }
        }

        for (channel, batch) in by_channel {
            let connector = self
                .find_connector(&channel)
                .await
                .ok_or_else(|| BotError::Connector(format!("Invalid channelId='{}'", channel)))?;
            debug!(channel = %channel, count = batch.len(), "delivering batch");
            connector.send(batch).await?;
        }
        Ok(())
    }

    /// When the user at `address` last talked to the bot in that conversation.
    pub async fn is_in_conversation(&self, address: &Address) -> Result<Option<DateTime<Utc>>> {
        let user = self.lookup_user(address).await?;
        let mut context = StorageContext::for_address(address, false, false);
        context.user_id = user.id;
        self.events.emit(BotEvent::GetStorageData {
            user_id: context.user_id.clone(),
            conversation_id: context.conversation_id.clone(),
        });
        let (_, state) = self.storage.get_data(&context).await?.into_session();
        Ok(state
            .filter(|s| s.last_access > 0)
            .and_then(|s| DateTime::from_timestamp_millis(s.last_access)))
    }

    async fn lookup_user(&self, address: &Address) -> Result<dbot_core::ChannelAccount> {
        self.events.emit(BotEvent::LookupUser(address.clone()));
        let found = match &self.lookup {
            Some(lookup) => lookup.lookup_user(address).await?,
            None => None,
        };
        Ok(found.unwrap_or_else(|| address.user.clone()))
    }

    async fn ensure_conversation(&self, address: Address) -> Result<Address> {
        if address.conversation.is_some() {
            return Ok(address);
        }
        let connector = self.find_connector(&address.channel_id).await.ok_or_else(|| {
            BotError::Connector(format!("Invalid channelId='{}'", address.channel_id))
        })?;
        connector.start_conversation(&address).await
    }

    fn storage_context(&self, message: &Message, persist_user_data: bool) -> StorageContext {
        let mut context = StorageContext::for_address(
            &message.address,
            persist_user_data,
            self.settings.persist_conversation_data,
        );
        context.user_id = message.user_id().to_string();
        context
    }

    fn first_error(&self, results: Vec<Result<()>>) -> Result<()> {
        let mut first = None;
        for err in results.into_iter().filter_map(|r| r.err()) {
            warn!(error = %err, "receive failed");
            self.events.emit_error(err.clone());
            first.get_or_insert(err);
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Saves a session's data to the bot's storage and delivers its messages through the bot.
struct StorageSink {
    bot: Arc<UniversalBot>,
    context: StorageContext,
}

#[async_trait]
impl BatchSink<Message> for StorageSink {
    async fn save(&self, snapshot: &PersistedSession) -> Result<()> {
        self.bot.events.emit(BotEvent::SaveStorageData {
            user_id: self.context.user_id.clone(),
            conversation_id: self.context.conversation_id.clone(),
        });
        let data = BotStorageData::from_snapshot(snapshot)?;
        self.bot.storage.save_data(&self.context, &data).await?;
        Ok(())
    }

    async fn send(&self, batch: Vec<Message>) -> Result<()> {
        self.bot.send(batch).await
    }
}
