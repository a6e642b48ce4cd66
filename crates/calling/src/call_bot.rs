//! [`UniversalCallBot`]: receives call notifications, routes them through a
//! [`CallSession`], and persists call state between notifications.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use dbot_core::{
    BatchSink, BotError, BotEvent, EventBus, Flow, Library, Localizer, Message, Middleware,
    PassthroughLocalizer, PersistedSession, Result, UserLookup,
};
use handler_chain::MiddlewareChain;
use serde_json::Value;
use storage::{BotStorage, BotStorageData, MemoryBotStorage, StorageContext};
use tracing::{debug, info, instrument, warn};

use crate::call_session::{CallSession, CallSessionOptions, DEFAULT_BATCH_DELAY};
use crate::connector::{CallConnector, CallEventHandler};
use crate::workflow::Workflow;

#[derive(Debug, Clone)]
pub struct CallBotSettings {
    pub persist_user_data: bool,
    pub persist_conversation_data: bool,
    /// Dialog a new call starts in.
    pub default_dialog_id: String,
    pub default_dialog_args: Option<Value>,
    pub dialog_error_message: Option<String>,
    pub auto_batch_delay: Duration,
}

impl Default for CallBotSettings {
    fn default() -> Self {
        Self {
            persist_user_data: true,
            persist_conversation_data: false,
            default_dialog_id: "/".to_string(),
            default_dialog_args: None,
            dialog_error_message: None,
            auto_batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

pub struct UniversalCallBot {
    connector: Arc<dyn CallConnector>,
    settings: CallBotSettings,
    library: Arc<Library<CallSession>>,
    storage: Arc<dyn BotStorage>,
    localizer: Arc<dyn Localizer>,
    lookup: Option<Arc<dyn UserLookup>>,
    receive_middleware: MiddlewareChain<Message>,
    send_middleware: MiddlewareChain<Workflow>,
    session_middleware: MiddlewareChain<CallSession>,
    events: EventBus,
}

impl UniversalCallBot {
    /// Bot over `library` with in-memory storage and untranslated prompts.
    pub fn new(connector: Arc<dyn CallConnector>, library: Library<CallSession>) -> Self {
        Self {
            connector,
            settings: CallBotSettings::default(),
            library: Arc::new(library),
            storage: Arc::new(MemoryBotStorage::new()),
            localizer: Arc::new(PassthroughLocalizer::default()),
            lookup: None,
            receive_middleware: MiddlewareChain::new(),
            send_middleware: MiddlewareChain::new(),
            session_middleware: MiddlewareChain::new(),
            events: EventBus::default(),
        }
    }

    pub fn with_settings(mut self, settings: CallBotSettings) -> Self {
        self.settings = settings;
        self
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

    pub fn use_receive(mut self, middleware: Arc<dyn Middleware<Message>>) -> Self {
        self.receive_middleware.push(middleware);
        self
    }

    pub fn use_send(mut self, middleware: Arc<dyn Middleware<Workflow>>) -> Self {
        self.send_middleware.push(middleware);
        self
    }

    pub fn use_session(mut self, middleware: Arc<dyn Middleware<CallSession>>) -> Self {
        self.session_middleware.push(middleware);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn library(&self) -> &Library<CallSession> {
        &self.library
    }

    /// Starts taking notifications from the connector.
    pub fn listen(self) -> Arc<Self> {
        let bot = Arc::new(self);
        let weak: Weak<Self> = Arc::downgrade(&bot);
        let handler: CallEventHandler = Arc::new(move |message: Message| -> BoxFuture<'static, Result<()>> {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(bot) => bot.receive(message).await,
                    None => Err(BotError::Connector("call bot was dropped".into())),
                }
            })
        });
        bot.connector.on_event(handler);
        info!("call bot listening");
        bot
    }

    /// Handles one call notification end to end: lookup, middleware, load, dispatch, flush.
    #[instrument(skip(self, message), fields(event = %message.message_type))]
    pub async fn receive(self: &Arc<Self>, mut message: Message) -> Result<()> {
        self.events.emit(BotEvent::LookupUser(message.address.clone()));
        let user = match &self.lookup {
            Some(lookup) => lookup.lookup_user(&message.address).await?,
            None => None,
        };
        message.user = Some(user.unwrap_or_else(|| message.address.user.clone()));

        self.events.emit(BotEvent::Receive(message.clone()));
        if self.receive_middleware.run_tolerant(&mut message).await == Flow::Stop {
            debug!("receive middleware consumed the notification");
            return Ok(());
        }
        self.events.emit(BotEvent::Incoming(message.clone()));

        let mut context = StorageContext::for_address(
            &message.address,
            self.settings.persist_user_data,
            self.settings.persist_conversation_data,
        );
        if let Some(user) = &message.user {
            context.user_id = user.id.clone();
        }
        self.events.emit(BotEvent::GetStorageData {
            user_id: context.user_id.clone(),
            conversation_id: context.conversation_id.clone(),
        });
        let loaded = self.storage.get_data(&context).await?;
        let (data, state) = loaded.into_session();

        let sink = Arc::new(StorageWorkflowSink {
            bot: self.clone(),
            context,
        });
        let mut session = CallSession::new(self.session_options(), sink);
        session.user_data = data.user_data;
        session.conversation_data = data.conversation_data;
        session.private_conversation_data = data.private_conversation_data;

        self.events.emit(BotEvent::Routing(message.address.clone()));
        session.dispatch(state, message).await;
        session.idle().await;
        Ok(())
    }

    fn session_options(&self) -> Arc<CallSessionOptions> {
        let mut options = CallSessionOptions::new(self.library.clone(), self.localizer.clone())
            .with_middleware(self.session_middleware.clone())
            .with_default_dialog(
                self.settings.default_dialog_id.clone(),
                self.settings.default_dialog_args.clone(),
            )
            .with_batch_delay(self.settings.auto_batch_delay)
            .with_events(self.events.clone());
        if let Some(message) = &self.settings.dialog_error_message {
            options = options.with_error_message(message.clone());
        }
        Arc::new(options)
    }

    /// Runs the send middleware and hands the workflow to the connector.
    pub async fn send(&self, mut workflow: Workflow) -> Result<()> {
        if self.send_middleware.run_tolerant(&mut workflow).await == Flow::Stop {
            debug!("send middleware consumed the workflow");
            return Ok(());
        }
        self.connector.send(workflow).await
    }
}

/// Saves call state to the bot's storage and sends workflows through the bot.
struct StorageWorkflowSink {
    bot: Arc<UniversalCallBot>,
    context: StorageContext,
}

#[async_trait]
impl BatchSink<Workflow> for StorageWorkflowSink {
    async fn save(&self, snapshot: &PersistedSession) -> Result<()> {
        self.bot.events.emit(BotEvent::SaveStorageData {
            user_id: self.context.user_id.clone(),
            conversation_id: self.context.conversation_id.clone(),
        });
        let data = BotStorageData::from_snapshot(snapshot)?;
        self.bot.storage.save_data(&self.context, &data).await?;
        Ok(())
    }

    async fn send(&self, batch: Vec<Workflow>) -> Result<()> {
        for workflow in batch {
            if let Err(err) = self.bot.send(workflow).await {
                warn!(error = %err, "call workflow delivery failed");
                return Err(err);
            }
        }
        Ok(())
    }
}
