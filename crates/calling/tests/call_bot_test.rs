//! Integration tests for [`dbot_calling::UniversalCallBot`]: connector wiring,
//! state persisted across notifications, and receive middleware.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{call_result, incoming_call, kind};
use dbot_calling::{CallConnector, CallEventHandler, CallSession, UniversalCallBot, Workflow};
use dbot_core::{BotError, Flow, Library, Message, Middleware, Result};
use dbot_dialogs::{StepResult, Waterfall};

#[derive(Default)]
struct FakeConnector {
    handler: Mutex<Option<CallEventHandler>>,
    sent: Mutex<Vec<Workflow>>,
}

impl FakeConnector {
    async fn notify(&self, message: Message) -> Result<()> {
        let handler = self
            .handler
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BotError::Connector("not listening".into()))?;
        handler(message).await
    }

    fn kinds(&self) -> Vec<Vec<&'static str>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|w| w.actions.iter().map(kind).collect())
            .collect()
    }
}

#[async_trait]
impl CallConnector for FakeConnector {
    fn on_event(&self, handler: CallEventHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn send(&self, workflow: Workflow) -> Result<()> {
        self.sent.lock().unwrap().push(workflow);
        Ok(())
    }
}

/// Drops notifications from one blocked caller.
struct BlockCaller;

#[async_trait]
impl Middleware<Message> for BlockCaller {
    async fn handle(&self, message: &mut Message) -> Result<Flow> {
        if message.address.user.id == "caller" {
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

fn two_step_library() -> Library<CallSession> {
    let root = Waterfall::new()
        .step(|s: &mut CallSession, _args| {
            Box::pin(async move {
                s.send_text("Press any key");
                Ok(StepResult::Wait)
            })
        })
        .step(|s: &mut CallSession, _args| {
            Box::pin(async move {
                s.end_dialog_with(dbot_calling::CallAction::say("Thanks")).await?;
                Ok(StepResult::Wait)
            })
        });
    let mut lib = Library::new("*");
    lib.register("/", Arc::new(root)).unwrap();
    lib
}

/// **Test: The call stack survives between notifications through storage.**
///
/// **Setup:** Bot over a fake connector and a two-step root dialog; listening.
/// **Action:** Notify an incoming call, then an operation result.
/// **Expected:** [answer, playPrompt], then [playPrompt, hangup].
#[tokio::test(start_paused = true)]
async fn test_call_state_persists_between_notifications() {
    let connector = Arc::new(FakeConnector::default());
    let _bot = UniversalCallBot::new(connector.clone(), two_step_library()).listen();

    connector.notify(incoming_call()).await.unwrap();
    connector.notify(call_result()).await.unwrap();

    assert_eq!(
        connector.kinds(),
        vec![vec!["answer", "playPrompt"], vec!["playPrompt", "hangup"]]
    );
}

/// **Test: Receive middleware can swallow a notification before routing.**
///
/// **Setup:** Bot with the BlockCaller receive middleware.
/// **Action:** Notify an incoming call from "caller".
/// **Expected:** Nothing is sent.
#[tokio::test(start_paused = true)]
async fn test_receive_middleware_stops_routing() {
    let connector = Arc::new(FakeConnector::default());
    let _bot = UniversalCallBot::new(connector.clone(), two_step_library())
        .use_receive(Arc::new(BlockCaller))
        .listen();

    connector.notify(incoming_call()).await.unwrap();

    assert!(connector.sent.lock().unwrap().is_empty());
}

/// **Test: Notifications after the bot is dropped fail instead of panicking.**
///
/// **Setup:** Listening bot, then dropped.
/// **Action:** Notify an incoming call.
/// **Expected:** Connector error.
#[tokio::test]
async fn test_dropped_bot_rejects_notifications() {
    let connector = Arc::new(FakeConnector::default());
    drop(UniversalCallBot::new(connector.clone(), two_step_library()).listen());

    let err = connector.notify(incoming_call()).await.unwrap_err();

    assert!(matches!(err, BotError::Connector(_)));
}
