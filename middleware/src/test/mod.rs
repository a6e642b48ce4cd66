//! Unit test module
//!
//! Middleware unit tests live here, separate from source files.

mod first_run_test;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dbot_core::{
    Address, BatchSink, Dialog, Library, Message, Middleware, PassthroughLocalizer,
    PersistedSession, RecognizeResult, Result, SessionState, StackEntry,
};
use dbot_session::{Session, SessionOptions};
use handler_chain::MiddlewareChain;

#[derive(Default)]
pub(crate) struct Outbox {
    pub sent: Mutex<Vec<Message>>,
}

#[async_trait]
impl BatchSink<Message> for Outbox {
    async fn save(&self, _snapshot: &PersistedSession) -> Result<()> {
        Ok(())
    }

    async fn send(&self, batch: Vec<Message>) -> Result<()> {
        self.sent.lock().unwrap().extend(batch);
        Ok(())
    }
}

impl Outbox {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }
}

/// Dialog that announces itself on begin and on every reply.
pub(crate) struct Announce(pub &'static str);

#[async_trait]
impl Dialog<Session> for Announce {
    async fn begin(&self, session: &mut Session, _args: Option<serde_json::Value>) -> Result<()> {
        session.send_text(self.0);
        Ok(())
    }

    async fn reply_received(&self, session: &mut Session, _result: RecognizeResult) -> Result<()> {
        session.send_text(self.0);
        Ok(())
    }
}

/// Runs one turn through `middleware` over dialogs "/", "welcome", and "upgrade".
pub(crate) async fn run_turn(
    middleware: Arc<dyn Middleware<Session>>,
    prior: Option<SessionState>,
    user_data: dbot_core::DataMap,
    text: &str,
) -> (Session, Arc<Outbox>) {
    let mut lib = Library::new("*");
    lib.register("/", Arc::new(Announce("root"))).unwrap();
    lib.register("welcome", Arc::new(Announce("welcome"))).unwrap();
    lib.register("upgrade", Arc::new(Announce("upgrade"))).unwrap();
    let options = SessionOptions::new(Arc::new(lib), Arc::new(PassthroughLocalizer::default()))
        .with_middleware(MiddlewareChain::new().add_middleware(middleware));
    let outbox = Arc::new(Outbox::default());
    let mut session = Session::new(Arc::new(options), outbox.clone());
    session.user_data = user_data;
    let message = Message::inbound(Address::new("test", "user1").with_conversation("c1"), text);
    session.dispatch(prior, message).await;
    session.idle().await;
    (session, outbox)
}

/// Stored state with `ids` on the stack, built under `version`.
pub(crate) fn stack(ids: &[&str], version: f64) -> SessionState {
    let mut state = SessionState::default();
    for id in ids {
        state.push(StackEntry::new(*id));
    }
    state.version = version;
    state
}
