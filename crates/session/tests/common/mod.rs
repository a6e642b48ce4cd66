//! Shared test harness: a recording batch sink and a driver that runs one turn per call,
//! carrying the session state between turns the way storage would.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dbot_core::{
    Address, BatchSink, BotError, DataMap, Dialog, DialogResult, Library, Message,
    PersistedSession, RecognizeContext, RecognizeResult, Result, SessionState,
};
use dbot_localizer::DefaultLocalizer;
use dbot_session::{system_library, Session, SessionOptions};

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<Message>>,
    pub saved: Mutex<Vec<PersistedSession>>,
    pub reject_next_save: Mutex<Option<BotError>>,
}

impl RecordingSink {
    /// Text of every delivered `message` event, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.is_message())
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn last_saved(&self) -> Option<PersistedSession> {
        self.saved.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl BatchSink<Message> for RecordingSink {
    async fn save(&self, snapshot: &PersistedSession) -> Result<()> {
        if let Some(err) = self.reject_next_save.lock().unwrap().take() {
            return Err(err);
        }
        self.saved.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn send(&self, batch: Vec<Message>) -> Result<()> {
        self.sent.lock().unwrap().extend(batch);
        Ok(())
    }
}

pub struct Harness {
    pub options: Arc<SessionOptions>,
    pub sink: Arc<RecordingSink>,
    pub channel: String,
    pub state: Option<SessionState>,
    pub user_data: DataMap,
}

impl Harness {
    pub fn new(root: Library<Session>) -> Self {
        Self::with(root, |o| o)
    }

    /// Harness over `root` (plus the system library) with customized options.
    pub fn with(
        mut root: Library<Session>,
        configure: impl FnOnce(SessionOptions) -> SessionOptions,
    ) -> Self {
        root.add_library(Arc::new(system_library().unwrap()));
        let localizer = Arc::new(DefaultLocalizer::new(root.locale_paths(), "en"));
        let options = configure(SessionOptions::new(Arc::new(root), localizer));
        Self {
            options: Arc::new(options),
            sink: Arc::new(RecordingSink::default()),
            channel: "test".to_string(),
            state: None,
            user_data: DataMap::new(),
        }
    }

    pub fn on_channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn with_stack(mut self, ids: &[&str]) -> Self {
        let mut state = SessionState::default();
        for id in ids {
            state.push(dbot_core::StackEntry::new(*id));
        }
        self.state = Some(state);
        self
    }

    pub fn session(&self) -> Session {
        let mut session = Session::new(self.options.clone(), self.sink.clone());
        session.user_data = self.user_data.clone();
        session
    }

    pub fn message(&self, text: &str) -> Message {
        Message::inbound(
            Address::new(self.channel.as_str(), "user1").with_conversation("conv1"),
            text,
        )
    }

    /// Runs one turn and waits for its flushes.
    pub async fn say(&mut self, text: &str) -> Session {
        let mut session = self.session();
        let message = self.message(text);
        session.dispatch(self.state.take(), message).await;
        session.idle().await;
        self.state = Some(session.state().clone());
        self.user_data = session.user_data.clone();
        session
    }

    pub fn stack(&self) -> Vec<String> {
        self.state
            .as_ref()
            .map(|s| s.callstack.iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default()
    }
}

pub type ResultLog = Arc<Mutex<Vec<DialogResult>>>;

/// Dialog with a fixed self-score that answers every reply with "dialog".
pub struct Scored {
    pub score: f64,
    pub replies: Arc<Mutex<Vec<String>>>,
}

impl Scored {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            replies: Arc::default(),
        }
    }
}

#[async_trait]
impl Dialog<Session> for Scored {
    async fn recognize(&self, _ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        Ok(RecognizeResult::with_score(self.score))
    }

    async fn reply_received(&self, session: &mut Session, _result: RecognizeResult) -> Result<()> {
        self.replies.lock().unwrap().push(session.message.text.clone());
        session.send_text("dialog");
        Ok(())
    }
}

/// Dialog that cancels `target` on every reply.
pub struct Canceler {
    pub target: String,
}

impl Canceler {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
        }
    }
}

#[async_trait]
impl Dialog<Session> for Canceler {
    async fn reply_received(&self, session: &mut Session, _result: RecognizeResult) -> Result<()> {
        session.cancel_dialog(self.target.as_str(), None).await
    }
}
