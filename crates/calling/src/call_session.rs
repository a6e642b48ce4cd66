//! The [`CallSession`]: dialog stack semantics of a chat session, driven by call
//! notifications and answered with call-control workflows.
//!
//! Dialogs speak through play-prompt actions. Every flush goes out as one
//! [`Workflow`]; the session answers the call before the first media action and
//! hangs up (or rejects) when the conversation ends.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dbot_core::consts::{self, data, library};
use dbot_core::{
    format_template, Address, BatchSink, Batcher, BotError, DataMap, Dialog, DialogResult,
    DialogSession, DialogTarget, EventBus, Flow, Library, Localizer, Message, PersistedSession,
    RecognizeResult, Result, SessionState, StackEntry,
};
use handler_chain::MiddlewareChain;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::workflow::{add_call_control, event_type, CallAction, OperationOutcome, Prompt, Workflow};

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(250);

/// Shared configuration for the call sessions of one bot.
pub struct CallSessionOptions {
    pub library: Arc<Library<CallSession>>,
    pub localizer: Arc<dyn Localizer>,
    pub middleware: MiddlewareChain<CallSession>,
    pub dialog_id: String,
    pub dialog_args: Option<Value>,
    pub dialog_error_message: Option<String>,
    pub auto_batch_delay: Duration,
    pub events: EventBus,
}

impl CallSessionOptions {
    pub fn new(library: Arc<Library<CallSession>>, localizer: Arc<dyn Localizer>) -> Self {
        Self {
            library,
            localizer,
            middleware: MiddlewareChain::new(),
            dialog_id: "/".to_string(),
            dialog_args: None,
            dialog_error_message: None,
            auto_batch_delay: DEFAULT_BATCH_DELAY,
            events: EventBus::default(),
        }
    }

    pub fn with_middleware(mut self, middleware: MiddlewareChain<CallSession>) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn with_default_dialog(mut self, dialog_id: impl Into<String>, args: Option<Value>) -> Self {
        self.dialog_id = dialog_id.into();
        self.dialog_args = args;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.dialog_error_message = Some(message.into());
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.auto_batch_delay = delay;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

/// Call being served and whether it has been answered.
#[derive(Debug, Default)]
struct CallControl {
    address: Address,
    answered: bool,
}

/// Wraps each flushed batch into a workflow, adding the answer it needs.
struct CallControlSink {
    inner: Arc<dyn BatchSink<Workflow>>,
    call: Arc<Mutex<CallControl>>,
}

#[async_trait]
impl BatchSink<CallAction> for CallControlSink {
    async fn save(&self, snapshot: &PersistedSession) -> Result<()> {
        self.inner.save(snapshot).await
    }

    async fn send(&self, mut batch: Vec<CallAction>) -> Result<()> {
        let workflow = {
            let mut call = self.call.lock().unwrap_or_else(PoisonError::into_inner);
            call.answered = add_call_control(&mut batch, call.answered, false);
            Workflow::new(call.address.clone(), batch)
        };
        debug!(actions = workflow.actions.len(), "call workflow ready");
        self.inner.send(vec![workflow]).await
    }
}

pub struct CallSession {
    options: Arc<CallSessionOptions>,
    /// Notification being processed this turn.
    pub message: Message,
    pub user_data: DataMap,
    pub conversation_data: DataMap,
    pub private_conversation_data: DataMap,
    state: SessionState,
    scratch: DataMap,
    call: Arc<Mutex<CallControl>>,
    batcher: Batcher<CallAction>,
    in_middleware: bool,
    is_reset: bool,
    msg_sent: bool,
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("address", &self.message.address)
            .field("callstack", &self.state.callstack)
            .finish()
    }
}

impl CallSession {
    /// New session whose workflows go to `sink` after the state is saved.
    pub fn new(options: Arc<CallSessionOptions>, sink: Arc<dyn BatchSink<Workflow>>) -> Self {
        let call = Arc::new(Mutex::new(CallControl::default()));
        let control = Arc::new(CallControlSink {
            inner: sink,
            call: call.clone(),
        });
        let batcher = Batcher::new(control, options.auto_batch_delay, options.events.clone());
        Self {
            options,
            message: Message::default(),
            user_data: DataMap::new(),
            conversation_data: DataMap::new(),
            private_conversation_data: DataMap::new(),
            state: SessionState::default(),
            scratch: DataMap::new(),
            call,
            batcher,
            in_middleware: false,
            is_reset: false,
            msg_sent: false,
        }
    }

    pub fn options(&self) -> &CallSessionOptions {
        &self.options
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_reset(&self) -> bool {
        self.is_reset
    }

    pub fn message_sent(&self) -> bool {
        self.msg_sent
    }

    pub async fn idle(&self) {
        self.batcher.idle().await;
    }

    pub fn dialog_data(&self) -> &DataMap {
        match self.state.current() {
            Some(entry) => &entry.state,
            None => &self.scratch,
        }
    }

    pub fn dialog_data_mut(&mut self) -> &mut DataMap {
        match self.state.current_mut() {
            Some(entry) => &mut entry.state,
            None => &mut self.scratch,
        }
    }

    /// Outcome of the workflow this notification reports on, if any.
    pub fn operation_outcome(&self) -> Option<OperationOutcome> {
        self.message
            .source_event
            .get("operationOutcome")
            .and_then(|o| o.get("outcome").or(Some(o)))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn answered(&self) -> bool {
        self.call.lock().unwrap_or_else(PoisonError::into_inner).answered
    }

    /// Processes a call notification against the stored stack (`None` for a new call).
    pub async fn dispatch(&mut self, prior: Option<SessionState>, message: Message) {
        let now = Utc::now().timestamp_millis();
        self.state = prior.unwrap_or_default();
        self.state.last_access = now;
        self.message = message;
        {
            let mut call = self.call.lock().unwrap_or_else(PoisonError::into_inner);
            call.address = self.message.address.clone();
            call.answered = self.message.message_type != event_type::CONVERSATION;
        }
        self.batcher
            .set_recovery_message(CallAction::say(self.error_text()));
        debug!(
            event = %self.message.message_type,
            depth = self.state.depth(),
            "call_session.dispatch"
        );

        let locale = self.preferred_locale();
        if let Err(err) = self.options.localizer.load(&locale).await {
            self.error(err).await;
            return;
        }

        self.in_middleware = true;
        let options = self.options.clone();
        let flow = options.middleware.run(self).await;
        self.in_middleware = false;
        match flow {
            Ok(Flow::Continue) => self.route_message().await,
            Ok(Flow::Stop) => debug!("call session middleware handled the event"),
            Err(err) => self.error(err).await,
        }
        self.batcher.set_snapshot(self.snapshot());
    }

    /// Hands the notification to the active dialog, or begins the default dialog.
    pub async fn route_message(&mut self) {
        if !self.validate_callstack() {
            warn!(callstack = ?self.state.callstack, "callstack is invalid; resetting call session");
            if let Err(err) = self.reset(None, None).await {
                self.error(err).await;
            }
            return;
        }
        let Some(id) = self.state.current().map(|e| e.id.clone()) else {
            let (id, args) = (self.options.dialog_id.clone(), self.options.dialog_args.clone());
            if let Err(err) = self.begin_dialog(&id, args).await {
                self.error(err).await;
            }
            return;
        };
        match self.find_dialog(&id) {
            Some(dialog) => {
                let outcome = dialog.reply_received(self, RecognizeResult::default()).await;
                self.report(outcome).await;
            }
            None => {
                let err = BotError::InvalidState(format!("Active dialog '{}' is not registered.", id));
                self.error(err).await;
            }
        }
    }

    pub fn validate_callstack(&self) -> bool {
        self.state
            .callstack
            .iter()
            .all(|entry| self.find_dialog(&entry.id).is_some())
    }

    pub fn resolve_dialog_id(&self, id: &str) -> String {
        self.state.resolve_dialog_id(id, self.in_middleware)
    }

    fn find_dialog(&self, id: &str) -> Option<Arc<dyn Dialog<CallSession>>> {
        self.options.library.find_qualified(id)
    }

    /// Answers the call now rather than with the first prompt.
    pub fn answer(&mut self) -> &mut Self {
        self.send(CallAction::answer())
    }

    pub fn reject(&mut self) -> &mut Self {
        self.send(CallAction::reject())
    }

    pub fn hangup(&mut self) -> &mut Self {
        self.send(CallAction::hangup())
    }

    /// Queues `action` and arms the batch.
    pub fn send(&mut self, action: impl Into<CallAction>) -> &mut Self {
        self.queue(action.into());
        self.start_batch();
        self
    }

    /// Speaks the localized `text`.
    pub fn send_text(&mut self, text: &str) -> &mut Self {
        self.send_format(text, &[])
    }

    pub fn send_format(&mut self, text: &str, args: &[String]) -> &mut Self {
        let text = self.gettext(text, args);
        self.send(Prompt::text(text))
    }

    pub fn save(&mut self) -> &mut Self {
        self.start_batch();
        self
    }

    pub async fn begin_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        let id = self.resolve_dialog_id(id);
        let dialog = self
            .find_dialog(&id)
            .ok_or_else(|| BotError::NotFound(id.clone()))?;
        info!(dialog_id = %id, depth = self.state.depth(), "call_session.begin_dialog");
        self.push_and_begin(id, dialog, args).await;
        Ok(())
    }

    pub async fn replace_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        let id = self.resolve_dialog_id(id);
        let dialog = self
            .find_dialog(&id)
            .ok_or_else(|| BotError::NotFound(id.clone()))?;
        info!(dialog_id = %id, "call_session.replace_dialog");
        self.state.pop();
        self.push_and_begin(id, dialog, args).await;
        Ok(())
    }

    async fn push_and_begin(
        &mut self,
        id: String,
        dialog: Arc<dyn Dialog<CallSession>>,
        args: Option<Value>,
    ) {
        self.state.push(StackEntry::new(id));
        self.start_batch();
        let outcome = dialog.begin(self, args).await;
        self.report(outcome).await;
    }

    pub async fn end_dialog(&mut self) -> Result<()> {
        self.finish_dialog(None, DialogResult::completed(Some(Value::Bool(true))))
            .await
    }

    /// Queues `action`, then ends the active dialog.
    pub async fn end_dialog_with(&mut self, action: impl Into<CallAction>) -> Result<()> {
        self.finish_dialog(
            Some(action.into()),
            DialogResult::completed(Some(Value::Bool(true))),
        )
        .await
    }

    pub async fn end_dialog_with_result(&mut self, result: DialogResult) -> Result<()> {
        self.finish_dialog(None, result).await
    }

    async fn finish_dialog(&mut self, action: Option<CallAction>, mut result: DialogResult) -> Result<()> {
        let Some(child_id) = self.state.current().map(|e| e.id.clone()) else {
            warn!("call_session.end_dialog called with no active dialog");
            return Ok(());
        };
        if let Some(action) = action {
            self.queue(action);
        }
        info!(dialog_id = %child_id, resumed = ?result.resumed, "call_session.end_dialog");
        result.child_id = Some(child_id);
        match self.state.pop().map(|e| e.id.clone()) {
            Some(parent_id) => {
                self.start_batch();
                self.resume_parent(&parent_id, result).await;
                Ok(())
            }
            // Ending the last dialog ends the call.
            None => self.end_conversation(None).await,
        }
    }

    async fn resume_parent(&mut self, parent_id: &str, result: DialogResult) {
        match self.find_dialog(parent_id) {
            Some(parent) => {
                let outcome = parent.dialog_resumed(self, result).await;
                self.report(outcome).await;
            }
            None => {
                let err = BotError::InvalidState(format!(
                    "Can't resume missing parent dialog '{}'.",
                    parent_id
                ));
                self.error(err).await;
            }
        }
    }

    /// Removes the innermost entry matching `target` and everything above it.
    pub async fn cancel_dialog(
        &mut self,
        target: impl Into<DialogTarget>,
        replace_with: Option<(String, Option<Value>)>,
    ) -> Result<()> {
        let target = match target.into() {
            DialogTarget::Id(id) => {
                DialogTarget::Id(self.state.resolve_dialog_id(&id, self.in_middleware))
            }
            index => index,
        };
        let index = self.state.find(&target).ok_or_else(|| {
            BotError::NotFound(match &target {
                DialogTarget::Id(id) => id.clone(),
                DialogTarget::Index(i) => format!("stack index {}", i),
            })
        })?;
        let replacement = match replace_with {
            Some((id, args)) => {
                let id = self.state.resolve_dialog_id_at(&id, index, self.in_middleware);
                let dialog = self
                    .find_dialog(&id)
                    .ok_or_else(|| BotError::NotFound(id.clone()))?;
                Some((id, dialog, args))
            }
            None => None,
        };
        let child_id = self.state.callstack[index].id.clone();
        info!(dialog_id = %child_id, index, "call_session.cancel_dialog");
        self.state.truncate(index);

        match replacement {
            Some((id, dialog, args)) => {
                self.push_and_begin(id, dialog, args).await;
                Ok(())
            }
            None => match self.state.current().map(|e| e.id.clone()) {
                Some(parent_id) => {
                    self.start_batch();
                    let result = DialogResult {
                        child_id: Some(child_id),
                        ..DialogResult::canceled()
                    };
                    self.resume_parent(&parent_id, result).await;
                    Ok(())
                }
                None => self.end_conversation(None).await,
            },
        }
    }

    /// Queues `action` (if any), ends the call, clears the stack and private data, and flushes.
    pub async fn end_conversation(&mut self, action: Option<CallAction>) -> Result<()> {
        if let Some(action) = action {
            self.queue(action);
        }
        info!(depth = self.state.depth(), "call_session.end_conversation");
        self.private_conversation_data.clear();
        self.state.clear();
        let answered = self.answered();
        self.batcher
            .with_queue(|queue| add_call_control(queue, answered, true));
        self.msg_sent = true;
        self.send_batch().await;
        Ok(())
    }

    pub async fn reset(&mut self, dialog_id: Option<&str>, args: Option<Value>) -> Result<()> {
        let (id, args) = match dialog_id {
            Some(id) => (id.to_string(), args),
            None => (self.options.dialog_id.clone(), self.options.dialog_args.clone()),
        };
        info!(dialog_id = %id, "call_session.reset");
        self.is_reset = true;
        self.state.clear();
        self.begin_dialog(&id, args).await
    }

    /// Speaks the error message, ends the call, and reports `err` on the event bus.
    pub async fn error(&mut self, err: BotError) {
        warn!(error = %err, "call_session.error");
        let text = self.error_text();
        // end_conversation only queues and flushes; flush failures are reported by the batcher.
        let _ = self.end_conversation(Some(CallAction::say(text))).await;
        self.options.events.emit_error(err);
    }

    fn error_text(&self) -> String {
        if let Some(custom) = &self.options.dialog_error_message {
            return self.gettext(custom, &[]);
        }
        let locale = self.preferred_locale();
        let text = self
            .options
            .localizer
            .gettext(&locale, "default_error", Some(library::SYSTEM));
        if text == "default_error" {
            consts::DEFAULT_ERROR_MESSAGE.to_string()
        } else {
            text
        }
    }

    /// Saves state and sends the queued actions as one workflow now.
    pub async fn send_batch(&mut self) {
        self.batcher.set_snapshot(self.snapshot());
        if let Err(err) = self.batcher.flush().await {
            debug!(error = %err, "call_session.send_batch failed");
        }
        if self.batcher.take_reset() {
            info!("storage rejected call state; in-memory state cleared");
            self.user_data.clear();
            self.private_conversation_data.clear();
            self.state.clear();
            self.is_reset = true;
        }
    }

    fn queue(&mut self, action: CallAction) {
        self.batcher.push(action);
        self.msg_sent = true;
    }

    fn start_batch(&self) {
        self.batcher.start(self.snapshot());
    }

    pub fn snapshot(&self) -> PersistedSession {
        PersistedSession {
            user_data: self.user_data.clone(),
            conversation_data: self.conversation_data.clone(),
            private_conversation_data: self.private_conversation_data.clone(),
            session_state: self.state.clone(),
        }
    }

    /// The user's saved locale, else the caller's, else the localizer default.
    pub fn preferred_locale(&self) -> String {
        if let Some(locale) = self.user_data.get(data::PREFERRED_LOCALE).and_then(Value::as_str) {
            return locale.to_string();
        }
        if let Some(locale) = &self.message.text_locale {
            return locale.clone();
        }
        self.options.localizer.default_locale()
    }

    pub fn gettext(&self, msgid: &str, args: &[String]) -> String {
        let text = self
            .options
            .localizer
            .gettext(&self.preferred_locale(), msgid, None);
        format_template(&text, args)
    }

    pub fn ngettext(&self, msgid: &str, msgid_plural: &str, count: u64) -> String {
        let text = self.options.localizer.ngettext(
            &self.preferred_locale(),
            msgid,
            msgid_plural,
            count,
            None,
        );
        format_template(&text, &[count.to_string()])
    }

    async fn report(&mut self, outcome: Result<()>) {
        if let Err(err) = outcome {
            self.error(err).await;
        }
    }
}

#[async_trait]
impl DialogSession for CallSession {
    fn message(&self) -> &Message {
        &self.message
    }

    fn preferred_locale(&self) -> String {
        CallSession::preferred_locale(self)
    }

    fn session_state(&self) -> &SessionState {
        &self.state
    }

    fn dialog_data(&self) -> &DataMap {
        CallSession::dialog_data(self)
    }

    fn dialog_data_mut(&mut self) -> &mut DataMap {
        CallSession::dialog_data_mut(self)
    }

    fn message_sent(&self) -> bool {
        self.msg_sent
    }

    fn send_text(&mut self, text: &str) {
        CallSession::send_text(self, text);
    }

    async fn begin_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        CallSession::begin_dialog(self, id, args).await
    }

    async fn replace_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        CallSession::replace_dialog(self, id, args).await
    }

    async fn end_dialog_with_result(&mut self, result: DialogResult) -> Result<()> {
        CallSession::end_dialog_with_result(self, result).await
    }

    async fn cancel_dialog(
        &mut self,
        target: DialogTarget,
        replacement: Option<(String, Option<Value>)>,
    ) -> Result<()> {
        CallSession::cancel_dialog(self, target, replacement).await
    }

    async fn end_conversation_with_text(&mut self, text: Option<&str>) -> Result<()> {
        let action = text.map(|t| CallAction::say(self.gettext(t, &[])));
        CallSession::end_conversation(self, action).await
    }

    async fn error(&mut self, err: BotError) {
        CallSession::error(self, err).await
    }
}
