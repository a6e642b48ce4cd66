//! The chat [`Session`]: per-turn dispatch engine over the persisted dialog stack.
//!
//! A session is created for each inbound message. [`Session::dispatch`] runs the
//! session middleware and then routes the message: the active dialog and the
//! actions of every dialog on the stack compete for the utterance, the stronger
//! claim wins, and ties go to the active dialog. Everything the turn sends is
//! batched and flushed together with the updated state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dbot_core::consts::{self, data, library, ACTION_PREFIX};
use dbot_core::{
    format_template, BatchSink, Batcher, BotError, DataMap, Dialog, DialogResult, DialogSession,
    DialogTarget, EventBus, Flow, Library, Localizer, Message, PersistedSession, RecognizeContext,
    RecognizeResult, Result, Sendable, SessionState, StackEntry,
};
use dbot_dialogs::ActionSet;
use handler_chain::MiddlewareChain;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Default delay before queued messages and state are flushed.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(250);

/// Shared, per-bot configuration every session of that bot is created with.
pub struct SessionOptions {
    pub library: Arc<Library<Session>>,
    pub localizer: Arc<dyn Localizer>,
    /// Global actions, checked after the actions of the dialogs on the stack.
    pub actions: Option<Arc<ActionSet>>,
    pub middleware: MiddlewareChain<Session>,
    /// Dialog started when the stack is empty or had to be reset.
    pub dialog_id: String,
    pub dialog_args: Option<Value>,
    /// Sent (localized) when a turn fails; the system `default_error` string otherwise.
    pub dialog_error_message: Option<String>,
    pub auto_batch_delay: Duration,
    pub events: EventBus,
}

impl SessionOptions {
    pub fn new(library: Arc<Library<Session>>, localizer: Arc<dyn Localizer>) -> Self {
        Self {
            library,
            localizer,
            actions: None,
            middleware: MiddlewareChain::new(),
            dialog_id: "/".to_string(),
            dialog_args: None,
            dialog_error_message: None,
            auto_batch_delay: DEFAULT_BATCH_DELAY,
            events: EventBus::default(),
        }
    }

    pub fn with_actions(mut self, actions: ActionSet) -> Self {
        self.actions = Some(Arc::new(actions));
        self
    }

    pub fn with_middleware(mut self, middleware: MiddlewareChain<Session>) -> Self {
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

pub struct Session {
    options: Arc<SessionOptions>,
    /// Message being processed this turn.
    pub message: Message,
    pub user_data: DataMap,
    pub conversation_data: DataMap,
    pub private_conversation_data: DataMap,
    state: SessionState,
    /// Dialog data used while the stack is empty.
    scratch: DataMap,
    batcher: Batcher<Message>,
    in_middleware: bool,
    is_reset: bool,
    msg_sent: bool,
    locale: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.message.address)
            .field("callstack", &self.state.callstack)
            .field("is_reset", &self.is_reset)
            .finish()
    }
}

impl Session {
    /// New session whose flushes go to `sink` (storage save, then delivery).
    pub fn new(options: Arc<SessionOptions>, sink: Arc<dyn BatchSink<Message>>) -> Self {
        let batcher = Batcher::new(sink, options.auto_batch_delay, options.events.clone());
        Self {
            options,
            message: Message::default(),
            user_data: DataMap::new(),
            conversation_data: DataMap::new(),
            private_conversation_data: DataMap::new(),
            state: SessionState::default(),
            scratch: DataMap::new(),
            batcher,
            in_middleware: false,
            is_reset: false,
            msg_sent: false,
            locale: None,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn library(&self) -> &Library<Session> {
        &self.options.library
    }

    pub fn localizer(&self) -> &Arc<dyn Localizer> {
        &self.options.localizer
    }

    pub fn events(&self) -> &EventBus {
        &self.options.events
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Stamps the dialog version the stored stack was built with.
    pub fn set_version(&mut self, version: f64) {
        self.state.version = version;
    }

    /// True when the stack was reset this turn (invalid state, explicit reset, or storage recovery).
    pub fn is_reset(&self) -> bool {
        self.is_reset
    }

    pub fn in_middleware(&self) -> bool {
        self.in_middleware
    }

    pub fn message_sent(&self) -> bool {
        self.msg_sent
    }

    pub fn batcher(&self) -> &Batcher<Message> {
        &self.batcher
    }

    /// Waits until every scheduled flush has completed.
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

    /// Processes `message` against the stack loaded from storage (`None` for a new conversation).
    ///
    /// Failures never escape: they end the conversation with the error message and
    /// are reported on the event bus.
    pub async fn dispatch(&mut self, prior: Option<SessionState>, message: Message) {
        let now = Utc::now().timestamp_millis();
        self.state = prior.unwrap_or_default();
        self.message = message;
        if self.message.message_type.is_empty() {
            self.message.message_type = consts::message_type::MESSAGE.to_string();
        }

        let locale = self.preferred_locale();
        if self.message.text_locale.is_none() {
            self.message.text_locale = Some(locale.clone());
        }
        let recovery = self.prepare_message(Message::text(self.error_text()));
        self.batcher.set_recovery_message(recovery);
        debug!(locale = %locale, depth = self.state.depth(), "session.dispatch");

        if let Err(err) = self.options.localizer.load(&locale).await {
            self.error(err).await;
            return;
        }

        self.in_middleware = true;
        let options = self.options.clone();
        let flow = options.middleware.run(self).await;
        self.in_middleware = false;
        match flow {
            Ok(Flow::Continue) => {
                self.state.last_access = now;
                self.route_message().await;
            }
            Ok(Flow::Stop) => debug!("session middleware handled the message"),
            Err(err) => self.error(err).await,
        }

        // Capture whatever the turn changed after its last explicit save.
        self.batcher.set_snapshot(self.snapshot());
    }

    /// Routes the current message to the active dialog or to a matching action.
    pub async fn route_message(&mut self) {
        if !self.validate_callstack() {
            warn!(callstack = ?self.state.callstack, "callstack is invalid; resetting session");
            if let Err(err) = self.reset(None, None).await {
                self.error(err).await;
            }
            return;
        }

        let dialog_result = match self.recognize_cur_dialog().await {
            Ok(r) => r,
            Err(err) => return self.error(err).await,
        };

        if dialog_result.score < 1.0 {
            let action_result = match self.recognize_callstack_actions().await {
                Ok(r) => r,
                Err(err) => return self.error(err).await,
            };
            if action_result.score > dialog_result.score {
                debug!(
                    action = ?action_result.action,
                    score = action_result.score,
                    dialog_score = dialog_result.score,
                    "routing to action"
                );
                let outcome = self.invoke_action(action_result).await;
                self.report(outcome).await;
                return;
            }
        }
        self.route_to_dialog(dialog_result).await;
    }

    /// Scores the utterance against the active dialog. Explicit `action?` utterances score 0.
    pub async fn recognize_cur_dialog(&self) -> Result<RecognizeResult> {
        let Some(cur) = self.state.current() else {
            return Ok(RecognizeResult::default());
        };
        if self.message.text.starts_with(ACTION_PREFIX) {
            return Ok(RecognizeResult::default());
        }
        let dialog = self.find_dialog(&cur.id).ok_or_else(|| {
            BotError::InvalidState(format!("Active dialog '{}' is not registered.", cur.id))
        })?;
        let locale = self.preferred_locale();
        let ctx = RecognizeContext {
            message: &self.message,
            locale: &locale,
            dialog_data: &cur.state,
            active_dialog: true,
        };
        dialog.recognize(&ctx).await
    }

    /// Best action across the stack (innermost first, stopping at a perfect score),
    /// then the global actions.
    pub async fn recognize_callstack_actions(&self) -> Result<RecognizeResult> {
        let mut best = RecognizeResult::default();
        for index in (0..self.state.depth()).rev() {
            if best.score >= 1.0 {
                break;
            }
            let id = &self.state.callstack[index].id;
            let Some(dialog) = self.find_dialog(id) else {
                continue;
            };
            let result = dialog.recognize_action(&self.message).await?;
            if result.score > best.score {
                best = RecognizeResult {
                    dialog_id: Some(id.clone()),
                    dialog_index: Some(index),
                    ..result
                };
            }
        }

        if best.score < 1.0 {
            if let Some(actions) = &self.options.actions {
                let result = actions.recognize_action(&self.message);
                if result.score > best.score {
                    best = result;
                }
            }
        }
        Ok(best)
    }

    async fn invoke_action(&mut self, result: RecognizeResult) -> Result<()> {
        match result.dialog_id.clone() {
            Some(id) => match self.find_dialog(&id) {
                Some(dialog) => dialog.invoke_action(self, result).await,
                None => Err(BotError::InvalidState(format!(
                    "Can't invoke action on missing dialog '{}'.",
                    id
                ))),
            },
            None => match self.options.actions.clone() {
                Some(actions) => actions.invoke_action(self, result).await,
                None => Ok(()),
            },
        }
    }

    async fn route_to_dialog(&mut self, result: RecognizeResult) {
        let Some(id) = self.state.current().map(|e| e.id.clone()) else {
            let (id, args) = (self.options.dialog_id.clone(), self.options.dialog_args.clone());
            if let Err(err) = self.begin_dialog(&id, args).await {
                self.error(err).await;
            }
            return;
        };
        match self.find_dialog(&id) {
            Some(dialog) => {
                let outcome = dialog.reply_received(self, result).await;
                self.report(outcome).await;
            }
            None => {
                let err = BotError::InvalidState(format!("Active dialog '{}' is not registered.", id));
                self.error(err).await;
            }
        }
    }

    /// True when every stack entry still resolves to a registered dialog.
    pub fn validate_callstack(&self) -> bool {
        self.state
            .callstack
            .iter()
            .all(|entry| self.find_dialog(&entry.id).is_some())
    }

    /// Qualifies a bare dialog id with the active dialog's library (the default
    /// library while session middleware runs).
    pub fn resolve_dialog_id(&self, id: &str) -> String {
        self.state.resolve_dialog_id(id, self.in_middleware)
    }

    fn find_dialog(&self, id: &str) -> Option<Arc<dyn Dialog<Session>>> {
        self.options.library.find_qualified(id)
    }

    /// Pushes `id` and runs its `begin` hook. Fails with `NotFound` for unknown ids.
    pub async fn begin_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        let id = self.resolve_dialog_id(id);
        let dialog = self
            .find_dialog(&id)
            .ok_or_else(|| BotError::NotFound(id.clone()))?;
        info!(dialog_id = %id, depth = self.state.depth(), "session.begin_dialog");
        self.push_and_begin(id, dialog, args).await;
        Ok(())
    }

    /// Swaps the active dialog for `id` without resuming the parent.
    pub async fn replace_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        let id = self.resolve_dialog_id(id);
        let dialog = self
            .find_dialog(&id)
            .ok_or_else(|| BotError::NotFound(id.clone()))?;
        info!(dialog_id = %id, "session.replace_dialog");
        self.state.pop();
        self.push_and_begin(id, dialog, args).await;
        Ok(())
    }

    async fn push_and_begin(&mut self, id: String, dialog: Arc<dyn Dialog<Session>>, args: Option<Value>) {
        self.state.push(StackEntry::new(id));
        self.start_batch();
        let outcome = dialog.begin(self, args).await;
        self.report(outcome).await;
    }

    /// Ends the active dialog with `{ resumed: completed, response: true }`.
    pub async fn end_dialog(&mut self) -> Result<()> {
        self.finish_dialog(None, DialogResult::completed(Some(Value::Bool(true))))
            .await
    }

    /// Sends `message`, then ends the active dialog like [`Session::end_dialog`].
    pub async fn end_dialog_with(&mut self, message: Message) -> Result<()> {
        self.finish_dialog(Some(message), DialogResult::completed(Some(Value::Bool(true))))
            .await
    }

    pub async fn end_dialog_with_result(&mut self, result: DialogResult) -> Result<()> {
        self.finish_dialog(None, result).await
    }

    async fn finish_dialog(&mut self, message: Option<Message>, mut result: DialogResult) -> Result<()> {
        let Some(child_id) = self.state.current().map(|e| e.id.clone()) else {
            warn!("session.end_dialog called with no active dialog");
            return Ok(());
        };
        if let Some(message) = message {
            self.queue(message);
        }
        info!(dialog_id = %child_id, resumed = ?result.resumed, "session.end_dialog");
        result.child_id = Some(child_id);

        match self.state.pop().map(|e| e.id.clone()) {
            Some(parent_id) => {
                self.start_batch();
                self.resume_parent(&parent_id, result).await;
                Ok(())
            }
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
    ///
    /// With a replacement, that dialog begins in the freed slot; otherwise the new
    /// top is resumed with `canceled`, or the conversation ends when nothing is left.
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
        info!(dialog_id = %child_id, index, "session.cancel_dialog");
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

    /// Sends `message` (if any), clears the stack and private conversation data, and flushes.
    pub async fn end_conversation(&mut self, message: Option<Message>) -> Result<()> {
        if let Some(message) = message {
            self.queue(message);
        }
        info!(depth = self.state.depth(), "session.end_conversation");
        self.private_conversation_data.clear();
        self.state.clear();
        self.send_batch().await;
        Ok(())
    }

    /// Clears the stack and begins `dialog_id` (the default dialog when `None`).
    pub async fn reset(&mut self, dialog_id: Option<&str>, args: Option<Value>) -> Result<()> {
        let (id, args) = match dialog_id {
            Some(id) => (id.to_string(), args),
            None => (self.options.dialog_id.clone(), self.options.dialog_args.clone()),
        };
        info!(dialog_id = %id, "session.reset");
        self.is_reset = true;
        self.state.clear();
        self.begin_dialog(&id, args).await
    }

    /// Ends the conversation with the error message and reports `err` on the event bus.
    pub async fn error(&mut self, err: BotError) {
        warn!(error = %err, "session.error");
        let text = self.error_text();
        // end_conversation only queues and flushes; flush failures are reported by the batcher.
        let _ = self.end_conversation(Some(Message::text(text))).await;
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

    /// Queues `message` (address and locale filled from the inbound message) and arms the batch.
    pub fn send(&mut self, message: impl Sendable) -> &mut Self {
        self.queue(message.to_message());
        self.start_batch();
        self
    }

    /// Localizes `text` and sends it.
    pub fn send_text(&mut self, text: &str) -> &mut Self {
        self.send_format(text, &[])
    }

    /// Localizes `text`, substitutes `args` into its placeholders, and sends it.
    pub fn send_format(&mut self, text: &str, args: &[String]) -> &mut Self {
        let text = self.gettext(text, args);
        self.send(Message::text(text))
    }

    /// Sends a typing indicator immediately.
    pub async fn send_typing(&mut self) {
        self.queue(Message::typing());
        self.send_batch().await;
    }

    /// Schedules a save of the session's data with the next flush.
    pub fn save(&mut self) -> &mut Self {
        self.start_batch();
        self
    }

    /// Flushes queued messages and state now. Failures are reported on the event bus.
    pub async fn send_batch(&mut self) {
        self.batcher.set_snapshot(self.snapshot());
        if let Err(err) = self.batcher.flush().await {
            debug!(error = %err, "session.send_batch failed");
        }
        if self.batcher.take_reset() {
            info!("storage rejected session state; in-memory state cleared");
            self.user_data.clear();
            self.private_conversation_data.clear();
            self.state.clear();
            self.is_reset = true;
        }
    }

    fn queue(&mut self, message: Message) {
        let message = self.prepare_message(message);
        self.batcher.push(message);
        self.msg_sent = true;
    }

    fn prepare_message(&self, mut message: Message) -> Message {
        if message.message_type.is_empty() {
            message.message_type = consts::message_type::MESSAGE.to_string();
        }
        if message.address.channel_id.is_empty() {
            message.address = self.message.address.clone();
        }
        if message.text_locale.is_none() {
            message.text_locale = self.message.text_locale.clone();
        }
        message
    }

    fn start_batch(&self) {
        self.batcher.start(self.snapshot());
    }

    /// Everything a flush persists for this conversation.
    pub fn snapshot(&self) -> PersistedSession {
        PersistedSession {
            user_data: self.user_data.clone(),
            conversation_data: self.conversation_data.clone(),
            private_conversation_data: self.private_conversation_data.clone(),
            session_state: self.state.clone(),
        }
    }

    /// Locale for this turn: explicitly set, then the user's saved preference,
    /// then the message's locale, then the localizer default.
    pub fn preferred_locale(&self) -> String {
        if let Some(locale) = &self.locale {
            return locale.clone();
        }
        if let Some(locale) = self.user_data.get(data::PREFERRED_LOCALE).and_then(Value::as_str) {
            return locale.to_string();
        }
        if let Some(locale) = &self.message.text_locale {
            return locale.clone();
        }
        self.options.localizer.default_locale()
    }

    /// Saves `locale` as the user's preference and loads its strings.
    pub async fn set_preferred_locale(&mut self, locale: &str) -> Result<()> {
        info!(locale, "session.set_preferred_locale");
        self.locale = Some(locale.to_string());
        self.user_data
            .insert(data::PREFERRED_LOCALE.to_string(), json!(locale));
        self.save();
        self.options.localizer.load(locale).await
    }

    /// Localized `msgid` with `args` substituted into its placeholders.
    pub fn gettext(&self, msgid: &str, args: &[String]) -> String {
        let locale = self.preferred_locale();
        let text = self.options.localizer.gettext(&locale, msgid, None);
        format_template(&text, args)
    }

    /// Singular or plural form for `count`, with `count` substituted.
    pub fn ngettext(&self, msgid: &str, msgid_plural: &str, count: u64) -> String {
        let locale = self.preferred_locale();
        let text = self
            .options
            .localizer
            .ngettext(&locale, msgid, msgid_plural, count, None);
        format_template(&text, &[count.to_string()])
    }

    async fn report(&mut self, outcome: Result<()>) {
        if let Err(err) = outcome {
            self.error(err).await;
        }
    }
}

#[async_trait]
impl DialogSession for Session {
    fn message(&self) -> &Message {
        &self.message
    }

    fn preferred_locale(&self) -> String {
        Session::preferred_locale(self)
    }

    fn session_state(&self) -> &SessionState {
        &self.state
    }

    fn dialog_data(&self) -> &DataMap {
        Session::dialog_data(self)
    }

    fn dialog_data_mut(&mut self) -> &mut DataMap {
        Session::dialog_data_mut(self)
    }

    fn message_sent(&self) -> bool {
        self.msg_sent
    }

    fn send_text(&mut self, text: &str) {
        Session::send_text(self, text);
    }

    async fn begin_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        Session::begin_dialog(self, id, args).await
    }

    async fn replace_dialog(&mut self, id: &str, args: Option<Value>) -> Result<()> {
        Session::replace_dialog(self, id, args).await
    }

    async fn end_dialog_with_result(&mut self, result: DialogResult) -> Result<()> {
        Session::end_dialog_with_result(self, result).await
    }

    async fn cancel_dialog(
        &mut self,
        target: DialogTarget,
        replacement: Option<(String, Option<Value>)>,
    ) -> Result<()> {
        Session::cancel_dialog(self, target, replacement).await
    }

    async fn end_conversation_with_text(&mut self, text: Option<&str>) -> Result<()> {
        let message = text.map(|t| Message::text(self.gettext(t, &[])));
        Session::end_conversation(self, message).await
    }

    async fn error(&mut self, err: BotError) {
        Session::error(self, err).await
    }
}
