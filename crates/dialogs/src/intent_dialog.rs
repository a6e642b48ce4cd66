//! Dialog that recognizes an intent and dispatches to the handler registered for it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dbot_core::consts::{data::INTENT, intents};
use dbot_core::{
    BotError, Dialog, DialogResult, DialogSession, Message, RecognizeContext, RecognizeResult,
    Result,
};
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::action_set::ActionSet;
use crate::intent_recognizer_set::{IntentRecognizer, IntentRecognizerSet, IntentRecognizerSetOptions};
use crate::regexp_recognizer::RegExpRecognizer;
use crate::waterfall::{StepArgs, Waterfall};

/// When an [`IntentDialog`] runs recognition on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognizeMode {
    /// Every time the dialog begins.
    OnBegin,
    /// Only when the dialog is the root of the stack.
    #[default]
    OnBeginIfRoot,
    /// Never on begin; only on replies.
    OnReply,
}

/// Handler run for a matched intent.
pub enum IntentAction<S> {
    Waterfall(Waterfall<S>),
    /// Begins a dialog with the recognize result (merged with `args`) as its arguments.
    /// Resuming afterwards does nothing unless the child reported an error.
    BeginDialog { id: String, args: Option<Value> },
}

impl<S> Clone for IntentAction<S> {
    fn clone(&self) -> Self {
        match self {
            IntentAction::Waterfall(w) => IntentAction::Waterfall(w.clone()),
            IntentAction::BeginDialog { id, args } => IntentAction::BeginDialog {
                id: id.clone(),
                args: args.clone(),
            },
        }
    }
}

impl<S: DialogSession> IntentAction<S> {
    pub fn begin_dialog(id: &str, args: Option<Value>) -> Self {
        IntentAction::BeginDialog {
            id: id.to_string(),
            args,
        }
    }

    async fn invoke(&self, session: &mut S, args: StepArgs) -> Result<()> {
        match self {
            IntentAction::Waterfall(w) => w.run(session, args).await,
            IntentAction::BeginDialog { id, args: extra } => match args {
                StepArgs::Resumed(r) => {
                    if let Some(err) = r.error {
                        session.error(BotError::Dialog(err)).await;
                    }
                    Ok(())
                }
                StepArgs::Intent(r) => {
                    let mut merged = serde_json::to_value(&r)?;
                    if let (Value::Object(target), Some(Value::Object(extra))) = (&mut merged, extra) {
                        for (k, v) in extra {
                            target.insert(k.clone(), v.clone());
                        }
                    }
                    session.begin_dialog(id, Some(merged)).await
                }
                StepArgs::Begin(a) => session.begin_dialog(id, a.or_else(|| extra.clone())).await,
            },
        }
    }
}

impl<S> From<Waterfall<S>> for IntentAction<S> {
    fn from(w: Waterfall<S>) -> Self {
        IntentAction::Waterfall(w)
    }
}

/// Called when the dialog begins; return `Ok(false)` to skip the initial recognition.
pub type BeginHandler<S> =
    Arc<dyn for<'a> Fn(&'a mut S, Option<Value>) -> BoxFuture<'a, Result<bool>> + Send + Sync>;

pub struct IntentDialog<S> {
    recognizers: IntentRecognizerSet,
    mode: RecognizeMode,
    on_begin: Option<BeginHandler<S>>,
    handlers: HashMap<String, IntentAction<S>>,
    actions: ActionSet,
}

impl<S: DialogSession> Default for IntentDialog<S> {
    fn default() -> Self {
        Self::new(IntentRecognizerSetOptions::default())
    }
}

impl<S: DialogSession> IntentDialog<S> {
    pub fn new(options: IntentRecognizerSetOptions) -> Self {
        Self {
            recognizers: IntentRecognizerSet::new(options),
            mode: RecognizeMode::default(),
            on_begin: None,
            handlers: HashMap::new(),
            actions: ActionSet::new(),
        }
    }

    pub fn recognize_mode(mut self, mode: RecognizeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn on_begin<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut S, Option<Value>) -> BoxFuture<'a, Result<bool>> + Send + Sync + 'static,
    {
        self.on_begin = Some(Arc::new(f));
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn IntentRecognizer>) -> Self {
        self.recognizers.add(recognizer);
        self
    }

    /// Scoped actions, live while this dialog is on the stack.
    pub fn actions(mut self, actions: ActionSet) -> Self {
        self.actions = actions;
        self
    }

    /// Handler for an intent produced by one of the recognizers.
    pub fn matches(mut self, intent: &str, action: impl Into<IntentAction<S>>) -> Result<Self> {
        if self.handlers.contains_key(intent) {
            return Err(BotError::AlreadyExists(format!(
                "A handler for '{}' already exists.",
                intent
            )));
        }
        self.handlers.insert(intent.to_string(), action.into());
        Ok(self)
    }

    /// Handler for a regular expression; the expression's source text is the intent id.
    pub fn matches_regex(self, expression: Regex, action: impl Into<IntentAction<S>>) -> Result<Self> {
        let id = expression.as_str().to_string();
        let mut dialog = self.matches(&id, action)?;
        dialog
            .recognizers
            .add(Arc::new(RegExpRecognizer::new(id, expression)));
        Ok(dialog)
    }

    /// Same handler for several intents.
    pub fn matches_any(mut self, intents: &[&str], action: IntentAction<S>) -> Result<Self> {
        for intent in intents {
            self = self.matches(intent, action.clone())?;
        }
        Ok(self)
    }

    /// Handler used when no recognized intent has one. Replaces any previous default.
    pub fn on_default(mut self, action: impl Into<IntentAction<S>>) -> Self {
        self.handlers.insert(intents::DEFAULT.to_string(), action.into());
        self
    }

    /// Recognizes the session's current message against this dialog's recognizers.
    async fn recognize_message(&self, session: &mut S) -> Result<RecognizeResult> {
        // Owned copies so nothing borrowed from the session is held across the await.
        let message: Message = session.message().clone();
        let dialog_data = session.dialog_data().clone();
        let locale = session.preferred_locale();
        let ctx = RecognizeContext {
            message: &message,
            locale: &locale,
            dialog_data: &dialog_data,
            active_dialog: true,
        };
        self.recognizers.recognize(&ctx).await
    }

    async fn invoke_intent(&self, session: &mut S, result: RecognizeResult) -> Result<()> {
        let active = match &result.intent {
            Some(intent) if self.handlers.contains_key(intent) => {
                info!(intent = %intent, "IntentDialog.matches");
                intent.clone()
            }
            _ if self.handlers.contains_key(intents::DEFAULT) => {
                info!("IntentDialog.on_default");
                intents::DEFAULT.to_string()
            }
            _ => {
                warn!(intent = ?result.intent, "IntentDialog: no intent handler found");
                return Ok(());
            }
        };
        session
            .dialog_data_mut()
            .insert(INTENT.to_string(), Value::String(active.clone()));
        match self.handlers.get(&active) {
            Some(handler) => handler.invoke(session, StepArgs::Intent(result)).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S: DialogSession + 'static> Dialog<S> for IntentDialog<S> {
    async fn begin(&self, session: &mut S, args: Option<Value>) -> Result<()> {
        let is_root = session.session_state().depth() == 1;
        let recognize = self.mode == RecognizeMode::OnBegin
            || (is_root && self.mode == RecognizeMode::OnBeginIfRoot);
        if let Some(on_begin) = &self.on_begin {
            info!("IntentDialog.begin");
            if !on_begin(session, args).await? {
                return Ok(());
            }
        }
        if recognize {
            let result = self.recognize_message(session).await?;
            self.invoke_intent(session, result).await?;
        }
        Ok(())
    }

    async fn reply_received(&self, session: &mut S, result: RecognizeResult) -> Result<()> {
        self.invoke_intent(session, result).await
    }

    async fn dialog_resumed(&self, session: &mut S, result: DialogResult) -> Result<()> {
        let active = session
            .dialog_data()
            .get(INTENT)
            .and_then(Value::as_str)
            .map(str::to_string);
        match active.as_deref().and_then(|intent| self.handlers.get(intent)) {
            Some(handler) => handler.invoke(session, StepArgs::Resumed(result)).await,
            None => {
                if let Some(err) = result.error {
                    session.error(BotError::Dialog(err)).await;
                }
                Ok(())
            }
        }
    }

    async fn recognize(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        self.recognizers.recognize(ctx).await
    }

    async fn recognize_action(&self, message: &Message) -> Result<RecognizeResult> {
        Ok(self.actions.recognize_action(message))
    }

    async fn invoke_action(&self, session: &mut S, result: RecognizeResult) -> Result<()> {
        self.actions.invoke_action(session, result).await
    }
}
