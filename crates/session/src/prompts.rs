//! Built-in prompts: ask the user for a typed value and hand it back to the caller.
//!
//! A prompt is an ordinary dialog (`BotBuilder:Prompts`) that keeps its
//! arguments in its dialog data, re-asks on unrecognized replies, and ends
//! with the recognized answer as its result.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbot_core::consts::{dialog_id, library};
use dbot_core::{
    BotError, DataMap, Dialog, DialogResult, Message, PromptType, RecognizeContext,
    RecognizeResult, ResumeReason, Result,
};
use dbot_dialogs::{Choices, EntityRecognizer};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::channel;
use crate::prompt_recognizer::{PromptRecognizeArgs, PromptRecognizer, SimplePromptRecognizer};
use crate::session::Session;

/// How the choices of a choice or confirm prompt are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStyle {
    /// Prompt text only.
    None,
    /// `Pick (1. Red or 2. Blue)`
    Inline,
    /// One numbered choice per line.
    List,
    /// Keyboard buttons.
    Button,
    /// Buttons when the channel supports them, otherwise inline for short lists and list for long ones.
    #[default]
    Auto,
}

/// Text (or message) of a prompt. Variants are picked at random each time the prompt is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Variants(Vec<String>),
    Message(Box<Message>),
}

impl Prompt {
    fn pick(&self) -> String {
        match self {
            Prompt::Text(text) => text.clone(),
            Prompt::Variants(variants) => variants
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_default(),
            Prompt::Message(message) => message.text.clone(),
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<String>> for Prompt {
    fn from(variants: Vec<String>) -> Self {
        Prompt::Variants(variants)
    }
}

impl From<Message> for Prompt {
    fn from(message: Message) -> Self {
        Prompt::Message(Box::new(message))
    }
}

/// Caller-supplied prompt settings.
#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    pub retry_prompt: Option<Prompt>,
    /// Re-asks allowed before the prompt gives up with `notCompleted`; unlimited when `None`.
    pub max_retries: Option<u32>,
    pub list_style: Option<ListStyle>,
    /// Re-send the prompt after an interrupting action returns; the [`Prompts`] default when `None`.
    pub prompt_after_action: Option<bool>,
    pub localization_namespace: Option<String>,
    /// Reference time for relative time answers.
    pub ref_date: Option<DateTime<Utc>>,
}

/// Arguments of a running prompt, kept in its dialog data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptArgs {
    pub prompt_type: PromptType,
    pub prompt: Prompt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_prompt: Option<Prompt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub list_style: ListStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_cnt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_after_action: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localization_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_date: Option<DateTime<Utc>>,
}

impl PromptArgs {
    pub fn new(prompt_type: PromptType, prompt: Prompt, options: PromptOptions) -> Self {
        Self {
            prompt_type,
            prompt,
            retry_prompt: options.retry_prompt,
            enum_values: Vec::new(),
            list_style: options.list_style.unwrap_or_default(),
            max_retries: options.max_retries,
            retry_cnt: 0,
            prompt_after_action: options.prompt_after_action,
            localization_namespace: options.localization_namespace,
            ref_date: options.ref_date,
        }
    }

    fn from_dialog_data(data: &DataMap) -> Result<Self> {
        serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| BotError::InvalidState(format!("prompt dialog data: {}", e)))
    }
}

/// Retry text used when a prompt has no retry prompt of its own.
pub fn default_retry_prompt(prompt_type: PromptType) -> &'static str {
    match prompt_type {
        PromptType::Text => "default_text",
        PromptType::Number => "default_number",
        PromptType::Confirm => "default_confirm",
        PromptType::Choice => "default_choice",
        PromptType::Time => "default_time",
        PromptType::Attachment => "default_file",
    }
}

/// The prompts dialog.
#[derive(Clone)]
pub struct Prompts {
    recognizer: Arc<dyn PromptRecognizer>,
    prompt_after_action: bool,
}

impl Default for Prompts {
    fn default() -> Self {
        Self::new(Arc::new(SimplePromptRecognizer))
    }
}

impl Prompts {
    pub fn new(recognizer: Arc<dyn PromptRecognizer>) -> Self {
        Self {
            recognizer,
            prompt_after_action: true,
        }
    }

    pub fn with_prompt_after_action(mut self, enabled: bool) -> Self {
        self.prompt_after_action = enabled;
        self
    }

    /// Asks for free text.
    pub async fn text(session: &mut Session, prompt: impl Into<Prompt> + Send, options: PromptOptions) -> Result<()> {
        let args = PromptArgs::new(PromptType::Text, prompt.into(), options);
        Self::begin_prompt(session, args).await
    }

    pub async fn number(session: &mut Session, prompt: impl Into<Prompt> + Send, options: PromptOptions) -> Result<()> {
        let args = PromptArgs::new(PromptType::Number, prompt.into(), options);
        Self::begin_prompt(session, args).await
    }

    /// Asks a yes/no question; the localized yes/no words double as the choices.
    pub async fn confirm(session: &mut Session, prompt: impl Into<Prompt> + Send, options: PromptOptions) -> Result<()> {
        let locale = session.preferred_locale();
        let localizer = session.localizer().clone();
        let mut args = PromptArgs::new(PromptType::Confirm, prompt.into(), options);
        args.enum_values = vec![
            localizer.gettext(&locale, "confirm_yes", Some(library::SYSTEM)),
            localizer.gettext(&locale, "confirm_no", Some(library::SYSTEM)),
        ];
        Self::begin_prompt(session, args).await
    }

    /// Asks the user to pick one of `choices` (`"red|green|blue"` or `["red", "green"]`).
    pub async fn choice(
        session: &mut Session,
        prompt: impl Into<Prompt> + Send,
        choices: impl Into<Choices> + Send,
        options: PromptOptions,
    ) -> Result<()> {
        let enum_values = EntityRecognizer::expand_choices(choices);
        if enum_values.is_empty() {
            return Err(BotError::InvalidArgument(
                "0 length choice list supplied".to_string(),
            ));
        }
        let mut args = PromptArgs::new(PromptType::Choice, prompt.into(), options);
        args.enum_values = enum_values;
        Self::begin_prompt(session, args).await
    }

    pub async fn time(session: &mut Session, prompt: impl Into<Prompt> + Send, options: PromptOptions) -> Result<()> {
        let args = PromptArgs::new(PromptType::Time, prompt.into(), options);
        Self::begin_prompt(session, args).await
    }

    pub async fn attachment(session: &mut Session, prompt: impl Into<Prompt> + Send, options: PromptOptions) -> Result<()> {
        let args = PromptArgs::new(PromptType::Attachment, prompt.into(), options);
        Self::begin_prompt(session, args).await
    }

    async fn begin_prompt(session: &mut Session, args: PromptArgs) -> Result<()> {
        let args = serde_json::to_value(args)?;
        session.begin_dialog(dialog_id::PROMPTS, Some(args)).await
    }

    fn list_style(session: &Session, args: &PromptArgs, retry: bool) -> ListStyle {
        if !matches!(args.prompt_type, PromptType::Choice | PromptType::Confirm) {
            return ListStyle::None;
        }
        match args.list_style {
            ListStyle::Auto => {
                let count = args.enum_values.len();
                if channel::supports_keyboards(&session.message.address.channel_id, count) {
                    ListStyle::Button
                } else if !retry && args.prompt_type == PromptType::Choice {
                    if count < 3 {
                        ListStyle::Inline
                    } else {
                        ListStyle::List
                    }
                } else {
                    ListStyle::None
                }
            }
            style => style,
        }
    }

    fn render(session: &Session, args: &PromptArgs, retry: bool) -> Message {
        if retry {
            if let Some(Prompt::Message(message)) = &args.retry_prompt {
                return (**message).clone();
            }
        }
        if let Prompt::Message(message) = &args.prompt {
            return (**message).clone();
        }

        let style = Self::list_style(session, args, retry);
        let (prompt, namespace) = match (retry, &args.retry_prompt) {
            (true, Some(retry_prompt)) => (retry_prompt.pick(), args.localization_namespace.as_deref()),
            (true, None) => (
                default_retry_prompt(args.prompt_type).to_string(),
                Some(library::SYSTEM),
            ),
            (false, _) => (args.prompt.pick(), args.localization_namespace.as_deref()),
        };
        let locale = session.preferred_locale();
        let localizer = session.localizer();
        let text = localizer.gettext(&locale, &prompt, namespace);

        match style {
            ListStyle::Button => channel::keyboard(text, &args.enum_values),
            ListStyle::Inline => {
                let count = args.enum_values.len();
                let mut list = String::from(" (");
                let mut connector = String::new();
                for (index, value) in args.enum_values.iter().enumerate() {
                    list.push_str(&connector);
                    let value = localizer.gettext(&locale, value, Some(library::SYSTEM));
                    list.push_str(&format!("{}. {}", index + 1, value));
                    connector = if index + 2 == count {
                        let key = if index == 0 { "list_or" } else { "list_or_more" };
                        localizer.gettext(&locale, key, Some(library::SYSTEM))
                    } else {
                        ", ".to_string()
                    };
                }
                list.push(')');
                Message::text(text + &list)
            }
            ListStyle::List => {
                let mut list = String::new();
                for (index, value) in args.enum_values.iter().enumerate() {
                    let value = localizer.gettext(&locale, value, namespace);
                    list.push_str(&format!("\n   {}. {}", index + 1, value));
                }
                Message::text(text + &list)
            }
            ListStyle::None | ListStyle::Auto => Message::text(text),
        }
    }

    async fn send_prompt(&self, session: &mut Session, args: &PromptArgs, retry: bool) {
        debug!(prompt_type = args.prompt_type.as_str(), retry, "prompts.send_prompt");
        let message = Self::render(session, args, retry);
        session.send(message);
        session.send_batch().await;
    }
}

#[async_trait]
impl Dialog<Session> for Prompts {
    async fn begin(&self, session: &mut Session, args: Option<Value>) -> Result<()> {
        let args = args.ok_or_else(|| BotError::InvalidArgument("prompt arguments missing".to_string()))?;
        let mut args: PromptArgs = serde_json::from_value(args)
            .map_err(|e| BotError::InvalidArgument(format!("prompt arguments: {}", e)))?;
        args.prompt_after_action.get_or_insert(self.prompt_after_action);
        args.retry_cnt = 0;
        if let Value::Object(map) = serde_json::to_value(&args)? {
            session.dialog_data_mut().extend(map);
        }
        self.send_prompt(session, &args, false).await;
        Ok(())
    }

    async fn reply_received(&self, session: &mut Session, result: RecognizeResult) -> Result<()> {
        let mut args = PromptArgs::from_dialog_data(session.dialog_data())?;
        if result.error.is_some() || result.resumed == Some(ResumeReason::Completed) {
            let result = RecognizeResult {
                prompt_type: Some(args.prompt_type),
                ..result
            };
            session.end_dialog_with_result(DialogResult::from(result)).await
        } else if args.max_retries.is_some_and(|max| args.retry_cnt >= max) {
            debug!(retries = args.retry_cnt, "prompt retries exhausted");
            let result = DialogResult {
                prompt_type: Some(args.prompt_type),
                ..DialogResult::with_reason(ResumeReason::NotCompleted)
            };
            session.end_dialog_with_result(result).await
        } else {
            args.retry_cnt += 1;
            session
                .dialog_data_mut()
                .insert("retryCnt".to_string(), json!(args.retry_cnt));
            self.send_prompt(session, &args, true).await;
            Ok(())
        }
    }

    async fn dialog_resumed(&self, session: &mut Session, result: DialogResult) -> Result<()> {
        if let Some(err) = result.error {
            session.error(BotError::Dialog(err)).await;
            return Ok(());
        }
        let args = PromptArgs::from_dialog_data(session.dialog_data())?;
        if args.prompt_after_action.unwrap_or(self.prompt_after_action) {
            self.send_prompt(session, &args, false).await;
        }
        Ok(())
    }

    async fn recognize(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        let args = PromptArgs::from_dialog_data(ctx.dialog_data)?;
        let recognize_args = PromptRecognizeArgs {
            prompt_type: args.prompt_type,
            utterance: &ctx.message.text,
            locale: ctx.locale,
            attachments: &ctx.message.attachments,
            enum_values: &args.enum_values,
            ref_date: args.ref_date,
        };
        self.recognizer.recognize(&recognize_args).await
    }
}
