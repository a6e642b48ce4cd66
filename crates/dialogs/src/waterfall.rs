//! Waterfalls: a fixed sequence of step functions driven by an index kept in dialog data.
//!
//! Step `n` typically prompts the user and returns [`StepResult::Wait`]; when the child dialog
//! ends, the waterfall resumes and runs step `n + 1` with the child's result (`n - 1` when the
//! result says `back`). Running past either end ends the waterfall's dialog with that result.

use std::sync::Arc;

use async_trait::async_trait;
use dbot_core::consts::data::WATERFALL_STEP;
use dbot_core::{Dialog, DialogResult, DialogSession, RecognizeResult, Result, ResumeReason};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

/// Input to a waterfall step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepArgs {
    /// First step of a waterfall begun as a dialog.
    Begin(Option<Value>),
    /// First step of a waterfall invoked for a recognized intent.
    Intent(RecognizeResult),
    /// Result of the previous step's child dialog (or of a skip).
    Resumed(DialogResult),
}

impl StepArgs {
    pub fn response(&self) -> Option<&Value> {
        match self {
            StepArgs::Begin(args) => args.as_ref(),
            StepArgs::Intent(r) => r.response.as_ref(),
            StepArgs::Resumed(r) => r.response.as_ref(),
        }
    }

    pub fn resumed(&self) -> Option<ResumeReason> {
        match self {
            StepArgs::Resumed(r) => Some(r.resumed),
            _ => None,
        }
    }

    pub fn intent(&self) -> Option<&RecognizeResult> {
        match self {
            StepArgs::Intent(r) => Some(r),
            _ => None,
        }
    }
}

/// What a step wants to happen next.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Wait for a child dialog or the user's next reply.
    Wait,
    /// Run the next step now with this result (skip).
    Next(DialogResult),
}

impl StepResult {
    /// Skip forward without a response.
    pub fn next() -> Self {
        StepResult::Next(DialogResult::with_reason(ResumeReason::Forward))
    }

    pub fn next_with(response: Value) -> Self {
        StepResult::Next(DialogResult {
            response: Some(response),
            ..DialogResult::with_reason(ResumeReason::Forward)
        })
    }
}

pub type StepFn<S> =
    dyn for<'a> Fn(&'a mut S, StepArgs) -> BoxFuture<'a, Result<StepResult>> + Send + Sync;

pub struct Waterfall<S> {
    steps: Vec<Arc<StepFn<S>>>,
}

impl<S> Clone for Waterfall<S> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<S> Default for Waterfall<S> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<S: DialogSession> Waterfall<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn step<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut S, StepArgs) -> BoxFuture<'a, Result<StepResult>> + Send + Sync + 'static,
    {
        self.steps.push(Arc::new(f));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the step selected by `args` and keeps going while steps skip forward.
    pub async fn run(&self, session: &mut S, args: StepArgs) -> Result<()> {
        let mut args = args;
        loop {
            let step = match &args {
                StepArgs::Resumed(r) => {
                    let current = session.dialog_data().get(WATERFALL_STEP).and_then(Value::as_i64);
                    match (current, r.resumed) {
                        (Some(cur), ResumeReason::Back) => Some(cur - 1),
                        (Some(cur), _) => Some(cur + 1),
                        (None, _) => None,
                    }
                }
                _ if self.steps.is_empty() => None,
                _ => Some(0),
            };

            let index = match step {
                Some(i) if i >= 0 && (i as usize) < self.steps.len() => i as usize,
                _ => {
                    let result = match args {
                        StepArgs::Resumed(r) => r,
                        _ => DialogResult::with_reason(ResumeReason::Forward),
                    };
                    debug!(resumed = ?result.resumed, "waterfall finished");
                    return session.end_dialog_with_result(result).await;
                }
            };

            debug!(step = index, "waterfall step");
            session
                .dialog_data_mut()
                .insert(WATERFALL_STEP.to_string(), json!(index));
            match (self.steps[index])(session, args).await? {
                StepResult::Wait => return Ok(()),
                StepResult::Next(result) => args = StepArgs::Resumed(result),
            }
        }
    }
}

#[async_trait]
impl<S: DialogSession + 'static> Dialog<S> for Waterfall<S> {
    async fn begin(&self, session: &mut S, args: Option<Value>) -> Result<()> {
        self.run(session, StepArgs::Begin(args)).await
    }

    /// A plain reply (no prompt) answers the current step with the message text.
    async fn reply_received(&self, session: &mut S, result: RecognizeResult) -> Result<()> {
        let response = result
            .response
            .unwrap_or_else(|| Value::String(session.message().text.clone()));
        let resumed = DialogResult::completed(Some(response));
        self.run(session, StepArgs::Resumed(resumed)).await
    }

    async fn dialog_resumed(&self, session: &mut S, result: DialogResult) -> Result<()> {
        self.run(session, StepArgs::Resumed(result)).await
    }
}
