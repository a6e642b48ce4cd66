//! Recognizers that turn a reply into a prompt's typed answer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbot_core::{Attachment, PromptType, RecognizeResult, ResumeReason, Result};
use dbot_dialogs::{EntityRecognizer, FoundChoice};
use serde_json::{json, Value};

/// Minimum fuzzy-match score for a reply to count as one of the choices.
pub const CHOICE_THRESHOLD: f64 = 0.6;

/// Everything a prompt recognizer needs about the pending prompt and the reply.
#[derive(Debug, Clone, Copy)]
pub struct PromptRecognizeArgs<'a> {
    pub prompt_type: PromptType,
    pub utterance: &'a str,
    pub locale: &'a str,
    pub attachments: &'a [Attachment],
    /// Choices (choice prompts) or the localized yes/no pair (confirm prompts).
    pub enum_values: &'a [String],
    /// Reference point for relative times; now when `None`.
    pub ref_date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PromptRecognizer: Send + Sync {
    async fn recognize(&self, args: &PromptRecognizeArgs<'_>) -> Result<RecognizeResult>;
}

/// Rule-based recognizer built on [`EntityRecognizer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePromptRecognizer;

impl SimplePromptRecognizer {
    /// Fuzzy match against the choices, else a 1-based choice number.
    pub fn find_choice(enum_values: &[String], text: &str) -> Option<FoundChoice> {
        if let Some(best) = EntityRecognizer::find_best_match(enum_values, text, CHOICE_THRESHOLD) {
            return Some(best);
        }
        let n = EntityRecognizer::parse_number(text)?;
        if n > 0.0 && n <= enum_values.len() as f64 && n.fract() == 0.0 {
            let index = n as usize - 1;
            return Some(FoundChoice {
                index,
                entity: enum_values[index].clone(),
                score: 1.0,
            });
        }
        None
    }

    /// Score and answer for `args`; `(0, None)` when the reply doesn't answer the prompt.
    pub fn score(args: &PromptRecognizeArgs<'_>) -> (f64, Option<Value>) {
        let text = args.utterance.trim();
        let len = text.chars().count() as f64;
        match args.prompt_type {
            PromptType::Text => (0.5, Some(json!(text))),
            PromptType::Number => match EntityRecognizer::parse_number(text) {
                Some(n) if len > 0.0 => {
                    let shown = number_value(n);
                    let score = (shown.to_string().chars().count() as f64 / len).min(1.0);
                    (score, Some(shown))
                }
                _ => (0.0, None),
            },
            PromptType::Confirm => {
                let answer = EntityRecognizer::parse_boolean(text).or_else(|| {
                    Self::find_choice(args.enum_values, text).map(|best| best.index == 0)
                });
                match answer {
                    Some(b) => (1.0, Some(json!(b))),
                    None => (0.0, None),
                }
            }
            PromptType::Time => {
                let now = args.ref_date.unwrap_or_else(Utc::now);
                match EntityRecognizer::recognize_time(text, now) {
                    Some(entity) if len > 0.0 => {
                        let score = entity.entity.chars().count() as f64 / len;
                        (score, serde_json::to_value(entity).ok())
                    }
                    _ => (0.0, None),
                }
            }
            PromptType::Choice => match Self::find_choice(args.enum_values, text) {
                Some(best) => (best.score, serde_json::to_value(best).ok()),
                None => (0.0, None),
            },
            PromptType::Attachment if !args.attachments.is_empty() => {
                (1.0, serde_json::to_value(args.attachments).ok())
            }
            PromptType::Attachment => (0.0, None),
        }
    }
}

/// Integral numbers stay integers in the answer ("42", not "42.0").
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

#[async_trait]
impl PromptRecognizer for SimplePromptRecognizer {
    async fn recognize(&self, args: &PromptRecognizeArgs<'_>) -> Result<RecognizeResult> {
        let (score, response) = Self::score(args);
        let resumed = if score > 0.0 {
            ResumeReason::Completed
        } else {
            ResumeReason::NotCompleted
        };
        Ok(RecognizeResult {
            score,
            response: if score > 0.0 { response } else { None },
            resumed: Some(resumed),
            prompt_type: Some(args.prompt_type),
            ..Default::default()
        })
    }
}
