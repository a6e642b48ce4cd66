//! Regular-expression intent recognizer, optionally with per-locale expressions.

use std::collections::HashMap;

use async_trait::async_trait;
use dbot_core::{RecognizeContext, RecognizeResult, Result};
use regex::Regex;

use crate::intent_recognizer_set::IntentRecognizer;

/// Scores `matched length / utterance length` for the first match of the locale's expression.
#[derive(Debug, Clone)]
pub struct RegExpRecognizer {
    intent: String,
    expressions: HashMap<String, Regex>,
}

const ANY_LOCALE: &str = "*";

impl RegExpRecognizer {
    pub fn new(intent: impl Into<String>, expression: Regex) -> Self {
        let mut expressions = HashMap::new();
        expressions.insert(ANY_LOCALE.to_string(), expression);
        Self {
            intent: intent.into(),
            expressions,
        }
    }

    /// Expression used for `locale` instead of the locale-independent one.
    pub fn with_locale(mut self, locale: &str, expression: Regex) -> Self {
        self.expressions.insert(locale.to_lowercase(), expression);
        self
    }

    pub fn intent(&self) -> &str {
        &self.intent
    }

    pub fn score(&self, text: &str, locale: &str) -> RecognizeResult {
        let expression = self
            .expressions
            .get(&locale.to_lowercase())
            .or_else(|| self.expressions.get(ANY_LOCALE));
        let Some(expression) = expression else {
            return RecognizeResult::default();
        };
        if text.is_empty() {
            return RecognizeResult::default();
        }
        match expression.captures(text) {
            Some(caps) => {
                let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                let mut result = RecognizeResult::intent(
                    self.intent.clone(),
                    whole.chars().count() as f64 / text.chars().count() as f64,
                );
                result.matched = caps
                    .iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                result
            }
            None => RecognizeResult::default(),
        }
    }
}

#[async_trait]
impl IntentRecognizer for RegExpRecognizer {
    async fn recognize(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        Ok(self.score(ctx.text(), ctx.locale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_match_ratio() {
        let r = RegExpRecognizer::new("greet", Regex::new("(?i)hello").unwrap());
        let result = r.score("hello world", "en");
        assert_eq!(result.intent.as_deref(), Some("greet"));
        assert!((result.score - 5.0 / 11.0).abs() < 1e-9);
        assert_eq!(result.matched, vec!["hello".to_string()]);
    }

    #[test]
    fn test_locale_specific_expression() {
        let r = RegExpRecognizer::new("greet", Regex::new("^hello$").unwrap())
            .with_locale("fr", Regex::new("^bonjour$").unwrap());
        assert_eq!(r.score("bonjour", "FR").score, 1.0);
        assert_eq!(r.score("bonjour", "en").score, 0.0);
        assert_eq!(r.score("hello", "de").score, 1.0);
    }

    #[test]
    fn test_no_match_scores_zero() {
        let r = RegExpRecognizer::new("help", Regex::new("help").unwrap());
        let result = r.score("what?", "en");
        assert_eq!(result.score, 0.0);
        assert!(result.intent.is_none());
    }
}
