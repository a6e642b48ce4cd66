//! Aggregates scores from several [`IntentRecognizer`]s for one utterance.

use std::sync::Arc;

use async_trait::async_trait;
use dbot_core::{RecognizeContext, RecognizeResult, Result};
use futures::{stream, StreamExt, TryStreamExt};
use tracing::debug;

/// Pluggable scorer mapping an utterance to an intent and a confidence.
#[async_trait]
pub trait IntentRecognizer: Send + Sync {
    async fn recognize(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizeOrder {
    /// All recognizers run concurrently (bounded by `process_limit`).
    Parallel,
    /// Recognizers run one after another in registration order.
    Series,
}

#[derive(Debug, Clone)]
pub struct IntentRecognizerSetOptions {
    /// Minimum score for a result to count.
    pub intent_threshold: f64,
    pub recognize_order: RecognizeOrder,
    /// Series mode: stop once a recognizer scores 1.0.
    pub stop_if_exact_match: bool,
    /// Parallel mode: maximum recognizers in flight.
    pub process_limit: usize,
}

impl Default for IntentRecognizerSetOptions {
    fn default() -> Self {
        Self {
            intent_threshold: 0.1,
            recognize_order: RecognizeOrder::Parallel,
            stop_if_exact_match: true,
            process_limit: 4,
        }
    }
}

#[derive(Clone, Default)]
pub struct IntentRecognizerSet {
    options: IntentRecognizerSetOptions,
    recognizers: Vec<Arc<dyn IntentRecognizer>>,
}

impl IntentRecognizerSet {
    pub fn new(options: IntentRecognizerSetOptions) -> Self {
        Self {
            options,
            recognizers: Vec::new(),
        }
    }

    pub fn options(&self) -> &IntentRecognizerSetOptions {
        &self.options
    }

    /// Appends a recognizer.
    pub fn recognizer(mut self, recognizer: Arc<dyn IntentRecognizer>) -> Self {
        self.recognizers.push(recognizer);
        self
    }

    pub fn add(&mut self, recognizer: Arc<dyn IntentRecognizer>) {
        self.recognizers.push(recognizer);
    }

    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }

    /// Best result at or above the threshold, or a zero score. The first error aborts.
    pub async fn recognize(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        let result = match self.options.recognize_order {
            RecognizeOrder::Parallel => self.recognize_in_parallel(ctx).await?,
            RecognizeOrder::Series => self.recognize_in_series(ctx).await?,
        };
        debug!(intent = ?result.intent, score = result.score, "intent recognizers done");
        Ok(result)
    }

    fn accept(&self, best: &RecognizeResult, candidate: &RecognizeResult) -> bool {
        candidate.score > best.score && candidate.score >= self.options.intent_threshold
    }

    async fn recognize_in_parallel(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        let limit = self.options.process_limit.max(1);
        let futures: Vec<_> = self
            .recognizers
            .iter()
            .enumerate()
            .map(|(i, recognizer)| async move { recognizer.recognize(ctx).await.map(|r| (i, r)) })
            .collect();
        let mut results: Vec<(usize, RecognizeResult)> = stream::iter(futures)
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        // Completion order must not matter: ties go to the earliest registered recognizer.
        results.sort_by_key(|(i, _)| *i);
        let mut best = RecognizeResult::default();
        for (_, candidate) in results {
            if self.accept(&best, &candidate) {
                best = candidate;
            }
        }
        Ok(best)
    }

    async fn recognize_in_series(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        let mut best = RecognizeResult::default();
        for recognizer in &self.recognizers {
            if best.score >= 1.0 && self.options.stop_if_exact_match {
                break;
            }
            let candidate = recognizer.recognize(ctx).await?;
            if self.accept(&best, &candidate) {
                best = candidate;
            }
        }
        Ok(best)
    }
}

#[async_trait]
impl IntentRecognizer for IntentRecognizerSet {
    async fn recognize(&self, ctx: &RecognizeContext<'_>) -> Result<RecognizeResult> {
        IntentRecognizerSet::recognize(self, ctx).await
    }
}
