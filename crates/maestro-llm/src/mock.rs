//! Scripted mock provider for tests
//!
//! Behaves like a real provider but serves a queue of pre-programmed
//! outcomes. When the queue is empty it returns a default success, so
//! tests only script the calls they care about.

use crate::cost::{default_pricing, CostMicros, ModelPricing, DEFAULT_PRICING_KEY};
use crate::error::{Error, Result};
use crate::provider::{
    AiProvider, FinishReason, GenerateOptions, Generation, ProviderHealth, StreamChunk,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A failure the mock can serve
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Provider rate limit
    RateLimit,
    /// Network failure
    Network(String),
    /// API error
    Api(String),
    /// Call timeout
    Timeout(u64),
}

impl From<&MockFailure> for Error {
    fn from(failure: &MockFailure) -> Self {
        match failure {
            MockFailure::RateLimit => Error::RateLimit,
            MockFailure::Network(msg) => Error::Network(msg.clone()),
            MockFailure::Api(msg) => Error::Api(msg.clone()),
            MockFailure::Timeout(ms) => Error::Timeout(*ms),
        }
    }
}

/// One scripted call result
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// A successful generation
    Success {
        /// Content to return
        content: String,
        /// Prompt tokens to report
        tokens_in: u32,
        /// Completion tokens to report
        tokens_out: u32,
        /// Finish reason to report
        finish_reason: FinishReason,
    },
    /// A failed call
    Failure(MockFailure),
}

impl MockOutcome {
    /// A plain success with the given content and default token counts
    #[must_use]
    pub fn success(content: impl Into<String>) -> Self {
        Self::Success {
            content: content.into(),
            tokens_in: 100,
            tokens_out: 200,
            finish_reason: FinishReason::Stop,
        }
    }

    /// A success with explicit token counts
    #[must_use]
    pub fn success_with_tokens(content: impl Into<String>, tokens_in: u32, tokens_out: u32) -> Self {
        Self::Success {
            content: content.into(),
            tokens_in,
            tokens_out,
            finish_reason: FinishReason::Stop,
        }
    }

    /// A success whose output was truncated at the token budget
    #[must_use]
    pub fn truncated(content: impl Into<String>) -> Self {
        Self::Success {
            content: content.into(),
            tokens_in: 100,
            tokens_out: 200,
            finish_reason: FinishReason::Length,
        }
    }
}

/// Scripted provider implementation
pub struct MockProvider {
    name: String,
    default_model: String,
    outcomes: Mutex<VecDeque<MockOutcome>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    pricing: HashMap<String, ModelPricing>,
}

impl MockProvider {
    /// Create a mock registered under the given provider name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_model: "mock-model".into(),
            outcomes: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            delay: None,
            pricing: default_pricing(),
        }
    }

    /// Set the default model id
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Add an artificial per-call delay
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an outcome for a future call
    pub fn queue(&self, outcome: MockOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Queue several outcomes in order
    pub fn queue_all(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        let mut queue = self.outcomes.lock().unwrap();
        queue.extend(outcomes);
    }

    /// Number of generate calls served so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_models(&self) -> Vec<String> {
        vec![self.default_model.clone()]
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn max_output_tokens(&self, _model: &str) -> u32 {
        8192
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<Generation> {
        opts.validate()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockOutcome::success("mock output"));

        match outcome {
            MockOutcome::Success {
                content,
                tokens_in,
                tokens_out,
                finish_reason,
            } => Ok(Generation {
                content,
                model: opts
                    .model
                    .clone()
                    .unwrap_or_else(|| self.default_model.clone()),
                tokens_in,
                tokens_out,
                finish_reason,
                duration_ms: self.delay.map_or(1, |d| d.as_millis() as u64),
            }),
            MockOutcome::Failure(failure) => Err(Error::from(&failure)),
        }
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let generation = self.generate(prompt, opts).await?;
        let mut chunks: Vec<Result<StreamChunk>> = generation
            .content
            .split_inclusive(' ')
            .map(|piece| {
                Ok(StreamChunk {
                    content: piece.to_string(),
                    done: false,
                })
            })
            .collect();
        chunks.push(Ok(StreamChunk {
            content: String::new(),
            done: true,
        }));
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy(0)
    }

    fn estimate_cost(&self, tokens_in: u32, tokens_out: u32, model: Option<&str>) -> CostMicros {
        let model = model.unwrap_or(&self.default_model);
        let pricing = self
            .pricing
            .get(model)
            .or_else(|| self.pricing.get(DEFAULT_PRICING_KEY));
        match pricing {
            Some(p) => p.calculate_cost(tokens_in, tokens_out),
            None => CostMicros::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let mock = MockProvider::named("mock");
        mock.queue(MockOutcome::success("first"));
        mock.queue(MockOutcome::Failure(MockFailure::RateLimit));

        let opts = GenerateOptions::new();
        let first = mock.generate("a", &opts).await.unwrap();
        assert_eq!(first.content, "first");

        let err = mock.generate("b", &opts).await.unwrap_err();
        assert!(matches!(err, Error::RateLimit));

        // Queue exhausted: default success
        let third = mock.generate("c", &opts).await.unwrap();
        assert_eq!(third.content, "mock output");
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stream_chunks_end_with_done() {
        let mock = MockProvider::named("mock");
        mock.queue(MockOutcome::success("one two"));

        let mut stream = mock
            .generate_stream("x", &GenerateOptions::new())
            .await
            .unwrap();

        let mut collected = String::new();
        let mut saw_done = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            collected.push_str(&chunk.content);
            if chunk.done {
                saw_done = true;
                break;
            }
        }
        assert_eq!(collected, "one two");
        assert!(saw_done);
    }
}
