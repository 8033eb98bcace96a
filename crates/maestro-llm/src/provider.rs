//! AI provider trait definition and registry
//!
//! All text-generation backends implement [`AiProvider`]. Multiple
//! implementations coexist behind a [`ProviderRegistry`] keyed by provider
//! name.

use crate::cost::CostMicros;
use crate::error::{Error, Result};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Why a generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence
    Stop,
    /// Output was truncated at the token budget
    Length,
    /// Provider reported an error finish
    Error,
}

impl FinishReason {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::Error => "error",
        }
    }
}

/// Result of a completed generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text
    pub content: String,
    /// Model that produced the output
    pub model: String,
    /// Prompt tokens consumed
    pub tokens_in: u32,
    /// Completion tokens produced
    pub tokens_out: u32,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// Wall-clock duration of the call
    pub duration_ms: u64,
}

/// One element of a generation stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta (empty on the final chunk)
    pub content: String,
    /// Whether the stream is finished
    pub done: bool,
}

/// Provider health probe result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Whether the provider responded
    pub healthy: bool,
    /// Probe latency when healthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Failure description when unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderHealth {
    /// A healthy probe with the given latency
    #[must_use]
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    /// An unhealthy probe with a reason
    #[must_use]
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Options for a single generation call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Model override (provider default when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature, 0.0 - 2.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate, must be positive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Per-call timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl GenerateOptions {
    /// Create default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the token budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Validate option ranges
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::InvalidOptions(format!(
                    "temperature {t} outside [0, 2]"
                )));
            }
        }
        if let Some(m) = self.max_tokens {
            if m == 0 {
                return Err(Error::InvalidOptions("max_tokens must be positive".into()));
            }
        }
        Ok(())
    }
}

/// Abstract text-generation interface
#[async_trait::async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name ("anthropic", "ollama", ...)
    fn name(&self) -> &str;

    /// Models this provider can serve
    fn list_models(&self) -> Vec<String>;

    /// Default model id
    fn default_model(&self) -> &str;

    /// Hard upper bound on output tokens for a model
    fn max_output_tokens(&self, model: &str) -> u32;

    /// Generate a completion for a prompt
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<Generation>;

    /// Generate a completion as a stream of chunks
    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>>;

    /// Probe provider availability
    async fn health_check(&self) -> ProviderHealth;

    /// Estimated cost of a call against this provider
    fn estimate_cost(&self, tokens_in: u32, tokens_out: u32, model: Option<&str>) -> CostMicros;
}

/// Registry of coexisting provider implementations, keyed by name
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn AiProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Duplicate names are rejected.
    pub fn register(&mut self, provider: Arc<dyn AiProvider>) -> Result<()> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(Error::Duplicate(name));
        }
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Look up a provider by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn AiProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Health of every registered provider
    pub async fn health(&self) -> HashMap<String, ProviderHealth> {
        let mut out = HashMap::new();
        for (name, provider) in &self.providers {
            out.insert(name.clone(), provider.health_check().await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_validation() {
        assert!(GenerateOptions::new().validate().is_ok());
        assert!(GenerateOptions::new().with_temperature(2.0).validate().is_ok());
        assert!(GenerateOptions::new().with_temperature(2.1).validate().is_err());
        assert!(GenerateOptions::new().with_temperature(-0.1).validate().is_err());
        assert!(GenerateOptions::new().with_max_tokens(0).validate().is_err());
        assert!(GenerateOptions::new().with_max_tokens(1).validate().is_ok());
    }
}
