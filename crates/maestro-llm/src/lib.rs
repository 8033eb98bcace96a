//! Maestro LLM - AI provider abstraction
//!
//! This crate provides text generation for Maestro:
//! - Provider: the generation trait and per-name registry
//! - Anthropic: Claude Messages API client
//! - Ollama: local daemon client (free generations)
//! - Mock: scripted provider for tests
//! - Cost: micro-USD pricing tables and usage tracking
//! - Util: code-block and JSON extraction from model output

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod cost;
pub mod error;
pub mod message;
pub mod mock;
pub mod ollama;
pub mod provider;
pub mod util;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use cost::{
    default_pricing, CostMicros, CostTracker, DailyCost, ModelPricing, UsageRecord, UsageStats,
};
pub use error::{Error, Result};
pub use message::{Message, MessageRole};
pub use mock::{MockFailure, MockOutcome, MockProvider};
pub use ollama::{OllamaConfig, OllamaProvider};
pub use provider::{
    AiProvider, FinishReason, GenerateOptions, Generation, ProviderHealth, ProviderRegistry,
    StreamChunk,
};
pub use util::{build_messages, extract_code_blocks, extract_json, CodeBlock};
