//! Anthropic Claude provider
//!
//! Client for the Anthropic Messages API implementing [`AiProvider`].

use crate::cost::{default_pricing, CostMicros, ModelPricing, DEFAULT_PRICING_KEY};
use crate::error::{Error, Result};
use crate::provider::{
    AiProvider, FinishReason, GenerateOptions, Generation, ProviderHealth, StreamChunk,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// API version header value
const API_VERSION: &str = "2023-06-01";

/// Models this provider serves
const MODELS: &[&str] = &[
    "claude-opus-4-5-20251101",
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
];

/// Hard output-token ceiling across served models
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Default per-request token budget
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic provider configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key
    pub api_key: String,
    /// API base URL
    pub base_url: String,
    /// Default model id
    pub default_model: String,
    /// Request timeout
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Build a config from `ANTHROPIC_API_KEY` (and optional
    /// `ANTHROPIC_BASE_URL`, `ANTHROPIC_MODEL`)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::NotConfigured("ANTHROPIC_API_KEY is not set".into()))?;
        Ok(Self {
            api_key,
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".into()),
            default_model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".into()),
            timeout: Duration::from_secs(120),
        })
    }
}

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
    pricing: HashMap<String, ModelPricing>,
}

impl AnthropicProvider {
    /// Create a provider from a config
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self {
            client,
            config,
            pricing: default_pricing(),
        })
    }

    /// Create a provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(AnthropicConfig::from_env()?)
    }

    fn build_request(&self, prompt: &str, opts: &GenerateOptions, stream: bool) -> ApiRequest {
        let model = opts
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        ApiRequest {
            model,
            max_tokens: opts
                .max_tokens
                .unwrap_or(DEFAULT_MAX_TOKENS)
                .min(MAX_OUTPUT_TOKENS),
            messages: vec![ApiMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            system: opts.system_prompt.clone(),
            temperature: opts.temperature,
            stop_sequences: opts.stop_sequences.clone(),
            stream,
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.config.base_url);
        debug!(model = %request.model, "Sending request to Anthropic");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.config.timeout.as_millis() as u64)
                } else {
                    Error::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(Error::RateLimit);
            }
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
                return Err(Error::Api(format!("{}: {}", err.error.kind, err.error.message)));
            }
            return Err(Error::Api(format!("HTTP {status}")));
        }
        Ok(response)
    }

    fn map_stop_reason(stop_reason: Option<&str>) -> FinishReason {
        match stop_reason {
            Some("end_turn" | "stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            None => FinishReason::Stop,
            Some(_) => FinishReason::Error,
        }
    }
}

#[async_trait::async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn list_models(&self) -> Vec<String> {
        MODELS.iter().map(|s| (*s).to_string()).collect()
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn max_output_tokens(&self, _model: &str) -> u32 {
        MAX_OUTPUT_TOKENS
    }

    #[instrument(skip(self, prompt, opts), fields(provider = "anthropic"))]
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<Generation> {
        opts.validate()?;
        let request = self.build_request(prompt, opts, false);
        let started = Instant::now();

        let response = self.send(&request).await?;
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let content: String = body
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        Ok(Generation {
            content,
            model: body.model,
            tokens_in: body.usage.input_tokens,
            tokens_out: body.usage.output_tokens,
            finish_reason: Self::map_stop_reason(body.stop_reason.as_deref()),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        opts.validate()?;
        let request = self.build_request(prompt, opts, true);
        let response = self.send(&request).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<StreamChunk>>(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(Error::Network(e.to_string()))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
                        continue;
                    };
                    match value["type"].as_str() {
                        Some("content_block_delta") => {
                            if let Some(text) = value["delta"]["text"].as_str() {
                                if tx
                                    .send(Ok(StreamChunk {
                                        content: text.to_string(),
                                        done: false,
                                    }))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                        Some("message_stop") => {
                            let _ = tx
                                .send(Ok(StreamChunk {
                                    content: String::new(),
                                    done: true,
                                }))
                                .await;
                            return;
                        }
                        _ => {}
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    async fn health_check(&self) -> ProviderHealth {
        let opts = GenerateOptions::new()
            .with_model("claude-3-5-haiku-20241022")
            .with_max_tokens(8);
        let started = Instant::now();
        match self.generate("ping", &opts).await {
            Ok(_) => ProviderHealth::healthy(started.elapsed().as_millis() as u64),
            Err(e) => ProviderHealth::unhealthy(e.to_string()),
        }
    }

    fn estimate_cost(&self, tokens_in: u32, tokens_out: u32, model: Option<&str>) -> CostMicros {
        let model = model.unwrap_or(&self.config.default_model);
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

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(AnthropicProvider::map_stop_reason(Some("end_turn")), FinishReason::Stop);
        assert_eq!(
            AnthropicProvider::map_stop_reason(Some("stop_sequence")),
            FinishReason::Stop
        );
        assert_eq!(
            AnthropicProvider::map_stop_reason(Some("max_tokens")),
            FinishReason::Length
        );
        assert_eq!(AnthropicProvider::map_stop_reason(Some("refusal")), FinishReason::Error);
        assert_eq!(AnthropicProvider::map_stop_reason(None), FinishReason::Stop);
    }

    #[test]
    fn test_request_clamps_max_tokens() {
        let provider = AnthropicProvider::new(AnthropicConfig {
            api_key: "test-key-1234567890".into(),
            base_url: "http://localhost".into(),
            default_model: "claude-3-5-sonnet-20241022".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let request =
            provider.build_request("x", &GenerateOptions::new().with_max_tokens(1_000_000), false);
        assert_eq!(request.max_tokens, MAX_OUTPUT_TOKENS);

        let request = provider.build_request("x", &GenerateOptions::new(), false);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
    }
}
