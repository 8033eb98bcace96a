//! Local Ollama provider
//!
//! Talks to a local Ollama daemon over HTTP. Local generations are free,
//! so `estimate_cost` always returns zero.

use crate::cost::CostMicros;
use crate::error::{Error, Result};
use crate::provider::{
    AiProvider, FinishReason, GenerateOptions, Generation, ProviderHealth, StreamChunk,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Default output-token ceiling for local models
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Daemon base URL
    pub base_url: String,
    /// Default model id
    pub default_model: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            default_model: "codellama:7b".into(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl OllamaConfig {
    /// Build a config from `OLLAMA_BASE_URL` / `OLLAMA_MODEL` with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.default_model = model;
        }
        config
    }
}

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    options: ApiOptions,
}

#[derive(Serialize)]
struct ApiOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Local Ollama provider
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a provider from a config
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create a provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    fn build_request(&self, prompt: &str, opts: &GenerateOptions, stream: bool) -> ApiRequest {
        ApiRequest {
            model: opts
                .model
                .clone()
                .unwrap_or_else(|| self.config.default_model.clone()),
            prompt: prompt.to_string(),
            stream,
            system: opts.system_prompt.clone(),
            options: ApiOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
                stop: opts.stop_sequences.clone(),
            },
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.config.base_url);
        debug!(model = %request.model, "Sending request to Ollama");

        let response = self
            .client
            .post(&url)
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
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn list_models(&self) -> Vec<String> {
        vec![self.config.default_model.clone()]
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn max_output_tokens(&self, _model: &str) -> u32 {
        MAX_OUTPUT_TOKENS
    }

    #[instrument(skip(self, prompt, opts), fields(provider = "ollama"))]
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<Generation> {
        opts.validate()?;
        let request = self.build_request(prompt, opts, false);
        let started = Instant::now();

        let response = self.send(&request).await?;
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let finish_reason = match body.done_reason.as_deref() {
            Some("length") => FinishReason::Length,
            _ if body.done => FinishReason::Stop,
            _ => FinishReason::Error,
        };

        Ok(Generation {
            content: body.response,
            model: body.model,
            tokens_in: body.prompt_eval_count,
            tokens_out: body.eval_count,
            finish_reason,
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

                // Ollama streams newline-delimited JSON objects
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }
                    let Ok(part) = serde_json::from_str::<ApiResponse>(&line) else {
                        continue;
                    };
                    let done = part.done;
                    if tx
                        .send(Ok(StreamChunk {
                            content: part.response,
                            done,
                        }))
                        .await
                        .is_err()
                        || done
                    {
                        return;
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
        let url = format!("{}/api/tags", self.config.base_url);
        let started = Instant::now();
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                // A reachable daemon without the configured model is degraded
                match response.json::<TagsResponse>().await {
                    Ok(tags)
                        if tags
                            .models
                            .iter()
                            .any(|m| m.name == self.config.default_model) =>
                    {
                        ProviderHealth::healthy(started.elapsed().as_millis() as u64)
                    }
                    Ok(_) => ProviderHealth::unhealthy(format!(
                        "model {} not pulled",
                        self.config.default_model
                    )),
                    Err(e) => ProviderHealth::unhealthy(e.to_string()),
                }
            }
            Ok(response) => ProviderHealth::unhealthy(format!("HTTP {}", response.status())),
            Err(e) => ProviderHealth::unhealthy(e.to_string()),
        }
    }

    fn estimate_cost(&self, _tokens_in: u32, _tokens_out: u32, _model: Option<&str>) -> CostMicros {
        CostMicros::ZERO
    }
}
