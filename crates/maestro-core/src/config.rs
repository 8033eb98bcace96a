//! Application configuration
//!
//! Environment-driven settings under the `MAESTRO_` prefix, with defaults
//! that work for a local in-process run.

use crate::modes::Mode;
use serde::{Deserialize, Serialize};

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// One JSON document per command
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {s}")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of a remote orchestrator API, when one is used
    pub api_url: String,
    /// API key for the remote API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Mode used when a submission names none
    pub default_mode: Mode,
    /// CLI output format
    pub output_format: OutputFormat,
    /// Default project path for `project init`
    pub project_path: String,
    /// Worker pool size
    pub max_workers: usize,
    /// Agent registry concurrency cap
    pub agent_cap: usize,
    /// Per-subscriber fan-out buffer
    pub fanout_buffer: usize,
    /// Events per aggregate between snapshots
    pub snapshot_interval: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8700".into(),
            api_key: None,
            default_mode: Mode::Quality,
            output_format: OutputFormat::Text,
            project_path: ".".into(),
            max_workers: 4,
            agent_cap: 4,
            fanout_buffer: 64,
            snapshot_interval: 50,
        }
    }
}

impl AppConfig {
    /// Load configuration from `MAESTRO_*` environment variables,
    /// falling back to defaults for anything unset or unparsable
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// Apply `MAESTRO_*` environment overrides on top of this config
    #[must_use]
    pub fn overlay_env(self) -> Self {
        let mut config = self;
        if let Ok(url) = std::env::var("MAESTRO_API_URL") {
            config.api_url = url;
        }
        if let Ok(key) = std::env::var("MAESTRO_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(mode) = std::env::var("MAESTRO_DEFAULT_MODE") {
            if let Ok(mode) = mode.parse() {
                config.default_mode = mode;
            }
        }
        if let Ok(format) = std::env::var("MAESTRO_OUTPUT_FORMAT") {
            if let Ok(format) = format.parse() {
                config.output_format = format;
            }
        }
        if let Ok(path) = std::env::var("MAESTRO_PROJECT_PATH") {
            config.project_path = path;
        }
        if let Ok(workers) = std::env::var("MAESTRO_MAX_WORKERS") {
            if let Ok(workers) = workers.parse() {
                config.max_workers = workers;
            }
        }
        if let Ok(cap) = std::env::var("MAESTRO_AGENT_CAP") {
            if let Ok(cap) = cap.parse() {
                config.agent_cap = cap;
            }
        }
        config
    }
}
