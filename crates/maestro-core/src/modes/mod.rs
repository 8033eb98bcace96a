//! Execution modes
//!
//! A mode is a named policy parameterizing decomposition depth, agent
//! selection, validation rigor, and model choice. Four modes exist; each is
//! backed by a strategy object built from its configuration.

mod autonomy;
mod cost;
mod manager;
mod quality;
mod speed;
mod strategy;

pub use manager::ModeManager;
pub use strategy::{strategy_for, ModeStrategy};

use crate::agent::AgentKind;
use maestro_llm::CostMicros;
use serde::{Deserialize, Serialize};

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Minimal pipeline, fastest turnaround
    Speed,
    /// Full pipeline with comprehensive validation
    Quality,
    /// Full pipeline through deployment, unattended
    Autonomy,
    /// Cheapest viable pipeline with a cost cap
    Cost,
}

impl Mode {
    /// All modes
    pub const ALL: &'static [Mode] = &[Self::Speed, Self::Quality, Self::Autonomy, Self::Cost];

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speed => "SPEED",
            Self::Quality => "QUALITY",
            Self::Autonomy => "AUTONOMY",
            Self::Cost => "COST",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SPEED" => Ok(Self::Speed),
            "QUALITY" => Ok(Self::Quality),
            "AUTONOMY" => Ok(Self::Autonomy),
            "COST" => Ok(Self::Cost),
            _ => Err(format!("unknown mode: {s}")),
        }
    }
}

/// How deeply a task is decomposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionDepth {
    /// One or two phases
    Shallow,
    /// The usual pipeline
    Standard,
    /// Full multi-phase pipeline
    Deep,
}

/// How aggressively subtasks run concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelizationLevel {
    /// Parallelize everything possible
    Aggressive,
    /// Parallelize independent groups
    Balanced,
    /// Mostly sequential
    Conservative,
}

/// How much validation runs after implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationDepth {
    /// Build only
    Minimal,
    /// Build plus tests
    Standard,
    /// The full gate set
    Comprehensive,
}

/// What to do when a generation is truncated at the token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Keep the truncated output, marked as such
    AcceptTruncated,
    /// Retry once with a doubled budget, clamped to the provider max
    RetryLarger,
}

/// A provider/model choice with generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Provider name
    pub provider: String,
    /// Model id
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Token budget per call
    pub max_tokens: u32,
}

impl ModelSpec {
    /// Create a spec with the default generation parameters
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Validation gates a strategy requires
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Run the type checker
    pub typecheck: bool,
    /// Run the linter
    pub lint: bool,
    /// Run a build
    pub build: bool,
    /// Run the test suite
    pub tests: bool,
    /// Require a review pass
    pub require_review: bool,
    /// Require a security scan
    pub require_security_scan: bool,
    /// Minimum test coverage when tests run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_coverage: Option<f32>,
}

/// Agent choice a strategy makes for a description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSelection {
    /// The agent carrying the core work
    pub primary: AgentKind,
    /// Supporting agents
    pub secondary: Vec<AgentKind>,
    /// Agents deliberately skipped
    pub skip: Vec<AgentKind>,
}

/// Per-mode configuration record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Decomposition depth
    pub decomposition_depth: DecompositionDepth,
    /// Parallelization level
    pub parallelization_level: ParallelizationLevel,
    /// Validation depth
    pub validation_depth: ValidationDepth,
    /// Whether tasks pause for human approval after decomposition
    pub requires_human_approval: bool,
    /// Primary model
    pub primary_model: ModelSpec,
    /// Fallback model
    pub fallback_model: ModelSpec,
    /// Prefer local models for simpler work
    pub use_local_models: bool,
    /// Agents every task in this mode runs
    pub required_agents: Vec<AgentKind>,
    /// Agents added when useful
    pub optional_agents: Vec<AgentKind>,
    /// Per-subtask wall-clock budget
    pub task_timeout_ms: u64,
    /// Retry budget for transient/provider failures
    pub max_retries: u32,
    /// Cumulative cost cap, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_limit: Option<CostMicros>,
    /// Truncation handling
    pub length_policy: LengthPolicy,
}

impl ModeConfig {
    /// Baseline configuration for a mode
    #[must_use]
    pub fn defaults(mode: Mode) -> Self {
        match mode {
            Mode::Speed => Self {
                decomposition_depth: DecompositionDepth::Shallow,
                parallelization_level: ParallelizationLevel::Aggressive,
                validation_depth: ValidationDepth::Minimal,
                requires_human_approval: false,
                primary_model: ModelSpec::new("anthropic", "claude-3-5-sonnet-20241022"),
                fallback_model: ModelSpec::new("ollama", "codellama:7b"),
                use_local_models: false,
                required_agents: vec![AgentKind::Implement],
                optional_agents: vec![AgentKind::Verify],
                task_timeout_ms: 300_000,
                max_retries: 1,
                cost_limit: None,
                length_policy: LengthPolicy::AcceptTruncated,
            },
            Mode::Quality => Self {
                decomposition_depth: DecompositionDepth::Deep,
                parallelization_level: ParallelizationLevel::Balanced,
                validation_depth: ValidationDepth::Comprehensive,
                requires_human_approval: false,
                primary_model: ModelSpec::new("anthropic", "claude-opus-4-5-20251101"),
                fallback_model: ModelSpec::new("anthropic", "claude-3-5-sonnet-20241022"),
                use_local_models: false,
                required_agents: vec![
                    AgentKind::Concept,
                    AgentKind::Architect,
                    AgentKind::Implement,
                    AgentKind::Test,
                    AgentKind::Review,
                    AgentKind::Security,
                    AgentKind::Docs,
                ],
                optional_agents: vec![AgentKind::Optimize, AgentKind::Translate],
                task_timeout_ms: 900_000,
                max_retries: 3,
                cost_limit: None,
                length_policy: LengthPolicy::RetryLarger,
            },
            Mode::Autonomy => Self {
                decomposition_depth: DecompositionDepth::Deep,
                parallelization_level: ParallelizationLevel::Balanced,
                validation_depth: ValidationDepth::Standard,
                requires_human_approval: false,
                primary_model: ModelSpec::new("anthropic", "claude-opus-4-5-20251101"),
                fallback_model: ModelSpec::new("anthropic", "claude-3-5-sonnet-20241022"),
                use_local_models: true,
                required_agents: vec![
                    AgentKind::Concept,
                    AgentKind::Architect,
                    AgentKind::Implement,
                    AgentKind::Test,
                    AgentKind::Review,
                    AgentKind::Security,
                    AgentKind::Docs,
                    AgentKind::Deploy,
                ],
                optional_agents: vec![AgentKind::Optimize],
                task_timeout_ms: 1_200_000,
                max_retries: 3,
                cost_limit: None,
                length_policy: LengthPolicy::RetryLarger,
            },
            Mode::Cost => Self {
                decomposition_depth: DecompositionDepth::Shallow,
                parallelization_level: ParallelizationLevel::Conservative,
                validation_depth: ValidationDepth::Minimal,
                requires_human_approval: false,
                primary_model: ModelSpec::new("ollama", "codellama:7b"),
                fallback_model: ModelSpec::new("anthropic", "claude-3-5-haiku-20241022"),
                use_local_models: true,
                required_agents: vec![AgentKind::Implement],
                optional_agents: vec![AgentKind::Test],
                task_timeout_ms: 600_000,
                max_retries: 2,
                cost_limit: Some(CostMicros::from_micros(1_000_000)),
                length_policy: LengthPolicy::AcceptTruncated,
            },
        }
    }
}

/// Partial configuration merged over a mode's baseline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeConfigPatch {
    /// Override decomposition depth
    pub decomposition_depth: Option<DecompositionDepth>,
    /// Override parallelization level
    pub parallelization_level: Option<ParallelizationLevel>,
    /// Override validation depth
    pub validation_depth: Option<ValidationDepth>,
    /// Override the approval gate
    pub requires_human_approval: Option<bool>,
    /// Override the primary model
    pub primary_model: Option<ModelSpec>,
    /// Override the fallback model
    pub fallback_model: Option<ModelSpec>,
    /// Override local-model preference
    pub use_local_models: Option<bool>,
    /// Override required agents
    pub required_agents: Option<Vec<AgentKind>>,
    /// Override optional agents
    pub optional_agents: Option<Vec<AgentKind>>,
    /// Override the subtask timeout
    pub task_timeout_ms: Option<u64>,
    /// Override the retry budget
    pub max_retries: Option<u32>,
    /// Override the cost cap (Some(None) clears it)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub cost_limit: Option<Option<CostMicros>>,
    /// Override the truncation policy
    pub length_policy: Option<LengthPolicy>,
}

mod double_option {
    use maestro_llm::CostMicros;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Option<CostMicros>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<CostMicros>>, D::Error> {
        Option::<CostMicros>::deserialize(deserializer).map(Some)
    }
}

impl ModeConfigPatch {
    /// Apply the patch to a config
    pub fn apply(&self, config: &mut ModeConfig) {
        if let Some(v) = self.decomposition_depth {
            config.decomposition_depth = v;
        }
        if let Some(v) = self.parallelization_level {
            config.parallelization_level = v;
        }
        if let Some(v) = self.validation_depth {
            config.validation_depth = v;
        }
        if let Some(v) = self.requires_human_approval {
            config.requires_human_approval = v;
        }
        if let Some(v) = &self.primary_model {
            config.primary_model = v.clone();
        }
        if let Some(v) = &self.fallback_model {
            config.fallback_model = v.clone();
        }
        if let Some(v) = self.use_local_models {
            config.use_local_models = v;
        }
        if let Some(v) = &self.required_agents {
            config.required_agents = v.clone();
        }
        if let Some(v) = &self.optional_agents {
            config.optional_agents = v.clone();
        }
        if let Some(v) = self.task_timeout_ms {
            config.task_timeout_ms = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.cost_limit {
            config.cost_limit = v;
        }
        if let Some(v) = self.length_policy {
            config.length_policy = v;
        }
    }
}

#[cfg(test)]
mod tests;
