//! Agent contract
//!
//! An agent executes one kind of subtask against an AI provider. The
//! closed [`AgentKind`] set covers the development pipeline roles plus
//! language experts; the registry wires kinds to implementations.

use crate::error::Result;
use crate::modes::{LengthPolicy, ModelSpec};
use crate::pipeline::EventPipeline;
use crate::task::AgentResult;
use maestro_events::EventKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Closed set of agent types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// Requirements analysis
    Concept,
    /// System design
    Architect,
    /// Code generation
    Implement,
    /// Test authoring
    Test,
    /// Lightweight result verification
    Verify,
    /// Code review
    Review,
    /// Performance optimization
    Optimize,
    /// Documentation
    Docs,
    /// Deployment configuration
    Deploy,
    /// Security audit
    Security,
    /// Code restructuring
    Refactor,
    /// Defect diagnosis
    Debug,
    /// Migration work
    Migrate,
    /// UI translation work
    Translate,
    /// Python specialist
    PythonExpert,
    /// TypeScript specialist
    TypescriptExpert,
    /// Rust specialist
    RustExpert,
}

impl AgentKind {
    /// Every kind, in declaration order
    pub const ALL: &'static [AgentKind] = &[
        Self::Concept,
        Self::Architect,
        Self::Implement,
        Self::Test,
        Self::Verify,
        Self::Review,
        Self::Optimize,
        Self::Docs,
        Self::Deploy,
        Self::Security,
        Self::Refactor,
        Self::Debug,
        Self::Migrate,
        Self::Translate,
        Self::PythonExpert,
        Self::TypescriptExpert,
        Self::RustExpert,
    ];

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Architect => "architect",
            Self::Implement => "implement",
            Self::Test => "test",
            Self::Verify => "verify",
            Self::Review => "review",
            Self::Optimize => "optimize",
            Self::Docs => "docs",
            Self::Deploy => "deploy",
            Self::Security => "security",
            Self::Refactor => "refactor",
            Self::Debug => "debug",
            Self::Migrate => "migrate",
            Self::Translate => "translate",
            Self::PythonExpert => "python-expert",
            Self::TypescriptExpert => "typescript-expert",
            Self::RustExpert => "rust-expert",
        }
    }

    /// Stable context key this agent's output is injected under
    #[must_use]
    pub fn result_key(&self) -> String {
        format!("{}Result", self.as_str())
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown agent kind: {s}"))
    }
}

/// Self-description an agent publishes through the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Display name
    pub name: String,
    /// What the agent does
    pub description: String,
    /// Capability tags
    pub capabilities: Vec<String>,
    /// Context keys the agent reads
    pub inputs: Vec<String>,
    /// Output keys the agent produces
    pub outputs: Vec<String>,
    /// Context keys that must be present before execution
    pub required_context: Vec<String>,
    /// Rough duration estimate
    pub estimated_duration_ms: u64,
}

/// Validation verdict over an [`AgentResult`]
#[derive(Debug, Clone)]
pub struct AgentValidation {
    /// Whether the result is acceptable
    pub ok: bool,
    /// Rule violations when not ok
    pub errors: Vec<String>,
}

impl AgentValidation {
    /// A passing verdict
    #[must_use]
    pub fn ok() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    /// A failing verdict with rule violations
    #[must_use]
    pub fn failed(errors: Vec<String>) -> Self {
        Self { ok: false, errors }
    }
}

/// Reports clamped, monotonically non-decreasing progress for one
/// (task, agent) pair
pub struct ProgressReporter {
    events: Arc<EventPipeline>,
    task_id: Uuid,
    agent: AgentKind,
    last: AtomicU8,
}

impl ProgressReporter {
    /// Create a reporter starting at zero
    #[must_use]
    pub fn new(events: Arc<EventPipeline>, task_id: Uuid, agent: AgentKind) -> Self {
        Self {
            events,
            task_id,
            agent,
            last: AtomicU8::new(0),
        }
    }

    /// Publish a progress update. Values are clamped to 0-100 and never
    /// move backwards.
    pub async fn report(&self, percent: u8, message: &str) {
        let percent = percent.min(100).max(self.last.load(Ordering::SeqCst));
        self.last.store(percent, Ordering::SeqCst);
        self.events
            .publish_task(
                EventKind::AgentProgress,
                self.task_id,
                serde_json::json!({
                    "agent": self.agent.as_str(),
                    "progress": percent,
                    "message": message,
                }),
            )
            .await;
    }

    /// The last reported value
    #[must_use]
    pub fn current(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}

/// Everything an agent needs to execute one subtask
#[derive(Clone)]
pub struct AgentTask {
    /// Task the subtask belongs to
    pub task_id: Uuid,
    /// Phase number
    pub phase: u32,
    /// Subtask id
    pub subtask_id: Uuid,
    /// What to do
    pub description: String,
    /// Injected context, including `<agentType>Result` entries from prior
    /// phases and the subtask's own input map
    pub context: HashMap<String, serde_json::Value>,
    /// Model the mode strategy selected
    pub model: ModelSpec,
    /// Policy for truncated generations
    pub length_policy: LengthPolicy,
    /// Cooperative cancellation token
    pub cancel: CancellationToken,
    /// Event publish handle
    pub events: Arc<EventPipeline>,
}

impl AgentTask {
    /// Read a prior agent's output from the context
    #[must_use]
    pub fn prior_result(&self, agent: AgentKind) -> Option<&serde_json::Value> {
        self.context.get(&agent.result_key())
    }
}

/// A component executing one kind of subtask
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    /// The kind this agent handles
    fn kind(&self) -> AgentKind;

    /// Self-description
    fn capabilities(&self) -> AgentCapabilities;

    /// Execute one subtask.
    ///
    /// Implementations must honor `task.cancel` at every external call and
    /// emit agent.started, periodic agent.progress, and
    /// agent.completed/agent.failed through `task.events`. Infrastructure
    /// failures (provider, transient, cancelled) surface as `Err`; a
    /// domain-level failure is an `Ok` result with `success = false`.
    async fn execute(&self, task: AgentTask) -> Result<AgentResult>;

    /// Validate a result. The minimum rule: a failed result must carry a
    /// non-empty error.
    fn validate(&self, result: &AgentResult) -> AgentValidation {
        if !result.success && result.error.as_deref().unwrap_or("").is_empty() {
            return AgentValidation::failed(vec![
                "failed result must carry a non-empty error".to_string(),
            ]);
        }
        AgentValidation::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_events::{EventBus, InMemoryEventStore};

    #[test]
    fn test_kind_roundtrip() {
        for kind in AgentKind::ALL {
            let parsed: AgentKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
        assert!("builder".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_result_keys() {
        assert_eq!(AgentKind::Implement.result_key(), "implementResult");
        assert_eq!(AgentKind::PythonExpert.result_key(), "python-expertResult");
    }

    #[tokio::test]
    async fn test_progress_clamped_and_monotonic() {
        let pipeline = Arc::new(EventPipeline::new(
            Arc::new(EventBus::new()),
            Arc::new(InMemoryEventStore::new()),
        ));
        let reporter = ProgressReporter::new(pipeline, Uuid::new_v4(), AgentKind::Implement);

        reporter.report(50, "half").await;
        assert_eq!(reporter.current(), 50);

        // Regression is clamped up to the high-water mark
        reporter.report(10, "backwards").await;
        assert_eq!(reporter.current(), 50);

        reporter.report(200, "overflow").await;
        assert_eq!(reporter.current(), 100);
    }

    #[test]
    fn test_default_validate_rule() {
        struct Probe;

        #[async_trait::async_trait]
        impl Agent for Probe {
            fn kind(&self) -> AgentKind {
                AgentKind::Verify
            }
            fn capabilities(&self) -> AgentCapabilities {
                AgentCapabilities {
                    name: "probe".into(),
                    description: String::new(),
                    capabilities: vec![],
                    inputs: vec![],
                    outputs: vec![],
                    required_context: vec![],
                    estimated_duration_ms: 0,
                }
            }
            async fn execute(&self, _task: AgentTask) -> Result<AgentResult> {
                unreachable!()
            }
        }

        let probe = Probe;
        assert!(probe.validate(&AgentResult::success(serde_json::Map::new())).ok);
        assert!(probe.validate(&AgentResult::failure("boom")).ok);

        let mut bad = AgentResult::failure("x");
        bad.error = Some(String::new());
        assert!(!probe.validate(&bad).ok);
    }
}
