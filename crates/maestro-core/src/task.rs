//! Task, phase, and subtask state
//!
//! A task owns an ordered phase plan; each phase owns subtasks assigned to
//! agents. Status transitions are validated against the lifecycle state
//! machine, and token/cost counters only ever grow.

use crate::agent::AgentKind;
use crate::error::{Error, Result, TaskError};
use crate::modes::Mode;
use chrono::{DateTime, Utc};
use maestro_llm::CostMicros;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Complexity class assigned by task analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Small localized change
    Simple,
    /// Typical feature work
    Medium,
    /// Structural or cross-cutting work
    Complex,
}

impl Complexity {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

/// Task execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, not yet picked up
    Pending,
    /// Being analyzed and decomposed
    Analyzing,
    /// Executing phases
    Running,
    /// Parked awaiting human approval
    Paused,
    /// All required phases finished non-failed
    Completed,
    /// A required phase failed or a terminal error occurred
    Failed,
    /// Cancelled by request
    Cancelled,
}

impl TaskStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the status is terminal
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the lifecycle permits moving to `next`
    #[must_use]
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        use TaskStatus::{Analyzing, Cancelled, Completed, Failed, Paused, Pending, Running};
        matches!(
            (self, next),
            (Pending, Analyzing | Cancelled)
                | (Analyzing, Running | Paused | Failed | Cancelled)
                | (Running, Paused | Completed | Failed | Cancelled)
                | (Paused, Running | Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Created by decomposition, not yet started
    Pending,
    /// Currently executing
    Running,
    /// Every required subtask finished
    Completed,
    /// A subtask failed terminally
    Failed,
    /// Non-required phase abandoned after a failure
    Skipped,
}

/// Subtask execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    /// Waiting to run
    Pending,
    /// Executing on a worker
    Running,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
}

/// Outcome of one agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Whether the agent succeeded
    pub success: bool,
    /// Failure description; non-empty whenever `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Suggested remediations on failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Structured agent output
    #[serde(default)]
    pub output: serde_json::Map<String, serde_json::Value>,
    /// Files the agent touched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    /// Execution duration
    pub duration_ms: u64,
    /// Prompt tokens consumed
    pub tokens_in: u32,
    /// Completion tokens produced
    pub tokens_out: u32,
    /// Cost of all provider calls made
    pub cost: CostMicros,
}

impl AgentResult {
    /// A successful result with the given output map
    #[must_use]
    pub fn success(output: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            error: None,
            suggestions: Vec::new(),
            output,
            files_modified: Vec::new(),
            duration_ms: 0,
            tokens_in: 0,
            tokens_out: 0,
            cost: CostMicros::ZERO,
        }
    }

    /// A failed result with a non-empty error
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            suggestions: Vec::new(),
            output: serde_json::Map::new(),
            files_modified: Vec::new(),
            duration_ms: 0,
            tokens_in: 0,
            tokens_out: 0,
            cost: CostMicros::ZERO,
        }
    }

    /// Attach modified files
    #[must_use]
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_modified = files;
        self
    }

    /// Attach token and cost tallies
    #[must_use]
    pub fn with_usage(mut self, tokens_in: u32, tokens_out: u32, cost: CostMicros) -> Self {
        self.tokens_in = tokens_in;
        self.tokens_out = tokens_out;
        self.cost = cost;
        self
    }

    /// Attach the execution duration
    #[must_use]
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Attach suggestions to a failed result
    #[must_use]
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

/// One unit of work inside a phase, assigned to a single agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique identifier
    pub id: Uuid,
    /// What the agent should do
    pub description: String,
    /// Agent type assigned to this subtask
    pub agent: AgentKind,
    /// Execution status
    pub status: SubtaskStatus,
    /// Ids of subtasks that must complete successfully first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Uuid>,
    /// Extra input passed into the agent context
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input: HashMap<String, serde_json::Value>,
    /// Result once the subtask finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<AgentResult>,
}

impl Subtask {
    /// Create a pending subtask for an agent
    #[must_use]
    pub fn new(description: impl Into<String>, agent: AgentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            agent,
            status: SubtaskStatus::Pending,
            depends_on: Vec::new(),
            input: HashMap::new(),
            output: None,
        }
    }

    /// Add a dependency on an earlier subtask
    #[must_use]
    pub fn with_dependency(mut self, id: Uuid) -> Self {
        self.depends_on.push(id);
        self
    }

    /// Add an input entry
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }
}

/// A group of subtasks executed together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    /// Ordinal, strictly increasing from 1 within a task
    pub number: u32,
    /// Display name
    pub name: String,
    /// Whether subtask levels run concurrently
    pub parallel: bool,
    /// Whether a failure here fails the task
    pub required: bool,
    /// Execution status
    pub status: PhaseStatus,
    /// Ordered subtasks
    pub subtasks: Vec<Subtask>,
    /// Wall-clock duration once finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Phase {
    /// Create a pending phase
    #[must_use]
    pub fn new(number: u32, name: impl Into<String>, parallel: bool, required: bool) -> Self {
        Self {
            number,
            name: name.into(),
            parallel,
            required,
            status: PhaseStatus::Pending,
            subtasks: Vec::new(),
            duration_ms: None,
        }
    }

    /// Append a subtask
    #[must_use]
    pub fn with_subtask(mut self, subtask: Subtask) -> Self {
        self.subtasks.push(subtask);
        self
    }

    /// Unique agent kinds in plan order
    #[must_use]
    pub fn agent_kinds(&self) -> Vec<AgentKind> {
        let mut kinds = Vec::new();
        for subtask in &self.subtasks {
            if !kinds.contains(&subtask.agent) {
                kinds.push(subtask.agent);
            }
        }
        kinds
    }
}

/// A submitted development task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Natural-language request
    pub description: String,
    /// Project grouping, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Priority 0-100, higher runs first
    pub priority: u8,
    /// Mode the task executes under
    pub mode: Mode,
    /// Complexity class once analyzed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    /// Ordered phase plan
    pub phases: Vec<Phase>,
    /// Index of the phase currently executing (0-based, up to len)
    pub current_phase: u32,
    /// Per-phase result maps keyed by phase number
    pub results: BTreeMap<u32, serde_json::Value>,
    /// Union of files modified across phases, insertion-ordered
    pub files_modified: Vec<String>,
    /// Cumulative tokens (input + output); never decreases
    pub tokens_used: u64,
    /// Cumulative cost; never decreases
    pub cost: CostMicros,
    /// Terminal failures recorded during execution
    pub errors: Vec<TaskError>,
    /// When the task was submitted
    pub created_at: DateTime<Utc>,
    /// When execution started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task
    #[must_use]
    pub fn new(description: impl Into<String>, mode: Mode, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            project_id: None,
            status: TaskStatus::Pending,
            priority,
            mode,
            complexity: None,
            phases: Vec::new(),
            current_phase: 0,
            results: BTreeMap::new(),
            files_modified: Vec::new(),
            tokens_used: 0,
            cost: CostMicros::ZERO,
            errors: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Attach a project id
    #[must_use]
    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Move to a new status, enforcing the lifecycle state machine
    pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition(next) {
            return Err(Error::Internal(format!(
                "illegal task transition {} -> {} for {}",
                self.status, next, self.id
            )));
        }
        self.status = next;
        match next {
            TaskStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            s if s.is_terminal() => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Merge modified files, keeping set semantics and insertion order
    pub fn add_files<I, S>(&mut self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for file in files {
            let file = file.into();
            if !self.files_modified.contains(&file) {
                self.files_modified.push(file);
            }
        }
    }

    /// Add token and cost deltas; counters are monotonic
    pub fn add_usage(&mut self, tokens: u64, cost: CostMicros) {
        self.tokens_used += tokens;
        self.cost += cost;
    }

    /// Record an agent output under its phase and result key
    pub fn record_result(&mut self, phase: u32, agent: AgentKind, output: serde_json::Value) {
        let entry = self
            .results
            .entry(phase)
            .or_insert_with(|| serde_json::json!({}));
        if let Some(map) = entry.as_object_mut() {
            map.insert(agent.result_key(), output);
        }
    }

    /// Record a terminal failure
    pub fn record_error(&mut self, error: TaskError) {
        self.errors.push(error);
    }

    /// Whether every required phase is in a non-failed state
    #[must_use]
    pub fn required_phases_ok(&self) -> bool {
        self.phases
            .iter()
            .filter(|p| p.required)
            .all(|p| p.status != PhaseStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_machine() {
        let mut task = Task::new("fix typo", Mode::Speed, 0);
        assert_eq!(task.status, TaskStatus::Pending);

        task.transition(TaskStatus::Analyzing).unwrap();
        task.transition(TaskStatus::Running).unwrap();
        assert!(task.started_at.is_some());

        task.transition(TaskStatus::Completed).unwrap();
        assert!(task.completed_at.is_some());

        // Terminal statuses admit no transitions
        assert!(task.transition(TaskStatus::Running).is_err());
    }

    #[test]
    fn test_paused_roundtrip() {
        let mut task = Task::new("add feature", Mode::Quality, 0);
        task.transition(TaskStatus::Analyzing).unwrap();
        task.transition(TaskStatus::Paused).unwrap();
        task.transition(TaskStatus::Running).unwrap();
        task.transition(TaskStatus::Cancelled).unwrap();
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut task = Task::new("x", Mode::Speed, 0);
        assert!(task.transition(TaskStatus::Completed).is_err());
        assert!(task.transition(TaskStatus::Running).is_err());
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_files_are_a_set() {
        let mut task = Task::new("x", Mode::Speed, 0);
        task.add_files(["a.rs", "b.rs"]);
        task.add_files(["b.rs", "c.rs"]);
        assert_eq!(task.files_modified, vec!["a.rs", "b.rs", "c.rs"]);
    }

    #[test]
    fn test_usage_monotonic() {
        let mut task = Task::new("x", Mode::Speed, 0);
        task.add_usage(100, CostMicros::from_micros(10));
        task.add_usage(50, CostMicros::from_micros(5));
        assert_eq!(task.tokens_used, 150);
        assert_eq!(task.cost.as_micros(), 15);
    }

    #[test]
    fn test_record_result_keys() {
        let mut task = Task::new("x", Mode::Quality, 0);
        task.record_result(1, AgentKind::Concept, serde_json::json!({"response": "reqs"}));
        task.record_result(1, AgentKind::Architect, serde_json::json!({"response": "design"}));

        let phase1 = &task.results[&1];
        assert_eq!(phase1["conceptResult"]["response"], "reqs");
        assert_eq!(phase1["architectResult"]["response"], "design");
    }

    #[test]
    fn test_phase_agent_kinds_deduped() {
        let phase = Phase::new(1, "Implementation", true, true)
            .with_subtask(Subtask::new("a", AgentKind::Implement))
            .with_subtask(Subtask::new("b", AgentKind::Implement))
            .with_subtask(Subtask::new("c", AgentKind::Translate));
        assert_eq!(
            phase.agent_kinds(),
            vec![AgentKind::Implement, AgentKind::Translate]
        );
    }
}
