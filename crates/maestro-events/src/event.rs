//! Event - Domain event types and schemas
//!
//! Events form an immutable audit log. Every state transition in the
//! orchestrator is recorded as one of the closed set of event kinds below,
//! grouped around an aggregate (task, project, execution, or mode).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identity an event is grouped around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    /// A submitted task
    Task,
    /// A project grouping tasks
    Project,
    /// A single agent execution
    Execution,
    /// The mode subsystem
    Mode,
}

impl AggregateType {
    /// Returns the string representation of the aggregate type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Project => "project",
            Self::Execution => "execution",
            Self::Mode => "mode",
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed taxonomy of domain event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Task was created by submit
    #[serde(rename = "task.created")]
    TaskCreated,
    /// Orchestrator picked the task up
    #[serde(rename = "task.started")]
    TaskStarted,
    /// Task is awaiting human approval
    #[serde(rename = "task.paused")]
    TaskPaused,
    /// Task resumed after approval
    #[serde(rename = "task.resumed")]
    TaskResumed,
    /// Task finished with all required phases non-failed
    #[serde(rename = "task.completed")]
    TaskCompleted,
    /// Task ended in failure
    #[serde(rename = "task.failed")]
    TaskFailed,
    /// Task was cancelled
    #[serde(rename = "task.cancelled")]
    TaskCancelled,
    /// A phase began executing
    #[serde(rename = "task.phase.started")]
    PhaseStarted,
    /// A phase completed
    #[serde(rename = "task.phase.completed")]
    PhaseCompleted,
    /// A phase failed
    #[serde(rename = "task.phase.failed")]
    PhaseFailed,
    /// A non-required phase was skipped
    #[serde(rename = "task.phase.skipped")]
    PhaseSkipped,
    /// An agent began a subtask
    #[serde(rename = "agent.started")]
    AgentStarted,
    /// Agent progress update (0-100)
    #[serde(rename = "agent.progress")]
    AgentProgress,
    /// Agent finished a subtask successfully
    #[serde(rename = "agent.completed")]
    AgentCompleted,
    /// Agent failed a subtask
    #[serde(rename = "agent.failed")]
    AgentFailed,
    /// Free-form agent log line
    #[serde(rename = "agent.log")]
    AgentLog,
    /// Mode switch initiated
    #[serde(rename = "mode.switching")]
    ModeSwitching,
    /// Mode switch finished
    #[serde(rename = "mode.switched")]
    ModeSwitched,
    /// A mode configuration was patched
    #[serde(rename = "mode.config.updated")]
    ModeConfigUpdated,
    /// A billable provider call was recorded
    #[serde(rename = "cost.incurred")]
    CostIncurred,
    /// A task crossed its cost cap
    #[serde(rename = "cost.limit.reached")]
    CostLimitReached,
    /// The orchestrator started
    #[serde(rename = "system.started")]
    SystemStarted,
    /// The orchestrator shut down
    #[serde(rename = "system.shutdown")]
    SystemShutdown,
    /// An internal fault was recorded
    #[serde(rename = "system.error")]
    SystemError,
}

impl EventKind {
    /// Returns the dotted string representation of the event kind
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task.created",
            Self::TaskStarted => "task.started",
            Self::TaskPaused => "task.paused",
            Self::TaskResumed => "task.resumed",
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::TaskCancelled => "task.cancelled",
            Self::PhaseStarted => "task.phase.started",
            Self::PhaseCompleted => "task.phase.completed",
            Self::PhaseFailed => "task.phase.failed",
            Self::PhaseSkipped => "task.phase.skipped",
            Self::AgentStarted => "agent.started",
            Self::AgentProgress => "agent.progress",
            Self::AgentCompleted => "agent.completed",
            Self::AgentFailed => "agent.failed",
            Self::AgentLog => "agent.log",
            Self::ModeSwitching => "mode.switching",
            Self::ModeSwitched => "mode.switched",
            Self::ModeConfigUpdated => "mode.config.updated",
            Self::CostIncurred => "cost.incurred",
            Self::CostLimitReached => "cost.limit.reached",
            Self::SystemStarted => "system.started",
            Self::SystemShutdown => "system.shutdown",
            Self::SystemError => "system.error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task.created" => Ok(Self::TaskCreated),
            "task.started" => Ok(Self::TaskStarted),
            "task.paused" => Ok(Self::TaskPaused),
            "task.resumed" => Ok(Self::TaskResumed),
            "task.completed" => Ok(Self::TaskCompleted),
            "task.failed" => Ok(Self::TaskFailed),
            "task.cancelled" => Ok(Self::TaskCancelled),
            "task.phase.started" => Ok(Self::PhaseStarted),
            "task.phase.completed" => Ok(Self::PhaseCompleted),
            "task.phase.failed" => Ok(Self::PhaseFailed),
            "task.phase.skipped" => Ok(Self::PhaseSkipped),
            "agent.started" => Ok(Self::AgentStarted),
            "agent.progress" => Ok(Self::AgentProgress),
            "agent.completed" => Ok(Self::AgentCompleted),
            "agent.failed" => Ok(Self::AgentFailed),
            "agent.log" => Ok(Self::AgentLog),
            "mode.switching" => Ok(Self::ModeSwitching),
            "mode.switched" => Ok(Self::ModeSwitched),
            "mode.config.updated" => Ok(Self::ModeConfigUpdated),
            "cost.incurred" => Ok(Self::CostIncurred),
            "cost.limit.reached" => Ok(Self::CostLimitReached),
            "system.started" => Ok(Self::SystemStarted),
            "system.shutdown" => Ok(Self::SystemShutdown),
            "system.error" => Ok(Self::SystemError),
            _ => Err(format!("unknown event kind: {s}")),
        }
    }
}

/// Metadata attached to every event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    /// User who triggered the event (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Id correlating events of one logical operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Id of the event that caused this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
    /// Component that produced the event
    #[serde(default)]
    pub source: String,
}

/// An immutable domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique identifier
    pub id: Uuid,

    /// Aggregate this event belongs to
    pub aggregate_id: Uuid,

    /// Aggregate category
    pub aggregate_type: AggregateType,

    /// Event kind from the closed taxonomy
    pub kind: EventKind,

    /// Event-specific payload
    pub data: serde_json::Value,

    /// Event metadata
    pub metadata: EventMetadata,

    /// Monotonically increasing version assigned by the bus
    pub version: u64,

    /// When the event was published
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    /// Create a new event with a fresh id and the current timestamp
    #[must_use]
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: AggregateType,
        kind: EventKind,
        version: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            aggregate_type,
            kind,
            data: serde_json::json!({}),
            metadata: EventMetadata::default(),
            version,
            timestamp: Utc::now(),
        }
    }

    /// Set the payload
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Set the metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A point-in-time state capture used to shorten event replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Aggregate the snapshot belongs to
    pub aggregate_id: Uuid,
    /// Aggregate category
    pub aggregate_type: AggregateType,
    /// Version of the last event folded into the state
    pub version: u64,
    /// Serialized aggregate state
    pub state: serde_json::Value,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot of the given state at a version
    #[must_use]
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: AggregateType,
        version: u64,
        state: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type,
            version,
            state,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_roundtrip() {
        for kind in [
            EventKind::TaskCreated,
            EventKind::TaskCompleted,
            EventKind::PhaseStarted,
            EventKind::PhaseSkipped,
            EventKind::AgentProgress,
            EventKind::ModeConfigUpdated,
            EventKind::CostLimitReached,
            EventKind::SystemShutdown,
        ] {
            let s = kind.to_string();
            let parsed: EventKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_event_kind_serialization() {
        let json = serde_json::to_string(&EventKind::PhaseCompleted).unwrap();
        assert_eq!(json, r#""task.phase.completed""#);

        let parsed: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EventKind::PhaseCompleted);
    }

    #[test]
    fn test_event_builder() {
        let aggregate = Uuid::new_v4();
        let event = DomainEvent::new(aggregate, AggregateType::Task, EventKind::TaskCreated, 1)
            .with_data(serde_json::json!({"description": "fix typo"}));

        assert_eq!(event.aggregate_id, aggregate);
        assert_eq!(event.version, 1);
        assert_eq!(event.data["description"], "fix typo");
    }
}
