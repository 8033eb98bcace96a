//! Trait for event storage backends
//!
//! The store owns every published event. Backends are pluggable; the crate
//! ships an in-memory implementation, and external drivers implement the
//! same trait.

use crate::error::Result;
use crate::event::{AggregateType, DomainEvent, EventKind, Snapshot};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Query filter for [`EventStore::query`]
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Restrict to a single aggregate
    pub aggregate_id: Option<Uuid>,
    /// Restrict to an aggregate category
    pub aggregate_type: Option<AggregateType>,
    /// Restrict to a set of event kinds
    pub kinds: Option<Vec<EventKind>>,
    /// Only events at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of events to return
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Create an empty filter matching everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one aggregate
    #[must_use]
    pub fn with_aggregate(mut self, aggregate_id: Uuid) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    /// Restrict to an aggregate category
    #[must_use]
    pub fn with_aggregate_type(mut self, aggregate_type: AggregateType) -> Self {
        self.aggregate_type = Some(aggregate_type);
        self
    }

    /// Restrict to the given kinds
    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Only events at or after the instant
    #[must_use]
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Cap the result size
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event passes the filter
    #[must_use]
    pub fn matches(&self, event: &DomainEvent) -> bool {
        if let Some(id) = self.aggregate_id {
            if event.aggregate_id != id {
                return false;
            }
        }
        if let Some(t) = self.aggregate_type {
            if event.aggregate_type != t {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }
}

/// Append-only log of domain events, indexed by aggregate id
///
/// For a given aggregate, appended events must carry strictly increasing
/// versions; a duplicate or stale version is a `conflict`.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Append a single event
    async fn append(&self, event: DomainEvent) -> Result<()>;

    /// Append a batch atomically: either every event lands or none does
    async fn append_batch(&self, events: Vec<DomainEvent>) -> Result<()>;

    /// Events for an aggregate with `version >= from_version`, in version order
    async fn get_events(&self, aggregate_id: Uuid, from_version: u64) -> Result<Vec<DomainEvent>>;

    /// Events matching a filter, in append order
    async fn query(&self, filter: &EventFilter) -> Result<Vec<DomainEvent>>;

    /// Highest version appended for an aggregate, if any
    async fn latest_version(&self, aggregate_id: Uuid) -> Result<Option<u64>>;

    /// Save a snapshot, superseding earlier snapshots for the aggregate
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Latest snapshot for an aggregate, if any
    async fn get_snapshot(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>>;

    /// The store name (for logging)
    fn name(&self) -> &str;
}

/// Rebuild aggregate state by folding a reducer over stored events.
///
/// Starts from the latest snapshot when one exists and replays only events
/// strictly newer than the snapshot version; otherwise folds from `initial`
/// over the full history.
pub async fn rebuild_state<S, F>(
    store: &dyn EventStore,
    aggregate_id: Uuid,
    reducer: F,
    initial: S,
) -> Result<S>
where
    S: serde::Serialize + serde::de::DeserializeOwned,
    F: Fn(S, &DomainEvent) -> S,
{
    let (mut state, from_version) = match store.get_snapshot(aggregate_id).await? {
        Some(snapshot) => (
            serde_json::from_value(snapshot.state)?,
            snapshot.version + 1,
        ),
        None => (initial, 0),
    };

    for event in store.get_events(aggregate_id, from_version).await? {
        state = reducer(state, &event);
    }
    Ok(state)
}
