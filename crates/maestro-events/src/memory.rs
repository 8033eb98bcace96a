//! In-memory event store
//!
//! Reference implementation of [`EventStore`] used by tests and
//! single-process deployments. Appends are linearized behind one lock, so
//! per-aggregate version assignment is serialized.

use crate::error::{Error, Result};
use crate::event::{DomainEvent, Snapshot};
use crate::store::{EventFilter, EventStore};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    /// Append-ordered log of all events
    log: Vec<DomainEvent>,
    /// Positions into `log` per aggregate, in version order
    by_aggregate: HashMap<Uuid, Vec<usize>>,
    /// Latest snapshot per aggregate
    snapshots: HashMap<Uuid, Snapshot>,
}

impl StoreState {
    fn latest_version(&self, aggregate_id: Uuid) -> Option<u64> {
        self.by_aggregate
            .get(&aggregate_id)
            .and_then(|positions| positions.last())
            .map(|&pos| self.log[pos].version)
    }

    fn check_version(&self, event: &DomainEvent, pending: &HashMap<Uuid, u64>) -> Result<()> {
        let current = pending
            .get(&event.aggregate_id)
            .copied()
            .or_else(|| self.latest_version(event.aggregate_id));
        if let Some(latest) = current {
            if event.version <= latest {
                return Err(Error::Conflict(format!(
                    "version {} for aggregate {} is not after {}",
                    event.version, event.aggregate_id, latest
                )));
            }
        }
        Ok(())
    }

    fn push(&mut self, event: DomainEvent) {
        let pos = self.log.len();
        self.by_aggregate
            .entry(event.aggregate_id)
            .or_default()
            .push(pos);
        self.log.push(event);
    }
}

/// In-memory [`EventStore`] implementation
#[derive(Default)]
pub struct InMemoryEventStore {
    state: RwLock<StoreState>,
}

impl InMemoryEventStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events
    pub async fn len(&self) -> usize {
        self.state.read().await.log.len()
    }

    /// Whether the store holds no events
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.log.is_empty()
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: DomainEvent) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_version(&event, &HashMap::new())?;
        state.push(event);
        Ok(())
    }

    async fn append_batch(&self, events: Vec<DomainEvent>) -> Result<()> {
        let mut state = self.state.write().await;

        // Validate the whole batch before committing any of it
        let mut pending: HashMap<Uuid, u64> = HashMap::new();
        for event in &events {
            state.check_version(event, &pending)?;
            pending.insert(event.aggregate_id, event.version);
        }

        for event in events {
            state.push(event);
        }
        Ok(())
    }

    async fn get_events(&self, aggregate_id: Uuid, from_version: u64) -> Result<Vec<DomainEvent>> {
        let state = self.state.read().await;
        Ok(state
            .by_aggregate
            .get(&aggregate_id)
            .into_iter()
            .flatten()
            .map(|&pos| &state.log[pos])
            .filter(|e| e.version >= from_version)
            .cloned()
            .collect())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<DomainEvent>> {
        let state = self.state.read().await;
        let mut matched: Vec<DomainEvent> = state
            .log
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn latest_version(&self, aggregate_id: Uuid) -> Result<Option<u64>> {
        Ok(self.state.read().await.latest_version(aggregate_id))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut state = self.state.write().await;
        debug!(
            aggregate_id = %snapshot.aggregate_id,
            version = snapshot.version,
            "Saving snapshot"
        );
        state.snapshots.insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>> {
        Ok(self.state.read().await.snapshots.get(&aggregate_id).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AggregateType, EventKind};
    use crate::store::rebuild_state;

    fn event(aggregate: Uuid, kind: EventKind, version: u64) -> DomainEvent {
        DomainEvent::new(aggregate, AggregateType::Task, kind, version)
    }

    #[tokio::test]
    async fn test_append_and_get_events() {
        let store = InMemoryEventStore::new();
        let agg = Uuid::new_v4();

        store.append(event(agg, EventKind::TaskCreated, 1)).await.unwrap();
        store.append(event(agg, EventKind::TaskStarted, 2)).await.unwrap();
        store.append(event(agg, EventKind::TaskCompleted, 5)).await.unwrap();

        let all = store.get_events(agg, 0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].version, 5);

        let tail = store.get_events(agg, 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(store.latest_version(agg).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_duplicate_version_conflicts() {
        let store = InMemoryEventStore::new();
        let agg = Uuid::new_v4();

        store.append(event(agg, EventKind::TaskCreated, 3)).await.unwrap();
        let err = store.append(event(agg, EventKind::TaskStarted, 3)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Stale versions conflict too
        let err = store.append(event(agg, EventKind::TaskStarted, 1)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = InMemoryEventStore::new();
        let agg = Uuid::new_v4();

        let err = store
            .append_batch(vec![
                event(agg, EventKind::TaskCreated, 1),
                event(agg, EventKind::TaskStarted, 1),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Nothing from the rejected batch may land
        assert!(store.is_empty().await);

        store
            .append_batch(vec![
                event(agg, EventKind::TaskCreated, 1),
                event(agg, EventKind::TaskStarted, 2),
            ])
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = InMemoryEventStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.append(event(a, EventKind::TaskCreated, 1)).await.unwrap();
        store.append(event(b, EventKind::TaskCreated, 2)).await.unwrap();
        store.append(event(a, EventKind::TaskFailed, 3)).await.unwrap();

        let by_aggregate = store
            .query(&EventFilter::new().with_aggregate(a))
            .await
            .unwrap();
        assert_eq!(by_aggregate.len(), 2);

        let by_kind = store
            .query(&EventFilter::new().with_kinds(vec![EventKind::TaskFailed]))
            .await
            .unwrap();
        assert_eq!(by_kind.len(), 1);
        assert_eq!(by_kind[0].aggregate_id, a);

        let limited = store.query(&EventFilter::new().with_limit(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_matches_full_replay() {
        let store = InMemoryEventStore::new();
        let agg = Uuid::new_v4();

        for v in 1..=4 {
            store.append(event(agg, EventKind::AgentCompleted, v)).await.unwrap();
        }

        let count = |acc: u64, _e: &DomainEvent| acc + 1;
        let from_zero = rebuild_state(&store, agg, count, 0u64).await.unwrap();
        assert_eq!(from_zero, 4);

        // A snapshot at version 2 replays only versions 3 and 4 on top
        store
            .save_snapshot(Snapshot::new(
                agg,
                AggregateType::Task,
                2,
                serde_json::json!(2u64),
            ))
            .await
            .unwrap();
        let from_snapshot = rebuild_state(&store, agg, count, 0u64).await.unwrap();
        assert_eq!(from_snapshot, from_zero);
    }

    #[tokio::test]
    async fn test_snapshot_superseded() {
        let store = InMemoryEventStore::new();
        let agg = Uuid::new_v4();

        store
            .save_snapshot(Snapshot::new(agg, AggregateType::Task, 1, serde_json::json!(1)))
            .await
            .unwrap();
        store
            .save_snapshot(Snapshot::new(agg, AggregateType::Task, 7, serde_json::json!(7)))
            .await
            .unwrap();

        let snapshot = store.get_snapshot(agg).await.unwrap().unwrap();
        assert_eq!(snapshot.version, 7);
    }
}
