//! Event pipeline: bus publish plus store append
//!
//! Every orchestrator event goes through here so bus subscribers, the
//! broadcast tap, and the append-only store all observe the same stream.
//! Store failures are logged and never fail the publishing caller; the bus
//! assigns monotonic versions, so appends cannot conflict.

use maestro_events::{
    AggregateType, DomainEvent, EventBus, EventKind, EventStore, PublishOptions,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Shared publish path for all orchestrator components
pub struct EventPipeline {
    bus: Arc<EventBus>,
    store: Arc<dyn EventStore>,
}

impl EventPipeline {
    /// Create a pipeline over a bus and store
    #[must_use]
    pub fn new(bus: Arc<EventBus>, store: Arc<dyn EventStore>) -> Self {
        Self { bus, store }
    }

    /// The underlying bus
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Publish an event for an aggregate and append it to the store
    pub async fn publish(
        &self,
        kind: EventKind,
        aggregate_id: Uuid,
        aggregate_type: AggregateType,
        data: serde_json::Value,
    ) -> DomainEvent {
        let event = self
            .bus
            .publish(kind, data, PublishOptions::for_aggregate(aggregate_id, aggregate_type))
            .await;
        if let Err(e) = self.store.append(event.clone()).await {
            warn!(kind = %event.kind, error = %e, "Failed to append event to store");
        }
        event
    }

    /// Publish an event for a task aggregate
    pub async fn publish_task(
        &self,
        kind: EventKind,
        task_id: Uuid,
        data: serde_json::Value,
    ) -> DomainEvent {
        self.publish(kind, task_id, AggregateType::Task, data).await
    }

    /// Publish an event for the mode aggregate
    pub async fn publish_mode(&self, kind: EventKind, data: serde_json::Value) -> DomainEvent {
        self.publish(kind, Uuid::nil(), AggregateType::Mode, data).await
    }
}
