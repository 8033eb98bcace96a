//! In-process publish/subscribe bus for domain events.
//!
//! Handlers are registered per event kind or as wildcards. A publish
//! snapshots the matching handler set, runs every handler concurrently and
//! awaits them all before returning. Handler failures are logged and
//! isolated; they never fail the publish. Once-handlers are removed after
//! their first successful delivery.
//!
//! The bus also feeds a `tokio::broadcast` tap so external consumers can
//! follow the stream without registering handlers. Slow tap receivers lag
//! rather than blocking the publisher.

use crate::error::{Error, Result};
use crate::event::{AggregateType, DomainEvent, EventKind, EventMetadata};
use futures::future::{join_all, BoxFuture};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default cap on handlers per event kind (and for wildcards)
const DEFAULT_MAX_LISTENERS: usize = 64;

/// Capacity of the broadcast tap
const TAP_CAPACITY: usize = 256;

/// Error type handlers may return; it is logged, never propagated
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by an event handler
pub type HandlerFuture = BoxFuture<'static, std::result::Result<(), HandlerError>>;

/// An event handler callback
pub type EventHandler = Arc<dyn Fn(DomainEvent) -> HandlerFuture + Send + Sync>;

/// What a subscription listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// A single event kind
    Kind(EventKind),
    /// Every event
    Wildcard,
}

/// Opaque handle identifying a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: EventHandler,
    once: bool,
    fired: Arc<AtomicBool>,
}

#[derive(Default)]
struct BusState {
    typed: HashMap<EventKind, Vec<Subscription>>,
    wildcard: Vec<Subscription>,
    next_id: u64,
}

/// Options for a single publish call
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Aggregate the event belongs to; nil when unspecified
    pub aggregate_id: Option<Uuid>,
    /// Aggregate category
    pub aggregate_type: AggregateType,
    /// Metadata to attach
    pub metadata: EventMetadata,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            aggregate_id: None,
            aggregate_type: AggregateType::Task,
            metadata: EventMetadata::default(),
        }
    }
}

impl PublishOptions {
    /// Target a specific aggregate
    #[must_use]
    pub fn for_aggregate(aggregate_id: Uuid, aggregate_type: AggregateType) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            aggregate_type,
            metadata: EventMetadata::default(),
        }
    }

    /// Set the metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// In-process event bus with typed and wildcard subscriptions
pub struct EventBus {
    state: RwLock<BusState>,
    version: AtomicU64,
    max_listeners: usize,
    tap: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with the default listener cap
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_listeners(DEFAULT_MAX_LISTENERS)
    }

    /// Create a bus with a custom per-topic listener cap
    #[must_use]
    pub fn with_max_listeners(max_listeners: usize) -> Self {
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Self {
            state: RwLock::new(BusState::default()),
            version: AtomicU64::new(0),
            max_listeners,
            tap,
        }
    }

    /// Subscribe a handler to a topic. Returns the subscription handle.
    ///
    /// Fails with `conflict` when the topic already carries `max_listeners`
    /// handlers.
    pub async fn subscribe(&self, topic: Topic, handler: EventHandler) -> Result<SubscriptionId> {
        self.add_subscription(topic, handler, false).await
    }

    /// Subscribe a handler that is removed after its first successful
    /// delivery.
    pub async fn once(&self, kind: EventKind, handler: EventHandler) -> Result<SubscriptionId> {
        self.add_subscription(Topic::Kind(kind), handler, true).await
    }

    async fn add_subscription(
        &self,
        topic: Topic,
        handler: EventHandler,
        once: bool,
    ) -> Result<SubscriptionId> {
        let mut state = self.state.write().await;
        let len = match topic {
            Topic::Kind(kind) => state.typed.get(&kind).map_or(0, Vec::len),
            Topic::Wildcard => state.wildcard.len(),
        };
        if len >= self.max_listeners {
            return Err(Error::Conflict(format!(
                "listener limit reached ({} handlers)",
                self.max_listeners
            )));
        }

        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        let sub = Subscription {
            id,
            handler,
            once,
            fired: Arc::new(AtomicBool::new(false)),
        };
        match topic {
            Topic::Kind(kind) => state.typed.entry(kind).or_default().push(sub),
            Topic::Wildcard => state.wildcard.push(sub),
        }
        Ok(id)
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.write().await;
        for subs in state.typed.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == id) {
                subs.remove(pos);
                return true;
            }
        }
        if let Some(pos) = state.wildcard.iter().position(|s| s.id == id) {
            state.wildcard.remove(pos);
            return true;
        }
        false
    }

    /// Number of handlers currently registered for a topic
    pub async fn handler_count(&self, topic: Topic) -> usize {
        let state = self.state.read().await;
        match topic {
            Topic::Kind(kind) => state.typed.get(&kind).map_or(0, Vec::len),
            Topic::Wildcard => state.wildcard.len(),
        }
    }

    /// Publish an event and await delivery to every matching handler.
    ///
    /// Assigns a fresh id, the current timestamp, and the next bus-wide
    /// version. Returns the published event.
    pub async fn publish(
        &self,
        kind: EventKind,
        data: serde_json::Value,
        opts: PublishOptions,
    ) -> DomainEvent {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let event = DomainEvent::new(
            opts.aggregate_id.unwrap_or_else(Uuid::nil),
            opts.aggregate_type,
            kind,
            version,
        )
        .with_data(data)
        .with_metadata(opts.metadata);

        self.dispatch(&event).await;

        // Lossy tap for external followers; no receivers is fine
        let _ = self.tap.send(event.clone());

        event
    }

    /// Publish a batch of events in order with consecutive versions
    pub async fn publish_batch(
        &self,
        batch: Vec<(EventKind, serde_json::Value, PublishOptions)>,
    ) -> Vec<DomainEvent> {
        let mut events = Vec::with_capacity(batch.len());
        for (kind, data, opts) in batch {
            events.push(self.publish(kind, data, opts).await);
        }
        events
    }

    async fn dispatch(&self, event: &DomainEvent) {
        // Snapshot matching handlers so publish never holds the lock
        // across handler execution.
        let targets: Vec<(SubscriptionId, EventHandler, bool, Arc<AtomicBool>)> = {
            let state = self.state.read().await;
            state
                .typed
                .get(&event.kind)
                .into_iter()
                .flatten()
                .chain(state.wildcard.iter())
                .filter_map(|sub| {
                    if sub.once
                        && sub
                            .fired
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_err()
                    {
                        return None;
                    }
                    Some((sub.id, Arc::clone(&sub.handler), sub.once, Arc::clone(&sub.fired)))
                })
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        let futures = targets.iter().map(|(id, handler, _, _)| {
            let id = *id;
            let fut = handler(event.clone());
            async move { (id, fut.await) }
        });
        let results = join_all(futures).await;

        let mut delivered_once = Vec::new();
        for ((id, result), (_, _, once, fired)) in results.into_iter().zip(targets.iter()) {
            match result {
                Ok(()) => {
                    if *once {
                        delivered_once.push(id);
                    }
                }
                Err(e) => {
                    warn!(kind = %event.kind, subscription = ?id, error = %e, "Event handler failed");
                    if *once {
                        // Failed once-handlers stay armed for the next event
                        fired.store(false, Ordering::SeqCst);
                    }
                }
            }
        }

        if !delivered_once.is_empty() {
            let mut state = self.state.write().await;
            for subs in state.typed.values_mut() {
                subs.retain(|s| !delivered_once.contains(&s.id));
            }
            state.wildcard.retain(|s| !delivered_once.contains(&s.id));
            debug!(count = delivered_once.len(), "Removed delivered once-handlers");
        }
    }

    /// Subscribe to the lossy broadcast tap
    #[must_use]
    pub fn tap(&self) -> broadcast::Receiver<DomainEvent> {
        self.tap.subscribe()
    }

    /// The version the next published event will receive
    #[must_use]
    pub fn next_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst) + 1
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("max_listeners", &self.max_listeners)
            .field("version", &self.version.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests;
