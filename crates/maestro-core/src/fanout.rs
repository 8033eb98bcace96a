//! Real-time subscription fan-out
//!
//! External consumers subscribe to channels and receive event envelopes on
//! a bounded receiver. Channels are event kinds (`"task.created"`), a
//! single task (`"task:<uuid>"`), or every task (`"tasks"`). Each
//! subscriber has a bounded buffer with one reserved slot: when the buffer
//! fills, the subscriber is dropped after a final `overflow` notice.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use maestro_events::{AggregateType, DomainEvent, EventBus, Topic};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default per-subscriber buffer (excluding the reserved overflow slot)
pub const DEFAULT_BUFFER: usize = 64;

/// Message type of the final notice sent to a dropped subscriber
pub const OVERFLOW_TYPE: &str = "overflow";

/// Envelope delivered to external subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Event type string, or `"overflow"` for the drop notice
    #[serde(rename = "type")]
    pub message_type: String,
    /// Task the event belongs to, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// Event payload
    pub data: serde_json::Value,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
}

/// A live subscription: its id plus the receiving end
pub struct SubscriptionHandle {
    /// Subscriber id, used to unsubscribe
    pub id: Uuid,
    /// Bounded message receiver
    pub receiver: mpsc::Receiver<ChannelMessage>,
}

struct Subscriber {
    channels: HashSet<String>,
    tx: mpsc::Sender<ChannelMessage>,
}

/// Channel-based pub/sub fan-out over the event stream
pub struct SubscriptionManager {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    buffer: usize,
}

impl SubscriptionManager {
    /// Create a manager with the default buffer size
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Create a manager with a custom per-subscriber buffer
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register this manager as a wildcard handler on the bus
    pub async fn attach(self: &Arc<Self>, bus: &EventBus) -> maestro_events::Result<()> {
        let manager = Arc::clone(self);
        let handler: maestro_events::EventHandler = Arc::new(move |event| {
            let manager = Arc::clone(&manager);
            async move {
                manager.dispatch(&event).await;
                Ok(())
            }
            .boxed()
        });
        bus.subscribe(Topic::Wildcard, handler).await?;
        Ok(())
    }

    /// Subscribe to a set of channels
    pub async fn subscribe(&self, channels: Vec<String>) -> SubscriptionHandle {
        // One extra slot stays reserved for the overflow notice
        let (tx, receiver) = mpsc::channel(self.buffer + 1);
        let id = Uuid::new_v4();
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                channels: channels.into_iter().collect(),
                tx,
            },
        );
        debug!(subscriber = %id, "Fan-out subscriber added");
        SubscriptionHandle { id, receiver }
    }

    /// Add channels to an existing subscription
    pub async fn add_channels(&self, id: Uuid, channels: Vec<String>) -> bool {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get_mut(&id) {
            Some(sub) => {
                sub.channels.extend(channels);
                true
            }
            None => false,
        }
    }

    /// Remove channels from an existing subscription
    pub async fn remove_channels(&self, id: Uuid, channels: &[String]) -> bool {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get_mut(&id) {
            Some(sub) => {
                for channel in channels {
                    sub.channels.remove(channel);
                }
                true
            }
            None => false,
        }
    }

    /// Drop a subscription
    pub async fn unsubscribe(&self, id: Uuid) -> bool {
        self.subscribers.write().await.remove(&id).is_some()
    }

    /// Number of live subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Channels an event is routed to
    fn channels_for(event: &DomainEvent) -> Vec<String> {
        let mut channels = vec![event.kind.as_str().to_string()];
        if event.aggregate_type == AggregateType::Task {
            channels.push(format!("task:{}", event.aggregate_id));
            channels.push("tasks".to_string());
        }
        channels
    }

    /// Route an event to every matching subscriber
    pub async fn dispatch(&self, event: &DomainEvent) {
        let channels = Self::channels_for(event);
        let message = ChannelMessage {
            message_type: event.kind.as_str().to_string(),
            task_id: (event.aggregate_type == AggregateType::Task
                && !event.aggregate_id.is_nil())
            .then_some(event.aggregate_id),
            data: event.data.clone(),
            timestamp: event.timestamp,
        };

        let mut overflowed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, sub) in subscribers.iter() {
                if !channels.iter().any(|c| sub.channels.contains(c)) {
                    continue;
                }
                // capacity == 1 means only the reserved slot is left
                if sub.tx.capacity() <= 1 {
                    overflowed.push(*id);
                    continue;
                }
                if sub.tx.try_send(message.clone()).is_err() {
                    overflowed.push(*id);
                }
            }
        }

        if !overflowed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in overflowed {
                if let Some(sub) = subscribers.remove(&id) {
                    warn!(subscriber = %id, "Dropping slow fan-out subscriber");
                    let notice = ChannelMessage {
                        message_type: OVERFLOW_TYPE.to_string(),
                        task_id: None,
                        data: serde_json::json!({
                            "reason": "subscriber buffer full",
                        }),
                        timestamp: Utc::now(),
                    };
                    let _ = sub.tx.try_send(notice);
                }
            }
        }
    }

    /// Drop every subscription (used during shutdown)
    pub async fn close_all(&self) {
        self.subscribers.write().await.clear();
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
