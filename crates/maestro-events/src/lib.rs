//! Maestro Events - Domain events, bus, and store
//!
//! This crate provides the event backbone for the Maestro orchestrator:
//! - Event: the closed taxonomy of domain events and snapshots
//! - Bus: in-process publish/subscribe with typed and wildcard handlers
//! - Store: append-only event log with snapshot-accelerated state rebuild

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod error;
pub mod event;
pub mod memory;
pub mod store;

pub use bus::{EventBus, EventHandler, HandlerError, PublishOptions, SubscriptionId, Topic};
pub use error::{Error, Result};
pub use event::{AggregateType, DomainEvent, EventKind, EventMetadata, Snapshot};
pub use memory::InMemoryEventStore;
pub use store::{rebuild_state, EventFilter, EventStore};
