//! Event types and the in-process event bus
//!
//! Services publish [`EduEvent`]s on an [`EventBus`]; SSE clients and
//! background tasks subscribe to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by EDU services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EduEvent {
    /// Aggregate counters changed after an entity change or recompute
    AggregateUpdated {
        aggregate: String,
        computed_by: String,
        total: u64,
        timestamp: DateTime<Utc>,
    },

    /// A decrement would have taken a counter below zero and was clamped
    CounterUnderflow {
        aggregate: String,
        counter: String,
        timestamp: DateTime<Utc>,
    },

    /// A change event was dropped after the delivery worker gave up on it
    ChangeDeliveryFailed {
        aggregate: String,
        entity_id: String,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Registry link reconciliation finished
    LinksReconciled {
        links_checked: u64,
        links_removed: u64,
        dangling_refs_cleared: u64,
        errors: u64,
        timestamp: DateTime<Utc>,
    },
}

impl EduEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            EduEvent::AggregateUpdated { .. } => "AggregateUpdated",
            EduEvent::CounterUnderflow { .. } => "CounterUnderflow",
            EduEvent::ChangeDeliveryFailed { .. } => "ChangeDeliveryFailed",
            EduEvent::LinksReconciled { .. } => "LinksReconciled",
        }
    }
}

/// Broadcast bus for [`EduEvent`]s
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EduEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EduEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: EduEvent) -> Result<usize, broadcast::error::SendError<EduEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EduEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
