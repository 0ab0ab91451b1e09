//! Entity change delivery
//!
//! Change triples are queued on a bounded channel and drained by a single
//! worker, so the maintainer sees changes for the aggregate one at a time.
//! Recompute requests travel the same channel and run on the same worker.
//! The worker owns the retry policy for surfaced write failures; the
//! maintainer itself never loops.
//!
//! Each queued change carries its feed position. Changes at or below the
//! position covered by the last recompute are skipped, since the recompute
//! scan already counted them.

use crate::aggregate::{
    AggregateMaintainer, AggregateSnapshot, ChangeOutcome, ChangeSequencer, Dimensions,
};
use crate::error::{AggregateError, FeedError};
use edu_common::events::{EduEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One `(entity_id, before, after)` change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChangeEvent {
    pub entity_id: String,
    pub before: Option<Dimensions>,
    pub after: Option<Dimensions>,
}

/// A change stamped with its feed position
#[derive(Debug, Clone)]
pub struct SequencedChange {
    pub seq: u64,
    pub event: EntityChangeEvent,
}

/// What the delivery worker receives
#[derive(Debug)]
pub enum FeedMessage {
    Change(SequencedChange),
    Recompute(oneshot::Sender<Result<AggregateSnapshot, AggregateError>>),
}

/// Publishing side of the change channel
#[derive(Clone)]
pub struct ChangeFeed {
    tx: mpsc::Sender<FeedMessage>,
    sequencer: Arc<ChangeSequencer>,
}

/// A reserved channel slot plus the sequencer lock
///
/// Held across a collection write so commit order matches feed order and no
/// recompute can scan between the commit and the publish. Dropping it without
/// publishing consumes no position.
pub struct WritePermit<'a> {
    slot: mpsc::Permit<'a, FeedMessage>,
    last: MutexGuard<'a, u64>,
}

impl WritePermit<'_> {
    /// Queue the change at the next position and release the lock
    pub fn publish(mut self, event: EntityChangeEvent) -> u64 {
        *self.last += 1;
        let seq = *self.last;
        self.slot.send(FeedMessage::Change(SequencedChange { seq, event }));
        seq
    }
}

impl ChangeFeed {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FeedMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let feed = Self {
            tx,
            sequencer: Arc::new(ChangeSequencer::new()),
        };
        (feed, rx)
    }

    /// Sequencer to attach to the maintainer fed by this channel
    pub fn sequencer(&self) -> Arc<ChangeSequencer> {
        Arc::clone(&self.sequencer)
    }

    /// Reserve a slot, then take the sequencer lock
    ///
    /// The slot comes first: a worker running a recompute holds the lock and
    /// never waits on the channel.
    pub async fn begin_write(&self) -> Result<WritePermit<'_>, FeedError> {
        let slot = self.tx.reserve().await.map_err(|_| FeedError::Closed)?;
        let last = self.sequencer.lock().await;
        Ok(WritePermit { slot, last })
    }

    /// Queue an already-committed change, waiting for room if the channel is full
    pub async fn publish(&self, event: EntityChangeEvent) -> Result<u64, FeedError> {
        Ok(self.begin_write().await?.publish(event))
    }

    /// Run a full recompute on the delivery worker and wait for its result
    pub async fn request_recompute(&self) -> Result<AggregateSnapshot, FeedError> {
        let (reply, result) = oneshot::channel();
        self.tx
            .send(FeedMessage::Recompute(reply))
            .await
            .map_err(|_| FeedError::Closed)?;
        let snapshot = result.await.map_err(|_| FeedError::Closed)??;
        Ok(snapshot)
    }
}

/// Retry policy applied by the delivery worker
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Worker counters
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
}

impl DeliveryStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Changes already counted by a recompute when they came off the queue
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Deliver one event, retrying surfaced failures per `policy`
pub async fn deliver(
    maintainer: &AggregateMaintainer,
    event: &EntityChangeEvent,
    policy: &DeliveryPolicy,
) -> Result<ChangeOutcome, AggregateError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match maintainer
            .on_entity_changed(&event.entity_id, event.before.as_ref(), event.after.as_ref())
            .await
        {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    entity_id = %event.entity_id,
                    attempt,
                    error = %e,
                    "Change delivery failed, retrying"
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Spawn the single delivery worker; it exits when every [`ChangeFeed`] is dropped
pub fn spawn_delivery_worker(
    maintainer: Arc<AggregateMaintainer>,
    mut rx: mpsc::Receiver<FeedMessage>,
    policy: DeliveryPolicy,
    event_bus: EventBus,
) -> (Arc<DeliveryStats>, JoinHandle<()>) {
    let stats = Arc::new(DeliveryStats::default());
    let worker_stats = Arc::clone(&stats);

    let handle = tokio::spawn(async move {
        info!(aggregate = maintainer.aggregate_name(), "Change delivery worker started");

        while let Some(message) = rx.recv().await {
            let SequencedChange { seq, event } = match message {
                FeedMessage::Change(change) => change,
                FeedMessage::Recompute(reply) => {
                    let result = maintainer.recompute_all().await;
                    if let Err(e) = &result {
                        warn!(error = %e, "Requested recompute failed");
                    }
                    // Requester may have given up waiting
                    let _ = reply.send(result);
                    continue;
                }
            };

            if seq <= maintainer.counted_through() {
                worker_stats.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(entity_id = %event.entity_id, seq, "Change already counted by recompute");
                continue;
            }

            match deliver(&maintainer, &event, &policy).await {
                Ok(outcome) => {
                    worker_stats.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(entity_id = %event.entity_id, seq, ?outcome, "Change delivered");
                }
                Err(e) => {
                    worker_stats.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(
                        entity_id = %event.entity_id,
                        seq,
                        error = %e,
                        "Dropping change; scheduled recompute will repair"
                    );
                    event_bus.emit_lossy(EduEvent::ChangeDeliveryFailed {
                        aggregate: maintainer.aggregate_name().to_string(),
                        entity_id: event.entity_id.clone(),
                        attempts: policy.max_attempts,
                        error: e.to_string(),
                        timestamp: edu_common::time::now(),
                    });
                }
            }
        }

        info!("Change delivery worker stopped");
    });

    (stats, handle)
}
