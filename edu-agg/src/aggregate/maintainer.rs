//! Aggregate maintainer
//!
//! Reacts to `(entity_id, before, after)` change triples by applying a
//! planned delta to the stored snapshot. Two branches fall back to a full
//! recompute:
//! - snapshot missing: expected on first run, not an error
//! - snapshot load or delta write failed: one recompute attempt, then the
//!   error is surfaced as [`AggregateError::WriteFailure`]
//!
//! Assumes one writer per aggregate: changes for a collection are processed
//! one at a time (see `delivery`). With a [`ChangeSequencer`] attached, each
//! recompute records the feed position its scan covers so the delivery
//! worker can skip queued changes that are already counted.

use super::delta::plan_delta;
use super::sequence::ChangeSequencer;
use super::types::{AggregateCounts, AggregateSnapshot, ComputedBy, CounterPath, Dimensions, EntityChange};
use crate::error::{AggregateError, StoreError};
use crate::store::AggregateStore;
use edu_common::events::{EduEvent, EventBus};
use edu_common::time::monotonic_stamp;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MaintainerConfig {
    /// Name used in logs and events (e.g. "families")
    pub aggregate_name: String,
    /// Page size for collection scans during recompute
    pub scan_batch_size: usize,
}

impl Default for MaintainerConfig {
    fn default() -> Self {
        Self {
            aggregate_name: "families".to_string(),
            scan_batch_size: 500,
        }
    }
}

/// What `on_entity_changed` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOutcome {
    /// Dimensions unchanged; nothing written
    Unchanged,
    /// Delta applied incrementally
    Applied,
    /// Snapshot rebuilt by full recompute
    Recomputed,
}

/// Stored counts compared with a fresh in-memory recompute
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub stored: Option<AggregateCounts>,
    pub actual: AggregateCounts,
    pub entities_scanned: u64,
    pub drifted: bool,
}

pub struct AggregateMaintainer {
    store: Arc<dyn AggregateStore>,
    config: MaintainerConfig,
    event_bus: Option<EventBus>,
    sequencer: Option<Arc<ChangeSequencer>>,
    /// Highest feed position included in the stored snapshot by a recompute
    counted_through: AtomicU64,
    underflows: AtomicU64,
}

impl AggregateMaintainer {
    pub fn new(store: Arc<dyn AggregateStore>, config: MaintainerConfig) -> Self {
        Self {
            store,
            config,
            event_bus: None,
            sequencer: None,
            counted_through: AtomicU64::new(0),
            underflows: AtomicU64::new(0),
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Share the feed's sequencer so recomputes and writers exclude each other
    pub fn with_sequencer(mut self, sequencer: Arc<ChangeSequencer>) -> Self {
        self.sequencer = Some(sequencer);
        self
    }

    /// Feed position covered by the last recompute; changes at or below it are counted
    pub fn counted_through(&self) -> u64 {
        self.counted_through.load(Ordering::Acquire)
    }

    pub fn aggregate_name(&self) -> &str {
        &self.config.aggregate_name
    }

    /// Counter decrements clamped at zero since startup
    pub fn underflow_count(&self) -> u64 {
        self.underflows.load(Ordering::Relaxed)
    }

    /// Read interface: the stored snapshot as-is
    pub async fn snapshot(&self) -> Result<Option<AggregateSnapshot>, AggregateError> {
        Ok(self.store.load_snapshot().await?)
    }

    /// React to one entity change
    pub async fn on_entity_changed(
        &self,
        entity_id: &str,
        before: Option<&Dimensions>,
        after: Option<&Dimensions>,
    ) -> Result<ChangeOutcome, AggregateError> {
        let before = before.cloned().map(Dimensions::normalized);
        let after = after.cloned().map(Dimensions::normalized);
        for dims in [&before, &after].into_iter().flatten() {
            if !dims.is_valid() {
                warn!(entity_id, "Rejecting change with blank status");
                return Err(AggregateError::InvalidChange {
                    entity_id: entity_id.to_string(),
                    reason: "status must not be blank".to_string(),
                });
            }
        }

        let change = EntityChange::classify(before.as_ref(), after.as_ref());
        if change.is_unchanged() {
            debug!(entity_id, "No aggregate-relevant change, skipping");
            return Ok(ChangeOutcome::Unchanged);
        }

        let snapshot = match self.store.load_snapshot().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!(
                    aggregate = %self.config.aggregate_name,
                    entity_id,
                    "No snapshot yet, running full recompute"
                );
                return self.fallback_recompute(entity_id).await;
            }
            Err(e) => {
                warn!(
                    aggregate = %self.config.aggregate_name,
                    entity_id,
                    error = %e,
                    "Snapshot load failed, falling back to full recompute"
                );
                return self.fallback_recompute(entity_id).await;
            }
        };

        let Some(plan) = plan_delta(&snapshot, &change) else {
            return Ok(ChangeOutcome::Unchanged);
        };

        for path in &plan.underflows {
            self.record_underflow(entity_id, path);
        }

        if let Err(e) = self.store.apply_update(&plan.update).await {
            warn!(
                aggregate = %self.config.aggregate_name,
                entity_id,
                error = %e,
                "Delta write failed, falling back to full recompute"
            );
            return self.fallback_recompute(entity_id).await;
        }

        debug!(
            aggregate = %self.config.aggregate_name,
            entity_id,
            change = change.kind(),
            writes = plan.update.writes.len(),
            "Applied incremental delta"
        );

        let total = plan
            .update
            .writes
            .iter()
            .find(|w| w.path == CounterPath::Total)
            .map_or(snapshot.counts.total, |w| w.value);
        self.emit_updated(ComputedBy::Incremental, total);

        Ok(ChangeOutcome::Applied)
    }

    /// Rebuild the snapshot from a full scan and replace it atomically
    ///
    /// With a sequencer attached, writers wait until the new snapshot is stored.
    pub async fn recompute_all(&self) -> Result<AggregateSnapshot, AggregateError> {
        let guard = match &self.sequencer {
            Some(sequencer) => Some(sequencer.lock().await),
            None => None,
        };
        let position = guard.as_deref().copied().unwrap_or(0);

        let (counts, scanned) = self.scan_counts().await?;

        // Best effort: a failed read only costs stamp monotonicity
        let previous = match self.store.load_snapshot().await {
            Ok(snapshot) => snapshot.map(|s| s.last_updated),
            Err(_) => None,
        };

        let snapshot = AggregateSnapshot {
            counts,
            last_updated: monotonic_stamp(previous),
            computed_by: ComputedBy::FullRecompute,
        };
        self.store.replace_snapshot(&snapshot).await?;
        self.counted_through.fetch_max(position, Ordering::AcqRel);
        drop(guard);

        info!(
            aggregate = %self.config.aggregate_name,
            entities = scanned,
            position,
            total = snapshot.counts.total,
            "Full recompute complete"
        );
        self.emit_updated(ComputedBy::FullRecompute, snapshot.counts.total);

        Ok(snapshot)
    }

    /// Compare the stored counts with a fresh scan, without writing
    pub async fn verify(&self) -> Result<DriftReport, AggregateError> {
        let (actual, scanned) = self.scan_counts().await?;
        let stored = self.store.load_snapshot().await?.map(|s| s.counts);
        let drifted = stored.as_ref() != Some(&actual);
        if drifted {
            warn!(aggregate = %self.config.aggregate_name, "Aggregate drift detected");
        }
        Ok(DriftReport {
            stored,
            actual,
            entities_scanned: scanned,
            drifted,
        })
    }

    async fn fallback_recompute(&self, entity_id: &str) -> Result<ChangeOutcome, AggregateError> {
        match self.recompute_all().await {
            Ok(_) => Ok(ChangeOutcome::Recomputed),
            Err(AggregateError::Store(source)) | Err(AggregateError::WriteFailure { source, .. }) => {
                Err(AggregateError::WriteFailure {
                    entity_id: entity_id.to_string(),
                    source,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Accumulate counts over the whole collection in `scan_batch_size` pages
    async fn scan_counts(&self) -> Result<(AggregateCounts, u64), StoreError> {
        let batch = self.config.scan_batch_size.max(1);
        let mut counts = AggregateCounts::default();
        let mut scanned = 0u64;
        let mut after: Option<String> = None;

        loop {
            let page = self.store.scan_entities(after.as_deref(), batch).await?;
            for record in &page {
                if !record.dimensions.is_valid() {
                    warn!(
                        aggregate = %self.config.aggregate_name,
                        entity_id = %record.entity_id,
                        "Skipping entity with blank status"
                    );
                    continue;
                }
                counts.add_entity(&record.dimensions);
            }
            scanned += page.len() as u64;

            if page.len() < batch {
                break;
            }
            after = page.last().map(|r| r.entity_id.clone());
        }

        Ok((counts, scanned))
    }

    fn record_underflow(&self, entity_id: &str, path: &CounterPath) {
        self.underflows.fetch_add(1, Ordering::Relaxed);
        warn!(
            aggregate = %self.config.aggregate_name,
            entity_id,
            counter = %path,
            "Counter underflow clamped at zero; aggregate has drifted"
        );
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(EduEvent::CounterUnderflow {
                aggregate: self.config.aggregate_name.clone(),
                counter: path.to_string(),
                timestamp: edu_common::time::now(),
            });
        }
    }

    fn emit_updated(&self, computed_by: ComputedBy, total: u64) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(EduEvent::AggregateUpdated {
                aggregate: self.config.aggregate_name.clone(),
                computed_by: computed_by.as_str().to_string(),
                total,
                timestamp: edu_common::time::now(),
            });
        }
    }
}
