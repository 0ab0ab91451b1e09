//! Delta planning
//!
//! Turns one classified entity change into the absolute counter values a
//! multi-path update must write. Pure: reads the current snapshot, never
//! touches storage.

use super::types::{
    AggregateCounts, AggregateSnapshot, ComputedBy, CounterPath, CounterWrite, Dimensions,
    EntityChange, SnapshotUpdate,
};
use edu_common::time::monotonic_stamp;
use std::collections::BTreeMap;

/// Result of planning one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPlan {
    pub update: SnapshotUpdate,
    /// Counters that would have gone negative and were clamped at zero
    pub underflows: Vec<CounterPath>,
}

/// Pending counter values layered over a snapshot
struct CounterLedger<'a> {
    base: &'a AggregateCounts,
    pending: BTreeMap<CounterPath, u64>,
    underflows: Vec<CounterPath>,
}

impl<'a> CounterLedger<'a> {
    fn new(base: &'a AggregateCounts) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
            underflows: Vec::new(),
        }
    }

    fn current(&self, path: &CounterPath) -> u64 {
        self.pending
            .get(path)
            .copied()
            .unwrap_or_else(|| self.base.get(path))
    }

    fn increment(&mut self, path: CounterPath) {
        let value = self.current(&path) + 1;
        self.pending.insert(path, value);
    }

    fn decrement(&mut self, path: CounterPath) {
        let current = self.current(&path);
        if current == 0 {
            self.underflows.push(path.clone());
        }
        self.pending.insert(path, current.saturating_sub(1));
    }

    /// Everything a live entity with `dims` contributes
    fn count_in(&mut self, dims: &Dimensions) {
        self.increment(CounterPath::Total);
        self.increment(CounterPath::Dimension(dims.status.clone()));
        if let Some(group) = &dims.facilitator_key {
            self.increment(CounterPath::GroupTotal(group.clone()));
            self.increment(CounterPath::GroupDimension(group.clone(), dims.status.clone()));
        }
    }

    fn count_out(&mut self, dims: &Dimensions) {
        self.decrement(CounterPath::Total);
        self.decrement(CounterPath::Dimension(dims.status.clone()));
        if let Some(group) = &dims.facilitator_key {
            self.decrement(CounterPath::GroupTotal(group.clone()));
            self.decrement(CounterPath::GroupDimension(group.clone(), dims.status.clone()));
        }
    }

    fn apply_update(&mut self, before: &Dimensions, after: &Dimensions) {
        let status_changed = before.status != after.status;
        let group_changed = before.facilitator_key != after.facilitator_key;

        // Top-level status counters move once regardless of group change
        if status_changed {
            self.decrement(CounterPath::Dimension(before.status.clone()));
            self.increment(CounterPath::Dimension(after.status.clone()));
        }

        if group_changed {
            if let Some(old) = &before.facilitator_key {
                self.decrement(CounterPath::GroupTotal(old.clone()));
                self.decrement(CounterPath::GroupDimension(old.clone(), before.status.clone()));
            }
            if let Some(new) = &after.facilitator_key {
                self.increment(CounterPath::GroupTotal(new.clone()));
                self.increment(CounterPath::GroupDimension(new.clone(), after.status.clone()));
            }
        } else if status_changed {
            if let Some(group) = &after.facilitator_key {
                self.decrement(CounterPath::GroupDimension(group.clone(), before.status.clone()));
                self.increment(CounterPath::GroupDimension(group.clone(), after.status.clone()));
            }
        }
    }

    fn into_writes(self) -> (Vec<CounterWrite>, Vec<CounterPath>) {
        let writes = self
            .pending
            .into_iter()
            .map(|(path, value)| CounterWrite { path, value })
            .collect();
        (writes, self.underflows)
    }
}

/// Plan the multi-path update for `change` against `snapshot`
///
/// Returns `None` for [`EntityChange::Unchanged`]: no writes at all.
pub fn plan_delta(snapshot: &AggregateSnapshot, change: &EntityChange) -> Option<DeltaPlan> {
    let mut ledger = CounterLedger::new(&snapshot.counts);

    match change {
        EntityChange::Created(after) => ledger.count_in(after),
        EntityChange::Deleted(before) => ledger.count_out(before),
        EntityChange::Updated { before, after } => ledger.apply_update(before, after),
        EntityChange::Unchanged => return None,
    }

    let (writes, underflows) = ledger.into_writes();
    Some(DeltaPlan {
        update: SnapshotUpdate {
            writes,
            last_updated: monotonic_stamp(Some(snapshot.last_updated)),
            computed_by: ComputedBy::Incremental,
        },
        underflows,
    })
}
