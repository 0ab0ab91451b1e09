//! Incremental aggregate maintenance
//!
//! Keeps a denormalized counter snapshot (totals, per-status and
//! per-facilitator breakdowns) consistent with the family collection by
//! applying per-change deltas, with full recomputation as the backstop.

pub mod delta;
pub mod maintainer;
pub mod sequence;
pub mod types;

pub use delta::{plan_delta, DeltaPlan};
pub use maintainer::{AggregateMaintainer, ChangeOutcome, DriftReport, MaintainerConfig};
pub use sequence::ChangeSequencer;
pub use types::{
    AggregateCounts, AggregateSnapshot, ComputedBy, CounterMap, CounterPath, CounterWrite,
    Dimensions, EntityChange, EntityRecord, GroupCounts, SnapshotUpdate,
};
