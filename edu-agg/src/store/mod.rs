//! Storage access for the aggregate maintainer
//!
//! The maintainer never reaches for an ambient database handle; it is
//! handed an [`AggregateStore`] at construction.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryAggregateStore;
pub use sqlite::SqliteAggregateStore;

use crate::aggregate::{AggregateSnapshot, EntityRecord, SnapshotUpdate};
use crate::error::StoreError;
use async_trait::async_trait;

/// Backend holding the entity collection and its aggregate snapshot
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Current snapshot, or `None` if it has never been written
    async fn load_snapshot(&self) -> Result<Option<AggregateSnapshot>, StoreError>;

    /// Apply a multi-path update atomically (all writes or none)
    async fn apply_update(&self, update: &SnapshotUpdate) -> Result<(), StoreError>;

    /// Atomically replace the whole snapshot, dropping counters it does not mention
    async fn replace_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError>;

    /// Up to `limit` live entities with ids strictly greater than `after`, in id order
    async fn scan_entities(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntityRecord>, StoreError>;
}
