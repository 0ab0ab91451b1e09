//! In-memory [`AggregateStore`] with fault injection
//!
//! Each fault switch holds a number of upcoming calls that will fail,
//! which lets tests drive every fallback branch of the maintainer.

use super::AggregateStore;
use crate::aggregate::{AggregateSnapshot, Dimensions, EntityRecord, SnapshotUpdate};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    entities: BTreeMap<String, Dimensions>,
    snapshot: Option<AggregateSnapshot>,
}

#[derive(Default)]
pub struct MemoryAggregateStore {
    state: Mutex<MemoryState>,
    fail_load: AtomicU32,
    fail_apply: AtomicU32,
    fail_replace: AtomicU32,
    writes: AtomicU64,
}

impl MemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Insert or overwrite a live entity (no change notification)
    pub fn put_entity(&self, entity_id: &str, dims: Dimensions) {
        if let Ok(mut state) = self.lock() {
            state.entities.insert(entity_id.to_string(), dims.normalized());
        }
    }

    pub fn remove_entity(&self, entity_id: &str) -> Option<Dimensions> {
        self.lock().ok()?.entities.remove(entity_id)
    }

    pub fn entity(&self, entity_id: &str) -> Option<Dimensions> {
        self.lock().ok()?.entities.get(entity_id).cloned()
    }

    /// Stored snapshot, bypassing fault injection
    pub fn stored_snapshot(&self) -> Option<AggregateSnapshot> {
        self.lock().ok()?.snapshot.clone()
    }

    /// Overwrite the stored snapshot directly (e.g. to simulate drift)
    pub fn set_snapshot(&self, snapshot: Option<AggregateSnapshot>) {
        if let Ok(mut state) = self.lock() {
            state.snapshot = snapshot;
        }
    }

    pub fn fail_next_loads(&self, n: u32) {
        self.fail_load.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_applies(&self, n: u32) {
        self.fail_apply.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_replaces(&self, n: u32) {
        self.fail_replace.store(n, Ordering::SeqCst);
    }

    /// Successful snapshot writes (deltas and replaces) so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn injected_failure(switch: &AtomicU32, operation: &str) -> Result<(), StoreError> {
        let tripped = switch
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Unavailable(format!("injected {} failure", operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn load_snapshot(&self) -> Result<Option<AggregateSnapshot>, StoreError> {
        Self::injected_failure(&self.fail_load, "load")?;
        Ok(self.lock()?.snapshot.clone())
    }

    async fn apply_update(&self, update: &SnapshotUpdate) -> Result<(), StoreError> {
        Self::injected_failure(&self.fail_apply, "apply")?;
        let mut state = self.lock()?;
        let current = state.snapshot.take();
        state.snapshot = Some(update.apply_to(current));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError> {
        Self::injected_failure(&self.fail_replace, "replace")?;
        self.lock()?.snapshot = Some(snapshot.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scan_entities(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        let state = self.lock()?;
        let records = state
            .entities
            .iter()
            .filter(|(id, _)| after.map_or(true, |a| id.as_str() > a))
            .take(limit)
            .map(|(id, dims)| EntityRecord {
                entity_id: id.clone(),
                dimensions: dims.clone(),
            })
            .collect();
        Ok(records)
    }
}
