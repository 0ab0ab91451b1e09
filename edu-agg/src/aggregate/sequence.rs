//! Change sequencing
//!
//! Every committed write that affects the aggregate takes the next feed
//! position while holding the sequencer lock. A full recompute holds the same
//! lock for its scan and snapshot replace, so the position it reads is exactly
//! the set of changes its scan already counted.

use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct ChangeSequencer {
    /// Last position handed out; 0 means none yet
    last: Mutex<u64>,
}

impl ChangeSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold off writers; the guard derefs to the last assigned position
    pub async fn lock(&self) -> MutexGuard<'_, u64> {
        self.last.lock().await
    }
}
