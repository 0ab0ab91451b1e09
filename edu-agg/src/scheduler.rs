//! Periodic self-healing jobs
//!
//! Full recompute is the only correctness backstop for the aggregate, so it
//! also runs on a schedule regardless of how healthy the delta path looks.
//! Scheduled recomputes go through the [`ChangeFeed`] so they run on the
//! delivery worker, between queued changes.

use crate::delivery::ChangeFeed;
use crate::reconcile::LinkReconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Request a recompute every `interval`; `None` when the interval is zero
pub fn spawn_recompute_schedule(
    feed: ChangeFeed,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        info!("Scheduled recompute disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately; startup already recomputed if needed
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = feed.request_recompute().await {
                warn!(error = %e, "Scheduled recompute failed; will retry next interval");
            }
        }
    }))
}

/// Run link reconciliation every `interval`; `None` when the interval is zero
pub fn spawn_reconcile_schedule(
    reconciler: Arc<LinkReconciler>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            reconciler.run().await;
        }
    }))
}
