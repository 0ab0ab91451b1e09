//! Periodic self-healing job tests
//!
//! Run on a paused clock: sleeping auto-advances time once every task is idle.
//! Only in-memory stores are used so no pool timeouts race the fake clock.

use async_trait::async_trait;
use edu_agg::aggregate::{
    AggregateCounts, AggregateMaintainer, AggregateSnapshot, ComputedBy, Dimensions,
    MaintainerConfig,
};
use edu_agg::delivery::{spawn_delivery_worker, ChangeFeed, DeliveryPolicy};
use edu_agg::reconcile::{LinkReconciler, LinkStore, PasiLink};
use edu_agg::scheduler::{spawn_recompute_schedule, spawn_reconcile_schedule};
use edu_agg::store::MemoryAggregateStore;
use edu_agg::StoreError;
use edu_common::events::EventBus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Link store with no links that counts full passes
#[derive(Default)]
struct CountingLinkStore {
    passes: AtomicU64,
}

#[async_trait]
impl LinkStore for CountingLinkStore {
    async fn list_links(
        &self,
        after: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<PasiLink>, StoreError> {
        if after.is_none() {
            self.passes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Vec::new())
    }

    async fn student_course_exists(&self, _key: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn pasi_record_exists(&self, _record_id: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn delete_link(&self, _link: &PasiLink) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_dangling_refs(
        &self,
        _after: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }

    async fn clear_link_ref(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

fn drifted_snapshot() -> AggregateSnapshot {
    AggregateSnapshot {
        counts: AggregateCounts::from_entities(&[Dimensions::new("withdrawn", Some("old"))]),
        last_updated: 1,
        computed_by: ComputedBy::Incremental,
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_disables_both_schedules() {
    let store = Arc::new(MemoryAggregateStore::new());
    let maintainer = Arc::new(AggregateMaintainer::new(store, MaintainerConfig::default()));
    let (feed, rx) = ChangeFeed::channel(4);
    let (_stats, _worker) =
        spawn_delivery_worker(maintainer, rx, DeliveryPolicy::default(), EventBus::new(4));
    let reconciler = Arc::new(LinkReconciler::new(Arc::new(CountingLinkStore::default()), 10));

    assert!(spawn_recompute_schedule(feed, Duration::ZERO).is_none());
    assert!(spawn_reconcile_schedule(reconciler, Duration::ZERO).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_recompute_repairs_drift() {
    let store = Arc::new(MemoryAggregateStore::new());
    store.put_entity("fam1", Dimensions::new("active", Some("f1")));
    store.put_entity("fam2", Dimensions::new("active", None));
    store.set_snapshot(Some(drifted_snapshot()));

    let (feed, rx) = ChangeFeed::channel(4);
    let maintainer = Arc::new(
        AggregateMaintainer::new(store.clone(), MaintainerConfig::default())
            .with_sequencer(feed.sequencer()),
    );
    let (_stats, _worker) = spawn_delivery_worker(
        maintainer.clone(),
        rx,
        DeliveryPolicy::default(),
        EventBus::new(4),
    );
    let schedule = spawn_recompute_schedule(feed, Duration::from_secs(60)).unwrap();

    // First tick is skipped; nothing runs before one full interval
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(maintainer.verify().await.unwrap().drifted);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let report = maintainer.verify().await.unwrap();
    assert!(!report.drifted);
    let snapshot = store.stored_snapshot().unwrap();
    assert_eq!(snapshot.computed_by, ComputedBy::FullRecompute);
    assert_eq!(snapshot.counts.total, 2);
    assert_eq!(snapshot.counts.by_dimension.get("withdrawn"), 0);

    // Drift seeded again is repaired on the next interval
    store.set_snapshot(Some(drifted_snapshot()));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!maintainer.verify().await.unwrap().drifted);

    schedule.abort();
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_reconcile_runs_every_interval() {
    let links = Arc::new(CountingLinkStore::default());
    let reconciler = Arc::new(LinkReconciler::new(links.clone(), 10));
    let schedule = spawn_reconcile_schedule(reconciler, Duration::from_secs(30)).unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(links.passes.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(62)).await;
    assert_eq!(links.passes.load(Ordering::SeqCst), 3);

    schedule.abort();
}
