//! Aggregate maintainer behaviour against the in-memory store
//!
//! Covers:
//! - create / update / delete scenarios for a single family
//! - missing snapshot and fault-injected fallback branches
//! - floor clamp on drifted counters
//! - delta/recompute equivalence over a random change sequence

use edu_agg::aggregate::{
    AggregateCounts, AggregateMaintainer, AggregateSnapshot, ChangeOutcome, ComputedBy,
    Dimensions, MaintainerConfig,
};
use edu_agg::store::MemoryAggregateStore;
use edu_agg::AggregateError;
use edu_common::events::{EduEvent, EventBus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

fn setup(batch: usize) -> (Arc<MemoryAggregateStore>, AggregateMaintainer) {
    let store = Arc::new(MemoryAggregateStore::new());
    let maintainer = AggregateMaintainer::new(
        store.clone(),
        MaintainerConfig {
            aggregate_name: "families".to_string(),
            scan_batch_size: batch,
        },
    );
    (store, maintainer)
}

/// Mutate the collection and notify the maintainer, like a change trigger would
async fn change(
    store: &MemoryAggregateStore,
    maintainer: &AggregateMaintainer,
    id: &str,
    after: Option<Dimensions>,
) -> Result<ChangeOutcome, AggregateError> {
    let before = store.entity(id);
    match &after {
        Some(dims) => store.put_entity(id, dims.clone()),
        None => {
            store.remove_entity(id);
        }
    }
    maintainer
        .on_entity_changed(id, before.as_ref(), after.as_ref())
        .await
}

fn stored(store: &MemoryAggregateStore) -> AggregateSnapshot {
    store.stored_snapshot().expect("snapshot should exist")
}

#[tokio::test]
async fn test_family_lifecycle_scenario() {
    let (store, maintainer) = setup(100);
    maintainer.recompute_all().await.unwrap();

    // Created active under f1
    let outcome = change(&store, &maintainer, "fam1", Some(Dimensions::new("active", Some("f1"))))
        .await
        .unwrap();
    assert_eq!(outcome, ChangeOutcome::Applied);
    let s = stored(&store);
    assert_eq!(s.counts.total, 1);
    assert_eq!(s.counts.by_dimension.get("active"), 1);
    assert_eq!(s.counts.by_group["f1"].total, 1);
    assert_eq!(s.counts.by_group["f1"].by_dimension.get("active"), 1);
    assert_eq!(s.computed_by, ComputedBy::Incremental);

    // Archived, same facilitator
    change(&store, &maintainer, "fam1", Some(Dimensions::new("archived", Some("f1"))))
        .await
        .unwrap();
    let s = stored(&store);
    assert_eq!(s.counts.total, 1);
    assert_eq!(s.counts.by_dimension.get("active"), 0);
    assert_eq!(s.counts.by_dimension.get("archived"), 1);
    assert_eq!(s.counts.by_group["f1"].total, 1);
    assert_eq!(s.counts.by_group["f1"].by_dimension.get("active"), 0);
    assert_eq!(s.counts.by_group["f1"].by_dimension.get("archived"), 1);

    // Deleted
    change(&store, &maintainer, "fam1", None).await.unwrap();
    let s = stored(&store);
    assert_eq!(s.counts.total, 0);
    assert_eq!(s.counts.by_dimension.get("active"), 0);
    assert_eq!(s.counts.by_dimension.get("archived"), 0);
    assert_eq!(s.counts.by_group["f1"].total, 0);
    assert_eq!(s.counts.by_group["f1"].by_dimension.get("archived"), 0);

    // Incremental path never underflowed
    assert_eq!(maintainer.underflow_count(), 0);
}

#[tokio::test]
async fn test_redundant_call_performs_zero_writes() {
    let (store, maintainer) = setup(100);
    maintainer.recompute_all().await.unwrap();
    let dims = Dimensions::new("active", Some("f1"));
    change(&store, &maintainer, "fam1", Some(dims.clone())).await.unwrap();

    let writes_before = store.write_count();
    let outcome = maintainer
        .on_entity_changed("fam1", Some(&dims), Some(&dims))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Unchanged);
    assert_eq!(store.write_count(), writes_before);
}

#[tokio::test]
async fn test_blank_status_is_invalid_change_without_writes() {
    let (store, maintainer) = setup(100);
    maintainer.recompute_all().await.unwrap();
    change(&store, &maintainer, "fam1", Some(Dimensions::new("active", None))).await.unwrap();
    let before = stored(&store);
    let writes_before = store.write_count();

    let blank = Dimensions {
        status: "  ".to_string(),
        facilitator_key: None,
    };
    let err = maintainer
        .on_entity_changed("fam2", None, Some(&blank))
        .await
        .unwrap_err();

    assert!(matches!(err, AggregateError::InvalidChange { ref entity_id, .. } if entity_id == "fam2"));
    assert!(!err.is_retryable());
    assert_eq!(store.write_count(), writes_before);
    assert_eq!(stored(&store), before);
}

#[tokio::test]
async fn test_padded_status_counts_under_trimmed_key() {
    let (store, maintainer) = setup(100);
    maintainer.recompute_all().await.unwrap();
    let padded = Dimensions {
        status: " active ".to_string(),
        facilitator_key: Some(" f1 ".to_string()),
    };
    store.put_entity("fam1", Dimensions::new("active", Some("f1")));

    let outcome = maintainer
        .on_entity_changed("fam1", None, Some(&padded))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Applied);
    let s = stored(&store);
    assert_eq!(s.counts.by_dimension.get("active"), 1);
    assert_eq!(s.counts.by_dimension.get(" active "), 0);
    assert_eq!(s.counts.by_group["f1"].total, 1);
    assert!(!maintainer.verify().await.unwrap().drifted);
}

#[tokio::test]
async fn test_recompute_skips_entities_with_blank_status() {
    let (store, maintainer) = setup(2);
    store.put_entity("fam1", Dimensions::new("active", None));
    store.put_entity(
        "fam2",
        Dimensions {
            status: String::new(),
            facilitator_key: None,
        },
    );
    store.put_entity("fam3", Dimensions::new("active", Some("f1")));

    let snapshot = maintainer.recompute_all().await.unwrap();

    assert_eq!(snapshot.counts.total, 2);
    assert_eq!(snapshot.counts.by_dimension.get("active"), 2);
    assert_eq!(snapshot.counts.by_dimension.get(""), 0);
}

#[tokio::test]
async fn test_missing_snapshot_triggers_full_recompute() {
    let (store, maintainer) = setup(100);
    store.put_entity("fam0", Dimensions::new("inactive", None));

    let outcome = change(&store, &maintainer, "fam1", Some(Dimensions::new("active", Some("f1"))))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Recomputed);
    let s = stored(&store);
    assert_eq!(s.computed_by, ComputedBy::FullRecompute);
    assert_eq!(s.counts.total, 2);
    assert_eq!(s.counts.by_dimension.get("inactive"), 1);
    assert_eq!(s.counts.by_group["f1"].total, 1);
}

#[tokio::test]
async fn test_load_failure_falls_back_to_recompute() {
    let (store, maintainer) = setup(100);
    maintainer.recompute_all().await.unwrap();

    store.fail_next_loads(1);
    let outcome = change(&store, &maintainer, "fam1", Some(Dimensions::new("active", None)))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Recomputed);
    assert_eq!(stored(&store).counts.total, 1);
}

#[tokio::test]
async fn test_write_failure_falls_back_to_recompute() {
    let (store, maintainer) = setup(100);
    maintainer.recompute_all().await.unwrap();

    store.fail_next_applies(1);
    let outcome = change(&store, &maintainer, "fam1", Some(Dimensions::new("active", Some("f2"))))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Recomputed);
    let s = stored(&store);
    assert_eq!(s.counts.total, 1);
    assert_eq!(s.counts.by_group["f2"].by_dimension.get("active"), 1);
}

#[tokio::test]
async fn test_failed_fallback_surfaces_write_failure_without_partial_state() {
    let (store, maintainer) = setup(100);
    maintainer.recompute_all().await.unwrap();
    let before = stored(&store);

    store.fail_next_applies(1);
    store.fail_next_replaces(1);
    let err = change(&store, &maintainer, "fam1", Some(Dimensions::new("active", None)))
        .await
        .unwrap_err();

    match err {
        AggregateError::WriteFailure { entity_id, .. } => assert_eq!(entity_id, "fam1"),
        other => panic!("expected WriteFailure, got {:?}", other),
    }
    assert_eq!(stored(&store), before);

    // Only one fallback attempt: the next change works normally
    let outcome = change(&store, &maintainer, "fam2", Some(Dimensions::new("active", None)))
        .await
        .unwrap();
    assert_eq!(outcome, ChangeOutcome::Applied);
}

#[tokio::test]
async fn test_missing_snapshot_and_failed_recompute_is_write_failure() {
    let (store, maintainer) = setup(100);
    store.fail_next_replaces(1);

    let result = change(&store, &maintainer, "fam1", Some(Dimensions::new("active", None))).await;

    assert!(matches!(result, Err(AggregateError::WriteFailure { .. })));
    assert!(store.stored_snapshot().is_none());
}

#[tokio::test]
async fn test_decrement_at_zero_clamps_and_counts_underflow() {
    let (store, maintainer) = setup(100);
    maintainer.recompute_all().await.unwrap();

    // Drifted: the entity exists but was never counted
    let dims = Dimensions::new("active", Some("f1"));
    let outcome = maintainer
        .on_entity_changed("ghost", Some(&dims), None)
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Applied);
    let s = stored(&store);
    assert_eq!(s.counts.total, 0);
    assert_eq!(s.counts.by_dimension.get("active"), 0);
    assert_eq!(s.counts.by_group["f1"].total, 0);
    assert_eq!(maintainer.underflow_count(), 4);
}

#[tokio::test]
async fn test_recompute_is_idempotent_and_drops_stale_keys() {
    let (store, maintainer) = setup(2);
    for (id, status, group) in [
        ("a", "active", Some("f1")),
        ("b", "active", Some("f2")),
        ("c", "archived", None),
        ("d", "inactive", Some("f1")),
        ("e", "active", None),
    ] {
        store.put_entity(id, Dimensions::new(status, group));
    }

    let mut stale = AggregateCounts::default();
    stale.add_entity(&Dimensions::new("withdrawn", Some("ghost")));
    store.set_snapshot(Some(AggregateSnapshot {
        counts: stale,
        last_updated: 1,
        computed_by: ComputedBy::Incremental,
    }));

    let first = maintainer.recompute_all().await.unwrap();
    let second = maintainer.recompute_all().await.unwrap();

    assert_eq!(first.counts, second.counts);
    assert_eq!(first.computed_by, second.computed_by);
    assert!(second.last_updated >= first.last_updated);
    assert_eq!(first.counts.total, 5);
    assert_eq!(first.counts.by_dimension.get("active"), 3);
    assert!(!first.counts.by_group.contains_key("ghost"));
    assert_eq!(first.counts.by_dimension.iter().count(), 3);
    assert_eq!(stored(&store).counts.by_group["f1"].total, 2);
}

#[tokio::test]
async fn test_verify_reports_drift_without_writing() {
    let (store, maintainer) = setup(100);
    store.put_entity("fam1", Dimensions::new("active", None));
    maintainer.recompute_all().await.unwrap();

    let report = maintainer.verify().await.unwrap();
    assert!(!report.drifted);
    assert_eq!(report.entities_scanned, 1);

    // Entity appears without a change notification
    store.put_entity("fam2", Dimensions::new("active", None));
    let writes = store.write_count();
    let report = maintainer.verify().await.unwrap();

    assert!(report.drifted);
    assert_eq!(report.actual.total, 2);
    assert_eq!(report.stored.unwrap().total, 1);
    assert_eq!(store.write_count(), writes);
}

#[tokio::test]
async fn test_events_emitted_for_updates() {
    let store = Arc::new(MemoryAggregateStore::new());
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let maintainer = AggregateMaintainer::new(store.clone(), MaintainerConfig::default())
        .with_event_bus(bus);

    maintainer.recompute_all().await.unwrap();
    change(&store, &maintainer, "fam1", Some(Dimensions::new("active", None)))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        EduEvent::AggregateUpdated { computed_by, .. } => assert_eq!(computed_by, "full_recompute"),
        other => panic!("unexpected {:?}", other),
    }
    match rx.recv().await.unwrap() {
        EduEvent::AggregateUpdated { computed_by, total, .. } => {
            assert_eq!(computed_by, "incremental");
            assert_eq!(total, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_random_sequence_matches_recompute_after_every_step() {
    let (store, maintainer) = setup(7);
    maintainer.recompute_all().await.unwrap();

    let statuses = ["active", "archived", "inactive"];
    let groups = [None, Some("f1"), Some("f2"), Some("f3")];
    let mut live: BTreeMap<String, Dimensions> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..400 {
        let id = format!("fam{:02}", rng.gen_range(0..25));
        let after = if live.contains_key(&id) && rng.gen_bool(0.3) {
            None
        } else {
            Some(Dimensions::new(
                statuses[rng.gen_range(0..statuses.len())],
                groups[rng.gen_range(0..groups.len())],
            ))
        };

        match &after {
            Some(dims) => {
                live.insert(id.clone(), dims.clone());
            }
            None => {
                live.remove(&id);
            }
        }
        change(&store, &maintainer, &id, after).await.unwrap();

        let expected = AggregateCounts::from_entities(live.values());
        assert_eq!(stored(&store).counts, expected, "invariant broken after change to {}", id);
    }

    let incremental = stored(&store).counts;
    let recomputed = maintainer.recompute_all().await.unwrap().counts;
    assert_eq!(incremental, recomputed);
    assert_eq!(maintainer.underflow_count(), 0);
}
