//! SQLite aggregate store tests (in-memory database)

use edu_agg::aggregate::{
    AggregateCounts, AggregateMaintainer, AggregateSnapshot, ChangeOutcome, ComputedBy,
    CounterPath, CounterWrite, Dimensions, MaintainerConfig, SnapshotUpdate,
};
use edu_agg::store::{AggregateStore, SqliteAggregateStore};
use edu_agg::StoreError;
use edu_common::db::init_memory_database;
use sqlx::SqlitePool;
use std::sync::Arc;

async fn setup() -> (SqlitePool, SqliteAggregateStore) {
    let pool = init_memory_database().await.expect("Should create database");
    let store = SqliteAggregateStore::new(pool.clone());
    (pool, store)
}

async fn insert_family(pool: &SqlitePool, id: &str, status: &str, facilitator: Option<&str>) {
    sqlx::query("INSERT INTO families (family_id, status, facilitator_key) VALUES (?, ?, ?)")
        .bind(id)
        .bind(status)
        .bind(facilitator)
        .execute(pool)
        .await
        .unwrap();
}

async fn counter_rows(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM family_stats_counters")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_load_without_meta_row_is_none() {
    let (_pool, store) = setup().await;
    assert!(store.load_snapshot().await.unwrap().is_none());
}

#[tokio::test]
async fn test_replace_then_load_roundtrips_counts() {
    let (pool, store) = setup().await;
    let counts = AggregateCounts::from_entities(&[
        Dimensions::new("active", Some("f1")),
        Dimensions::new("active", None),
        Dimensions::new("archived", Some("f2")),
    ]);
    let snapshot = AggregateSnapshot {
        counts: counts.clone(),
        last_updated: 1_700_000_000_000,
        computed_by: ComputedBy::FullRecompute,
    };

    store.replace_snapshot(&snapshot).await.unwrap();
    let loaded = store.load_snapshot().await.unwrap().unwrap();

    assert_eq!(loaded, snapshot);
    // total + 2 statuses + (f1 total, f1/active) + (f2 total, f2/archived)
    assert_eq!(counter_rows(&pool).await, 7);
}

#[tokio::test]
async fn test_replace_drops_keys_absent_from_new_snapshot() {
    let (pool, store) = setup().await;
    let stale = AggregateSnapshot {
        counts: AggregateCounts::from_entities(&[Dimensions::new("withdrawn", Some("old"))]),
        last_updated: 1,
        computed_by: ComputedBy::Incremental,
    };
    store.replace_snapshot(&stale).await.unwrap();

    let fresh = AggregateSnapshot {
        counts: AggregateCounts::from_entities(&[Dimensions::new("active", None)]),
        last_updated: 2,
        computed_by: ComputedBy::FullRecompute,
    };
    store.replace_snapshot(&fresh).await.unwrap();

    let loaded = store.load_snapshot().await.unwrap().unwrap();
    assert!(!loaded.counts.by_group.contains_key("old"));
    assert_eq!(loaded.counts.by_dimension.get("withdrawn"), 0);
    assert_eq!(counter_rows(&pool).await, 2);
}

#[tokio::test]
async fn test_apply_update_writes_every_path_and_meta() {
    let (_pool, store) = setup().await;
    let update = SnapshotUpdate {
        writes: vec![
            CounterWrite { path: CounterPath::Total, value: 4 },
            CounterWrite { path: CounterPath::Dimension("active".into()), value: 3 },
            CounterWrite { path: CounterPath::GroupTotal("f1".into()), value: 2 },
            CounterWrite {
                path: CounterPath::GroupDimension("f1".into(), "active".into()),
                value: 0,
            },
        ],
        last_updated: 42,
        computed_by: ComputedBy::Incremental,
    };

    store.apply_update(&update).await.unwrap();
    let loaded = store.load_snapshot().await.unwrap().unwrap();

    assert_eq!(loaded.counts.total, 4);
    assert_eq!(loaded.counts.by_dimension.get("active"), 3);
    assert_eq!(loaded.counts.by_group["f1"].total, 2);
    assert_eq!(loaded.counts.by_group["f1"].by_dimension.get("active"), 0);
    assert_eq!(loaded.last_updated, 42);
    assert_eq!(loaded.computed_by, ComputedBy::Incremental);
}

#[tokio::test]
async fn test_scan_entities_pages_in_id_order() {
    let (pool, store) = setup().await;
    for id in ["c", "a", "e", "b", "d"] {
        insert_family(&pool, id, "active", None).await;
    }

    let first = store.scan_entities(None, 2).await.unwrap();
    let second = store.scan_entities(Some("b"), 2).await.unwrap();
    let last = store.scan_entities(Some("d"), 2).await.unwrap();

    let ids = |records: &[edu_agg::aggregate::EntityRecord]| {
        records.iter().map(|r| r.entity_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), vec!["a", "b"]);
    assert_eq!(ids(&second), vec!["c", "d"]);
    assert_eq!(ids(&last), vec!["e"]);
}

#[tokio::test]
async fn test_maintainer_over_sqlite_matches_recompute() {
    let (pool, store) = setup().await;
    let maintainer = AggregateMaintainer::new(
        Arc::new(store),
        MaintainerConfig {
            aggregate_name: "families".to_string(),
            scan_batch_size: 2,
        },
    );

    insert_family(&pool, "fam1", "active", Some("f1")).await;
    let outcome = maintainer
        .on_entity_changed("fam1", None, Some(&Dimensions::new("active", Some("f1"))))
        .await
        .unwrap();
    // No snapshot yet
    assert_eq!(outcome, ChangeOutcome::Recomputed);

    insert_family(&pool, "fam2", "inactive", Some("f1")).await;
    let outcome = maintainer
        .on_entity_changed("fam2", None, Some(&Dimensions::new("inactive", Some("f1"))))
        .await
        .unwrap();
    assert_eq!(outcome, ChangeOutcome::Applied);

    sqlx::query("UPDATE families SET facilitator_key = 'f2' WHERE family_id = 'fam1'")
        .execute(&pool)
        .await
        .unwrap();
    maintainer
        .on_entity_changed(
            "fam1",
            Some(&Dimensions::new("active", Some("f1"))),
            Some(&Dimensions::new("active", Some("f2"))),
        )
        .await
        .unwrap();

    let incremental = maintainer.snapshot().await.unwrap().unwrap();
    assert_eq!(incremental.computed_by, ComputedBy::Incremental);
    assert_eq!(incremental.counts.by_group["f1"].total, 1);
    assert_eq!(incremental.counts.by_group["f2"].total, 1);

    let recomputed = maintainer.recompute_all().await.unwrap();
    assert_eq!(incremental.counts, recomputed.counts);
    assert!(recomputed.last_updated >= incremental.last_updated);
    assert!(!maintainer.verify().await.unwrap().drifted);
}

#[tokio::test]
async fn test_negative_count_is_rejected_by_schema() {
    let (pool, _store) = setup().await;
    let result = sqlx::query(
        "INSERT INTO family_stats_counters (group_key, dimension, count) VALUES ('', '', -1)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_blank_counter_key_cannot_overwrite_total() {
    let (_pool, store) = setup().await;
    let base = AggregateSnapshot {
        counts: AggregateCounts::from_entities(&[
            Dimensions::new("active", None),
            Dimensions::new("active", Some("f1")),
        ]),
        last_updated: 10,
        computed_by: ComputedBy::FullRecompute,
    };
    store.replace_snapshot(&base).await.unwrap();

    for path in [
        CounterPath::Dimension(String::new()),
        CounterPath::GroupTotal(String::new()),
        CounterPath::GroupDimension("f1".into(), String::new()),
    ] {
        let update = SnapshotUpdate {
            writes: vec![
                CounterWrite { path: CounterPath::Total, value: 3 },
                CounterWrite { path: path.clone(), value: 1 },
            ],
            last_updated: 11,
            computed_by: ComputedBy::Incremental,
        };
        let err = store.apply_update(&update).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)), "{} was written", path);
    }

    // Rejected updates rolled back as a whole
    let loaded = store.load_snapshot().await.unwrap().unwrap();
    assert_eq!(loaded, base);
    assert_eq!(loaded.counts.total, 2);
    assert_eq!(loaded.counts.by_group["f1"].total, 1);
}
