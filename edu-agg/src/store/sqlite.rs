//! SQLite-backed [`AggregateStore`] over the `families` collection
//!
//! Counters live one per row in `family_stats_counters`, keyed by
//! `(group_key, dimension)`: `group_key = ''` is the top level and
//! `dimension = ''` is the total, so blank keys on any other path are refused
//! before they can overwrite a total. Multi-path updates run in one transaction.

use super::AggregateStore;
use crate::aggregate::{
    AggregateCounts, AggregateSnapshot, ComputedBy, CounterPath, Dimensions, EntityRecord,
    SnapshotUpdate,
};
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

const TOP_LEVEL: &str = "";
const TOTAL: &str = "";

#[derive(Clone)]
pub struct SqliteAggregateStore {
    pool: SqlitePool,
}

impl SqliteAggregateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Row key for a counter path
fn columns(path: &CounterPath) -> Result<(&str, &str), StoreError> {
    let (key, blank) = match path {
        CounterPath::Total => ((TOP_LEVEL, TOTAL), false),
        CounterPath::Dimension(d) => ((TOP_LEVEL, d.as_str()), d.is_empty()),
        CounterPath::GroupTotal(g) => ((g.as_str(), TOTAL), g.is_empty()),
        CounterPath::GroupDimension(g, d) => ((g.as_str(), d.as_str()), g.is_empty() || d.is_empty()),
    };
    if blank {
        return Err(StoreError::InvalidRecord(format!("counter {} has a blank key", path)));
    }
    Ok(key)
}

fn path_from_columns(group_key: String, dimension: String) -> CounterPath {
    match (group_key.is_empty(), dimension.is_empty()) {
        (true, true) => CounterPath::Total,
        (true, false) => CounterPath::Dimension(dimension),
        (false, true) => CounterPath::GroupTotal(group_key),
        (false, false) => CounterPath::GroupDimension(group_key, dimension),
    }
}

fn to_db_count(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("counter overflow: {}", value)))
}

async fn upsert_counter(
    tx: &mut Transaction<'_, Sqlite>,
    path: &CounterPath,
    value: u64,
) -> Result<(), StoreError> {
    let (group_key, dimension) = columns(path)?;
    sqlx::query(
        r#"
        INSERT INTO family_stats_counters (group_key, dimension, count)
        VALUES (?, ?, ?)
        ON CONFLICT(group_key, dimension) DO UPDATE SET count = excluded.count
        "#,
    )
    .bind(group_key)
    .bind(dimension)
    .bind(to_db_count(value)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_meta(
    tx: &mut Transaction<'_, Sqlite>,
    last_updated: i64,
    computed_by: ComputedBy,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO family_stats_meta (id, last_updated, computed_by)
        VALUES (1, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            last_updated = excluded.last_updated,
            computed_by = excluded.computed_by
        "#,
    )
    .bind(last_updated)
    .bind(computed_by.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl AggregateStore for SqliteAggregateStore {
    async fn load_snapshot(&self) -> Result<Option<AggregateSnapshot>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let meta = sqlx::query("SELECT last_updated, computed_by FROM family_stats_meta WHERE id = 1")
            .fetch_optional(&mut *tx)
            .await?;
        let Some(meta) = meta else {
            return Ok(None);
        };

        let computed_by_raw: String = meta.get("computed_by");
        let computed_by = ComputedBy::parse(&computed_by_raw).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown computed_by '{}'", computed_by_raw))
        })?;

        let rows = sqlx::query("SELECT group_key, dimension, count FROM family_stats_counters")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut counts = AggregateCounts::default();
        for row in rows {
            let count: i64 = row.get("count");
            let value = u64::try_from(count)
                .map_err(|_| StoreError::Corrupt(format!("negative counter {}", count)))?;
            let path = path_from_columns(row.get("group_key"), row.get("dimension"));
            counts.set(&path, value);
        }

        Ok(Some(AggregateSnapshot {
            counts,
            last_updated: meta.get("last_updated"),
            computed_by,
        }))
    }

    async fn apply_update(&self, update: &SnapshotUpdate) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for write in &update.writes {
            upsert_counter(&mut tx, &write.path, write.value).await?;
        }
        upsert_meta(&mut tx, update.last_updated, update.computed_by).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM family_stats_counters")
            .execute(&mut *tx)
            .await?;

        upsert_counter(&mut tx, &CounterPath::Total, snapshot.counts.total).await?;
        for (path, value) in snapshot.counts.counters() {
            // Members-less keys are dropped rather than stored as stale zeros
            if value > 0 && path != CounterPath::Total {
                upsert_counter(&mut tx, &path, value).await?;
            }
        }

        upsert_meta(&mut tx, snapshot.last_updated, snapshot.computed_by).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn scan_entities(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT family_id, status, facilitator_key
            FROM families
            WHERE ?1 IS NULL OR family_id > ?1
            ORDER BY family_id
            LIMIT ?2
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let status: String = row.get("status");
                let facilitator_key: Option<String> = row.get("facilitator_key");
                EntityRecord {
                    entity_id: row.get("family_id"),
                    dimensions: Dimensions::new(status, facilitator_key.as_deref()),
                }
            })
            .collect())
    }
}
