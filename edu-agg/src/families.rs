//! Family collection writes with change capture
//!
//! Every write holds a [`WritePermit`] from the [`ChangeFeed`], reads the
//! prior row, commits the new state, and publishes the `(id, before, after)`
//! triple when the aggregate dimensions changed.

use crate::aggregate::Dimensions;
use crate::delivery::{ChangeFeed, EntityChangeEvent, WritePermit};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyRecord {
    pub family_id: String,
    pub status: String,
    pub facilitator_key: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl FamilyRecord {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.status.clone(), self.facilitator_key.as_deref())
    }
}

pub struct FamilyRepository {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl FamilyRepository {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    pub async fn get(&self, family_id: &str) -> Result<Option<FamilyRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT family_id, status, facilitator_key, data FROM families WHERE family_id = ?",
        )
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let data: String = row.get("data");
            Ok(FamilyRecord {
                family_id: row.get("family_id"),
                status: row.get("status"),
                facilitator_key: row.get("facilitator_key"),
                data: serde_json::from_str(&data)
                    .map_err(|e| StoreError::Corrupt(format!("family data: {}", e)))?,
            })
        })
        .transpose()
    }

    /// Create or replace a family; a blank status is `InvalidRecord`
    pub async fn upsert(
        &self,
        family_id: &str,
        dims: &Dimensions,
        data: &serde_json::Value,
    ) -> Result<FamilyRecord, StoreError> {
        let dims = dims.clone().normalized();
        if !dims.is_valid() {
            return Err(StoreError::InvalidRecord(format!(
                "family {}: status must not be blank",
                family_id
            )));
        }
        let permit = self.begin_write().await?;

        let mut tx = self.pool.begin().await?;
        let before = load_dimensions(&mut tx, family_id).await?;

        sqlx::query(
            r#"
            INSERT INTO families (family_id, status, facilitator_key, data, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(family_id) DO UPDATE SET
                status = excluded.status,
                facilitator_key = excluded.facilitator_key,
                data = excluded.data,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(family_id)
        .bind(&dims.status)
        .bind(dims.facilitator_key.as_deref())
        .bind(data.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if before.as_ref() != Some(&dims) {
            publish(permit, family_id, before, Some(dims.clone()));
        } else {
            debug!(family_id, "Family updated without dimension change");
        }

        Ok(FamilyRecord {
            family_id: family_id.to_string(),
            status: dims.status,
            facilitator_key: dims.facilitator_key,
            data: data.clone(),
        })
    }

    /// Delete a family; returns false if it did not exist
    pub async fn delete(&self, family_id: &str) -> Result<bool, StoreError> {
        let permit = self.begin_write().await?;

        let mut tx = self.pool.begin().await?;
        let before = load_dimensions(&mut tx, family_id).await?;
        if before.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM families WHERE family_id = ?")
            .bind(family_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        publish(permit, family_id, before, None);
        Ok(true)
    }

    /// Refuse writes the aggregate could not hear about
    async fn begin_write(&self) -> Result<WritePermit<'_>, StoreError> {
        self.feed
            .begin_write()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn publish(
    permit: WritePermit<'_>,
    family_id: &str,
    before: Option<Dimensions>,
    after: Option<Dimensions>,
) {
    let seq = permit.publish(EntityChangeEvent {
        entity_id: family_id.to_string(),
        before,
        after,
    });
    debug!(family_id, seq, "Published family change");
}

async fn load_dimensions(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    family_id: &str,
) -> Result<Option<Dimensions>, StoreError> {
    let row = sqlx::query("SELECT status, facilitator_key FROM families WHERE family_id = ?")
        .bind(family_id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(row.map(|row| {
        let status: String = row.get("status");
        let facilitator_key: Option<String> = row.get("facilitator_key");
        Dimensions::new(status, facilitator_key.as_deref())
    }))
}
