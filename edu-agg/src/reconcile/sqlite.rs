//! SQLite [`LinkStore`]

use super::{LinkStore, PasiLink};
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct SqliteLinkStore {
    pool: SqlitePool,
}

impl SqliteLinkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn db_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn list_links(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PasiLink>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT link_id, student_course_key, pasi_record_id
            FROM pasi_links
            WHERE ?1 IS NULL OR link_id > ?1
            ORDER BY link_id
            LIMIT ?2
            "#,
        )
        .bind(after)
        .bind(db_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PasiLink {
                link_id: row.get("link_id"),
                student_course_key: row.get("student_course_key"),
                pasi_record_id: row.get("pasi_record_id"),
            })
            .collect())
    }

    async fn student_course_exists(&self, student_course_key: &str) -> Result<bool, StoreError> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM student_courses WHERE student_course_key = ?)",
        )
        .bind(student_course_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    async fn pasi_record_exists(&self, record_id: &str) -> Result<bool, StoreError> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pasi_records WHERE record_id = ?)")
                .bind(record_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists != 0)
    }

    async fn delete_link(&self, link: &PasiLink) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pasi_links WHERE link_id = ?")
            .bind(&link.link_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE student_courses SET pasi_link_id = NULL WHERE pasi_link_id = ?")
            .bind(&link.link_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_dangling_refs(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let keys = sqlx::query_scalar(
            r#"
            SELECT sc.student_course_key
            FROM student_courses sc
            WHERE sc.pasi_link_id IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM pasi_links l WHERE l.link_id = sc.pasi_link_id)
              AND (?1 IS NULL OR sc.student_course_key > ?1)
            ORDER BY sc.student_course_key
            LIMIT ?2
            "#,
        )
        .bind(after)
        .bind(db_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn clear_link_ref(&self, student_course_key: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE student_courses SET pasi_link_id = NULL WHERE student_course_key = ?")
            .bind(student_course_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
