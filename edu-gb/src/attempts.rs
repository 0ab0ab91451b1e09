//! Per-question attempt records and their SQLite table

use crate::error::GradeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// Latest graded state of one question for one student
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt_time: Option<DateTime<Utc>>,
}

/// Question id → attempt record; a missing question means zero attempts, zero score
pub type AttemptMap = BTreeMap<String, AttemptRecord>;

/// All attempt records for one student in one course
pub async fn load_attempts(
    pool: &SqlitePool,
    course_id: &str,
    student_key: &str,
) -> Result<AttemptMap, GradeError> {
    let rows = sqlx::query(
        r#"
        SELECT question_id, score, attempts, last_attempt_time
        FROM question_attempts
        WHERE course_id = ? AND student_key = ?
        "#,
    )
    .bind(course_id)
    .bind(student_key)
    .fetch_all(pool)
    .await?;

    let mut attempts = AttemptMap::new();
    for row in rows {
        let question_id: String = row.get("question_id");
        let count: i64 = row.get("attempts");
        let last_attempt_time: Option<String> = row.get("last_attempt_time");

        let last_attempt_time = last_attempt_time
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| GradeError::AttemptMalformed {
                        question_id: question_id.clone(),
                        reason: format!("bad last_attempt_time '{}': {}", raw, e),
                    })
            })
            .transpose()?;

        let attempts_made = u32::try_from(count).map_err(|_| GradeError::AttemptMalformed {
            question_id: question_id.clone(),
            reason: format!("attempt count {} out of range", count),
        })?;

        let record = AttemptRecord {
            score: row.get("score"),
            attempts: attempts_made,
            last_attempt_time,
        };
        attempts.insert(question_id, record);
    }

    Ok(attempts)
}

/// Record one graded submission: attempts + 1, score replaced by the latest grade
pub async fn record_attempt(
    pool: &SqlitePool,
    course_id: &str,
    student_key: &str,
    question_id: &str,
    score: f64,
) -> Result<AttemptRecord, GradeError> {
    if !score.is_finite() {
        return Err(GradeError::AttemptMalformed {
            question_id: question_id.to_string(),
            reason: format!("score must be a finite number, got {}", score),
        });
    }

    let now = edu_common::time::now();
    let row = sqlx::query(
        r#"
        INSERT INTO question_attempts
            (student_key, course_id, question_id, score, attempts, last_attempt_time)
        VALUES (?, ?, ?, ?, 1, ?)
        ON CONFLICT(student_key, course_id, question_id) DO UPDATE SET
            score = excluded.score,
            attempts = question_attempts.attempts + 1,
            last_attempt_time = excluded.last_attempt_time
        RETURNING attempts
        "#,
    )
    .bind(student_key)
    .bind(course_id)
    .bind(question_id)
    .bind(score)
    .bind(now.to_rfc3339())
    .fetch_one(pool)
    .await?;

    let count: i64 = row.get("attempts");
    let attempts_made = u32::try_from(count).map_err(|_| GradeError::AttemptMalformed {
        question_id: question_id.to_string(),
        reason: format!("attempt count {} out of range", count),
    })?;
    Ok(AttemptRecord {
        score,
        attempts: attempts_made,
        last_attempt_time: Some(now),
    })
}
