//! Sync state storage
//!
//! One small row per job, replaced wholesale on every snapshot write.

use crate::columns::{
    counter, json, optional_counter, parse_counter, parse_json, parse_optional_counter,
    parse_optional_timestamp, parse_timestamp, timestamp,
};
use crate::StorageError;
use mobility_core::{JobId, SyncState};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

type Result<T> = std::result::Result<T, StorageError>;

fn from_row(row: &SqliteRow) -> Result<SyncState> {
    Ok(SyncState {
        job_id: JobId::new(row.try_get::<String, _>("job_id")?),
        copied_objects: parse_counter("copied_objects", row.try_get("copied_objects")?)?,
        copied_bytes: parse_counter("copied_bytes", row.try_get("copied_bytes")?)?,
        failed_objects: parse_counter("failed_objects", row.try_get("failed_objects")?)?,
        expected_object_count: parse_optional_counter(
            "expected_object_count",
            row.try_get("expected_object_count")?,
        )?,
        expected_total_bytes: parse_optional_counter(
            "expected_total_bytes",
            row.try_get("expected_total_bytes")?,
        )?,
        progress: parse_json(row.try_get("progress")?)?,
        started_at: parse_optional_timestamp("started_at", row.try_get("started_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        updated_at: parse_timestamp("updated_at", &row.try_get::<String, _>("updated_at")?)?,
    })
}

/// Get the state of a job
pub async fn get(pool: &SqlitePool, job_id: &JobId) -> Result<Option<SyncState>> {
    let row = sqlx::query(
        r#"
        SELECT job_id, copied_objects, copied_bytes, failed_objects, expected_object_count,
               expected_total_bytes, progress, started_at, completed_at, updated_at
        FROM sync_states
        WHERE job_id = ?
        "#,
    )
    .bind(job_id.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// Insert or replace the state of a job
pub async fn put(pool: &SqlitePool, state: &SyncState) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_states (job_id, copied_objects, copied_bytes, failed_objects,
                                 expected_object_count, expected_total_bytes, progress,
                                 started_at, completed_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            copied_objects = excluded.copied_objects,
            copied_bytes = excluded.copied_bytes,
            failed_objects = excluded.failed_objects,
            expected_object_count = excluded.expected_object_count,
            expected_total_bytes = excluded.expected_total_bytes,
            progress = excluded.progress,
            started_at = excluded.started_at,
            completed_at = excluded.completed_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(state.job_id.as_str())
    .bind(counter(state.copied_objects)?)
    .bind(counter(state.copied_bytes)?)
    .bind(counter(state.failed_objects)?)
    .bind(optional_counter(state.expected_object_count)?)
    .bind(optional_counter(state.expected_total_bytes)?)
    .bind(json(state.progress.as_ref())?)
    .bind(state.started_at.map(timestamp))
    .bind(state.completed_at.map(timestamp))
    .bind(timestamp(state.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove the state of a job
pub async fn delete(pool: &SqlitePool, job_id: &JobId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM sync_states WHERE job_id = ?")
        .bind(job_id.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
