//! Job record storage
//!
//! The job row is large and shared with other writers, so every write here
//! touches only the columns it names.
//!
//! # Example
//!
//! ```rust,no_run
//! use mobility_core::{JobUpdate, NewJob};
//! use mobility_storage::jobs;
//!
//! # async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//! let job = jobs::create(
//!     pool,
//!     NewJob {
//!         source_path: "s3://vendor/exports/42/".into(),
//!         ..Default::default()
//!     },
//! )
//! .await?;
//!
//! jobs::update(
//!     pool,
//!     &job.id,
//!     JobUpdate {
//!         error_message: Some("vendor bucket unreachable".into()),
//!         ..Default::default()
//!     },
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::columns::{
    counter, date, json, optional_counter, parse_counter, parse_date, parse_json,
    parse_optional_counter, parse_optional_timestamp, parse_timestamp, timestamp,
};
use crate::StorageError;
use chrono::Utc;
use mobility_core::{Job, JobId, JobUpdate, NewJob, RunId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

type Result<T> = std::result::Result<T, StorageError>;

const COLUMNS: &str = r#"
    id, source_path, destination_path, synced_at, sync_cancelled_at, error_message,
    sync_lock_at, sync_run_id, sync_started_at, expected_object_count,
    expected_total_bytes, copied_objects, copied_bytes, failed_objects, sync_progress,
    verification_summary, requested_start_date, requested_end_date, created_at, updated_at
"#;

fn from_row(row: &SqliteRow) -> Result<Job> {
    Ok(Job {
        id: JobId::new(row.try_get::<String, _>("id")?),
        source_path: row.try_get("source_path")?,
        destination_path: row.try_get("destination_path")?,
        synced_at: parse_optional_timestamp("synced_at", row.try_get("synced_at")?)?,
        sync_cancelled_at: parse_optional_timestamp(
            "sync_cancelled_at",
            row.try_get("sync_cancelled_at")?,
        )?,
        error_message: row.try_get("error_message")?,
        sync_lock_at: parse_optional_timestamp("sync_lock_at", row.try_get("sync_lock_at")?)?,
        sync_run_id: row
            .try_get::<Option<String>, _>("sync_run_id")?
            .map(RunId::new),
        sync_started_at: parse_optional_timestamp(
            "sync_started_at",
            row.try_get("sync_started_at")?,
        )?,
        expected_object_count: parse_optional_counter(
            "expected_object_count",
            row.try_get("expected_object_count")?,
        )?,
        expected_total_bytes: parse_optional_counter(
            "expected_total_bytes",
            row.try_get("expected_total_bytes")?,
        )?,
        copied_objects: parse_counter("copied_objects", row.try_get("copied_objects")?)?,
        copied_bytes: parse_counter("copied_bytes", row.try_get("copied_bytes")?)?,
        failed_objects: parse_counter("failed_objects", row.try_get("failed_objects")?)?,
        sync_progress: parse_json(row.try_get("sync_progress")?)?,
        verification_summary: row.try_get("verification_summary")?,
        requested_start_date: parse_date(
            "requested_start_date",
            row.try_get("requested_start_date")?,
        )?,
        requested_end_date: parse_date("requested_end_date", row.try_get("requested_end_date")?)?,
        created_at: parse_timestamp("created_at", &row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp("updated_at", &row.try_get::<String, _>("updated_at")?)?,
    })
}

/// Get a job by ID
pub async fn get_by_id(pool: &SqlitePool, id: &JobId) -> Result<Option<Job>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

/// Get all jobs, newest first
pub async fn get_all(pool: &SqlitePool) -> Result<Vec<Job>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM jobs ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Create a job with a generated ID
pub async fn create(pool: &SqlitePool, new_job: NewJob) -> Result<Job> {
    let mut job = Job::new(JobId::generate(), new_job.source_path);
    job.destination_path = new_job.destination_path;
    job.requested_start_date = new_job.requested_start_date;
    job.requested_end_date = new_job.requested_end_date;

    sqlx::query(
        r#"
        INSERT INTO jobs (id, source_path, destination_path, requested_start_date,
                          requested_end_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.id.as_str())
    .bind(&job.source_path)
    .bind(&job.destination_path)
    .bind(date(job.requested_start_date))
    .bind(date(job.requested_end_date))
    .bind(timestamp(job.created_at))
    .bind(timestamp(job.updated_at))
    .execute(pool)
    .await?;

    Ok(job)
}

/// Merge the set fields of `update` into the job
pub async fn update(pool: &SqlitePool, id: &JobId, update: JobUpdate) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE jobs SET
            destination_path = COALESCE(?, destination_path),
            synced_at = COALESCE(?, synced_at),
            sync_cancelled_at = COALESCE(?, sync_cancelled_at),
            error_message = COALESCE(?, error_message),
            copied_objects = COALESCE(?, copied_objects),
            copied_bytes = COALESCE(?, copied_bytes),
            failed_objects = COALESCE(?, failed_objects),
            sync_progress = COALESCE(?, sync_progress),
            verification_summary = COALESCE(?, verification_summary),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(update.destination_path)
    .bind(update.synced_at.map(timestamp))
    .bind(update.sync_cancelled_at.map(timestamp))
    .bind(update.error_message)
    .bind(optional_counter(update.copied_objects)?)
    .bind(optional_counter(update.copied_bytes)?)
    .bind(optional_counter(update.failed_objects)?)
    .bind(json(update.sync_progress.as_ref())?)
    .bind(update.verification_summary)
    .bind(timestamp(Utc::now()))
    .bind(id.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Job", id.as_str()));
    }

    Ok(())
}

/// Start a run in one statement
///
/// Fixes the expected totals, takes the lock for `run_id`, stamps the start
/// and clears the completion, cancellation and error markers.
///
/// The lock is taken over even when another run holds it. Exclusion comes
/// from the in-process abort registry, so two processes sharing one database
/// can both run the same job; `release_lock` only keeps the loser from
/// clearing the winner's lock.
pub async fn initialize_sync(
    pool: &SqlitePool,
    id: &JobId,
    destination_path: &str,
    expected_count: u64,
    expected_bytes: u64,
    run_id: &RunId,
) -> Result<()> {
    let now = timestamp(Utc::now());

    let result = sqlx::query(
        r#"
        UPDATE jobs SET
            destination_path = ?,
            expected_object_count = ?,
            expected_total_bytes = ?,
            sync_lock_at = ?,
            sync_run_id = ?,
            sync_started_at = ?,
            synced_at = NULL,
            sync_cancelled_at = NULL,
            error_message = NULL,
            failed_objects = 0,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(destination_path)
    .bind(counter(expected_count)?)
    .bind(counter(expected_bytes)?)
    .bind(&now)
    .bind(run_id.as_str())
    .bind(&now)
    .bind(&now)
    .bind(id.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Job", id.as_str()));
    }

    Ok(())
}

/// Release the lock if `run_id` still owns it
pub async fn release_lock(pool: &SqlitePool, id: &JobId, run_id: &RunId) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE jobs SET sync_lock_at = NULL, sync_run_id = NULL, updated_at = ?
        WHERE id = ? AND sync_run_id = ?
        "#,
    )
    .bind(timestamp(Utc::now()))
    .bind(id.as_str())
    .bind(run_id.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
