//! Sync status resolution
//!
//! Reconciles the job record with the ephemeral sync state into one
//! reportable status. Whenever a sync state exists its counters and ledger
//! win over the job's, which can lag by a write cycle or more; a ledger's
//! own per-day sums win over any separately stored aggregate.

use chrono::{DateTime, Duration, Utc};
use mobility_core::{Job, SyncProgress, SyncState, SyncStatus, SyncStatusResponse};

/// A lock held longer than this without release counts as stalled
pub const LOCK_STALL_MINUTES: i64 = 10;

/// A run or ledger idle longer than this counts as stalled
pub const INACTIVITY_STALL_MINUTES: i64 = 12;

/// `round(copied / expected * 100)`, 0 when nothing is expected
pub fn progress_percent(copied: u64, expected: u64) -> u8 {
    if expected == 0 {
        return 0;
    }
    let percent = (copied as f64 / expected as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

struct Counters<'a> {
    copied_objects: u64,
    copied_bytes: u64,
    failed_objects: u64,
    expected_objects: Option<u64>,
    expected_bytes: Option<u64>,
    progress: Option<&'a SyncProgress>,
    updated_at: Option<DateTime<Utc>>,
}

impl<'a> Counters<'a> {
    fn collect(job: &'a Job, state: Option<&'a SyncState>) -> Self {
        let mut counters = match state {
            Some(s) => Counters {
                copied_objects: s.copied_objects,
                copied_bytes: s.copied_bytes,
                failed_objects: s.failed_objects,
                expected_objects: s.expected_object_count.or(job.expected_object_count),
                expected_bytes: s.expected_total_bytes.or(job.expected_total_bytes),
                progress: s.progress.as_ref().or(job.sync_progress.as_ref()),
                updated_at: Some(s.updated_at),
            },
            None => Counters {
                copied_objects: job.copied_objects,
                copied_bytes: job.copied_bytes,
                failed_objects: job.failed_objects,
                expected_objects: job.expected_object_count,
                expected_bytes: job.expected_total_bytes,
                progress: job.sync_progress.as_ref(),
                updated_at: Some(job.updated_at),
            },
        };

        if let Some(progress) = counters.progress.filter(|p| !p.days.is_empty()) {
            counters.copied_objects = progress.copied_files();
            counters.copied_bytes = progress.copied_bytes();
            counters.failed_objects = progress.failed_files();
            counters.updated_at = progress.updated_at.or(counters.updated_at);
        }

        counters
    }

    fn unfinished(&self) -> bool {
        self.expected_objects
            .is_some_and(|expected| expected > 0 && self.copied_objects < expected)
    }
}

/// Why a run looks stalled, if it does
fn stall_reason(job: &Job, counters: &Counters<'_>, now: DateTime<Utc>) -> Option<String> {
    if !counters.unfinished() {
        return None;
    }

    let lock_limit = Duration::minutes(LOCK_STALL_MINUTES);
    let idle_limit = Duration::minutes(INACTIVITY_STALL_MINUTES);

    if let Some(locked_at) = job.sync_lock_at.filter(|t| now - *t > lock_limit) {
        return Some(format!(
            "sync lock held since {} without release",
            locked_at.to_rfc3339()
        ));
    }

    let has_terminal_marker =
        job.synced_at.is_some() || job.sync_cancelled_at.is_some() || job.error_message.is_some();
    if job.sync_lock_at.is_none() && !has_terminal_marker {
        if let Some(started_at) = job.sync_started_at.filter(|t| now - *t > idle_limit) {
            return Some(format!(
                "run started at {} ended without a result",
                started_at.to_rfc3339()
            ));
        }
    }

    if let Some(updated_at) = counters
        .progress
        .and_then(|p| p.updated_at)
        .filter(|t| now - *t > idle_limit)
    {
        return Some(format!("no progress since {}", updated_at.to_rfc3339()));
    }

    None
}

/// Resolve the reportable status of a job at `now`
pub fn resolve_status(
    job: &Job,
    state: Option<&SyncState>,
    now: DateTime<Utc>,
) -> SyncStatusResponse {
    let counters = Counters::collect(job, state);
    let percent = counters
        .expected_objects
        .map_or(0, |expected| progress_percent(counters.copied_objects, expected));

    let (status, message) = if job.source_path.as_deref().filter(|p| !p.is_empty()).is_none() {
        (SyncStatus::NotStarted, "Job has no source data yet".to_string())
    } else if job.destination_path.as_deref().filter(|p| !p.is_empty()).is_none() {
        (SyncStatus::NotStarted, "No destination assigned yet".to_string())
    } else if job.sync_cancelled_at.is_some() {
        (
            SyncStatus::Cancelled,
            format!(
                "Sync cancelled after {} of {} objects",
                counters.copied_objects,
                counters.expected_objects.unwrap_or_default()
            ),
        )
    } else if let Some(error) = job.error_message.as_ref().filter(|_| job.synced_at.is_none()) {
        (SyncStatus::Error, error.clone())
    } else if job.synced_at.is_some()
        || counters
            .expected_objects
            .is_some_and(|expected| counters.copied_objects >= expected)
    {
        (
            SyncStatus::Completed,
            format!("Synced {} objects", counters.copied_objects),
        )
    } else if let Some(reason) = stall_reason(job, &counters, now) {
        (
            SyncStatus::Error,
            format!(
                "Sync appears stalled ({reason}); {} of {} objects copied. Start the sync again to resume.",
                counters.copied_objects,
                counters.expected_objects.unwrap_or_default()
            ),
        )
    } else if counters.copied_objects > 0 || counters.expected_objects.is_some() {
        (
            SyncStatus::Syncing,
            format!(
                "Copying {} of {} objects ({}%)",
                counters.copied_objects,
                counters.expected_objects.unwrap_or_default(),
                percent
            ),
        )
    } else {
        (SyncStatus::NotStarted, "Sync has not started".to_string())
    };

    let progress = if status == SyncStatus::Completed {
        100
    } else {
        percent
    };

    SyncStatusResponse {
        job_id: job.id.clone(),
        status,
        message,
        progress,
        copied_objects: counters.copied_objects,
        expected_objects: counters.expected_objects,
        copied_bytes: counters.copied_bytes,
        expected_bytes: counters.expected_bytes,
        failed_objects: counters.failed_objects,
        current_day: counters.progress.and_then(|p| p.current_day.clone()),
        days: counters
            .progress
            .map(|p| p.days.clone())
            .unwrap_or_default(),
        updated_at: counters.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mobility_core::{DayProgress, JobId};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn running_job() -> Job {
        let mut job = Job::new(JobId::new("job-1"), "s3://vendor/exports/job-1/");
        job.destination_path = Some("s3://mirror/jobs/job-1/".into());
        job.sync_lock_at = Some(now() - Duration::minutes(1));
        job.sync_started_at = Some(now() - Duration::minutes(1));
        job.expected_object_count = Some(100);
        job.expected_total_bytes = Some(1000);
        job
    }

    fn ledger(copied: u64, total: u64, updated_at: DateTime<Utc>) -> SyncProgress {
        let mut day = DayProgress {
            total_files: total,
            copied_files: copied,
            ..Default::default()
        };
        day.refresh_status();
        SyncProgress {
            current_day: Some("2024-01-01".into()),
            updated_at: Some(updated_at),
            days: [("2024-01-01".to_string(), day)].into(),
            ..Default::default()
        }
    }

    #[test]
    fn percent_rounds_and_guards_zero() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(5, 4), 100);
    }

    #[test]
    fn missing_paths_mean_not_started() {
        let mut job = running_job();
        job.source_path = None;
        assert_eq!(resolve_status(&job, None, now()).status, SyncStatus::NotStarted);

        let mut job = running_job();
        job.destination_path = None;
        assert_eq!(resolve_status(&job, None, now()).status, SyncStatus::NotStarted);
    }

    #[test]
    fn cancellation_wins_over_error() {
        let mut job = running_job();
        job.sync_cancelled_at = Some(now());
        job.error_message = Some("boom".into());
        assert_eq!(resolve_status(&job, None, now()).status, SyncStatus::Cancelled);
    }

    #[test]
    fn error_without_completion_is_error() {
        let mut job = running_job();
        job.error_message = Some("3 object(s) failed to copy".into());
        let status = resolve_status(&job, None, now());
        assert_eq!(status.status, SyncStatus::Error);
        assert_eq!(status.message, "3 object(s) failed to copy");

        job.synced_at = Some(now());
        assert_eq!(resolve_status(&job, None, now()).status, SyncStatus::Completed);
    }

    #[test]
    fn copied_reaching_explicit_total_is_completed() {
        let mut job = running_job();
        job.copied_objects = 100;
        let status = resolve_status(&job, None, now());
        assert_eq!(status.status, SyncStatus::Completed);
        assert_eq!(status.progress, 100);
    }

    #[test]
    fn unset_total_is_never_completed() {
        let mut job = running_job();
        job.expected_object_count = None;
        job.sync_lock_at = None;
        job.sync_started_at = None;
        assert_eq!(resolve_status(&job, None, now()).status, SyncStatus::NotStarted);
    }

    #[test]
    fn fresher_state_wins_over_job() {
        let mut job = running_job();
        job.copied_objects = 10;
        let mut state = SyncState::new(job.id.clone());
        state.copied_objects = 42;
        state.expected_object_count = Some(100);

        let status = resolve_status(&job, Some(&state), now());
        assert_eq!(status.status, SyncStatus::Syncing);
        assert_eq!(status.copied_objects, 42);
        assert_eq!(status.progress, 42);
    }

    #[test]
    fn ledger_sums_win_over_aggregates() {
        let job = running_job();
        let mut state = SyncState::new(job.id.clone());
        state.copied_objects = 5;
        state.expected_object_count = Some(100);
        state.progress = Some(ledger(60, 100, now()));

        let status = resolve_status(&job, Some(&state), now());
        assert_eq!(status.copied_objects, 60);
        assert_eq!(status.current_day.as_deref(), Some("2024-01-01"));
        assert_eq!(status.days.len(), 1);
    }

    #[test]
    fn old_lock_with_remaining_work_is_stalled() {
        let mut job = running_job();
        job.sync_lock_at = Some(now() - Duration::minutes(15));
        job.copied_objects = 30;

        let status = resolve_status(&job, None, now());
        assert_eq!(status.status, SyncStatus::Error);
        assert!(status.message.contains("stalled"));
        assert_eq!(status.copied_objects, 30);
    }

    #[test]
    fn abandoned_run_without_lock_is_stalled() {
        let mut job = running_job();
        job.sync_lock_at = None;
        job.sync_started_at = Some(now() - Duration::minutes(13));

        let status = resolve_status(&job, None, now());
        assert_eq!(status.status, SyncStatus::Error);
        assert!(status.message.contains("stalled"));
    }

    #[test]
    fn idle_ledger_is_stalled() {
        let job = running_job();
        let mut state = SyncState::new(job.id.clone());
        state.expected_object_count = Some(100);
        state.progress = Some(ledger(10, 100, now() - Duration::minutes(20)));

        let status = resolve_status(&job, Some(&state), now());
        assert_eq!(status.status, SyncStatus::Error);
        assert!(status.message.contains("stalled"));
    }

    #[test]
    fn recent_activity_is_syncing() {
        let job = running_job();
        let mut state = SyncState::new(job.id.clone());
        state.expected_object_count = Some(100);
        state.progress = Some(ledger(10, 100, now() - Duration::minutes(1)));

        let status = resolve_status(&job, Some(&state), now());
        assert_eq!(status.status, SyncStatus::Syncing);
        assert_eq!(status.progress, 10);
    }
}
