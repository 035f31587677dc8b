//! Job record types
//!
//! A job is created upstream when the vendor is asked for a dataset. The
//! mirroring engine only reads and writes the subset of fields below.

use super::{JobId, RunId, SyncProgress};
use crate::error::CoreError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A storage location: bucket plus key prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoragePath {
    /// Bucket name
    pub bucket: String,
    /// Key prefix, empty or ending in `/`
    pub prefix: String,
}

impl StoragePath {
    /// Create a storage path, normalizing the prefix
    pub fn new(bucket: impl Into<String>, prefix: impl AsRef<str>) -> Self {
        let trimmed = prefix.as_ref().trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        };

        Self {
            bucket: bucket.into(),
            prefix,
        }
    }

    /// Key relative to this prefix; keys outside the prefix are returned as-is
    pub fn relative_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }

    /// Full key for a path relative to this prefix
    pub fn join(&self, relative: &str) -> String {
        format!("{}{}", self.prefix, relative.trim_start_matches('/'))
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

impl FromStr for StoragePath {
    type Err = CoreError;

    /// Accepts `s3://bucket/prefix` or `bucket/prefix`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.trim().strip_prefix("s3://").unwrap_or(s.trim());
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));

        if bucket.is_empty() {
            return Err(CoreError::invalid_input(format!(
                "storage path has no bucket: {s:?}"
            )));
        }

        Ok(Self::new(bucket, prefix))
    }
}

/// The job record (large, long-lived, shared with the dashboard)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique ID
    pub id: JobId,

    /// Vendor-owned location of the job output
    pub source_path: Option<String>,

    /// Internally-owned mirror location
    pub destination_path: Option<String>,

    /// Completion marker
    pub synced_at: Option<DateTime<Utc>>,

    /// Cancellation marker
    pub sync_cancelled_at: Option<DateTime<Utc>>,

    /// Last fatal error of a run
    pub error_message: Option<String>,

    /// Lock timestamp, held for the duration of a run
    pub sync_lock_at: Option<DateTime<Utc>>,

    /// Run currently owning the lock
    pub sync_run_id: Option<RunId>,

    /// When the latest run started
    pub sync_started_at: Option<DateTime<Utc>>,

    /// Expected object count, fixed at run start
    pub expected_object_count: Option<u64>,

    /// Expected byte total, fixed at run start
    pub expected_total_bytes: Option<u64>,

    /// Cumulative copied objects
    pub copied_objects: u64,

    /// Cumulative copied bytes
    pub copied_bytes: u64,

    /// Failed objects of the latest run
    pub failed_objects: u64,

    /// Embedded progress snapshot
    pub sync_progress: Option<SyncProgress>,

    /// One-line verification summary of the last successful run
    pub verification_summary: Option<String>,

    /// First day requested from the vendor (informational)
    pub requested_start_date: Option<NaiveDate>,

    /// Last day requested from the vendor, inclusive (informational)
    pub requested_end_date: Option<NaiveDate>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create an unsynced job pointing at a vendor location
    pub fn new(id: JobId, source_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_path: Some(source_path.into()),
            destination_path: None,
            synced_at: None,
            sync_cancelled_at: None,
            error_message: None,
            sync_lock_at: None,
            sync_run_id: None,
            sync_started_at: None,
            expected_object_count: None,
            expected_total_bytes: None,
            copied_objects: 0,
            copied_bytes: 0,
            failed_objects: 0,
            sync_progress: None,
            verification_summary: None,
            requested_start_date: None,
            requested_end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(v) = update.destination_path {
            self.destination_path = Some(v);
        }
        if let Some(v) = update.synced_at {
            self.synced_at = Some(v);
        }
        if let Some(v) = update.sync_cancelled_at {
            self.sync_cancelled_at = Some(v);
        }
        if let Some(v) = update.error_message {
            self.error_message = Some(v);
        }
        if let Some(v) = update.copied_objects {
            self.copied_objects = v;
        }
        if let Some(v) = update.copied_bytes {
            self.copied_bytes = v;
        }
        if let Some(v) = update.failed_objects {
            self.failed_objects = v;
        }
        if let Some(v) = update.sync_progress {
            self.sync_progress = Some(v);
        }
        if let Some(v) = update.verification_summary {
            self.verification_summary = Some(v);
        }
        self.updated_at = Utc::now();
    }
}

/// Fields for creating a job (fixtures and CLI only)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewJob {
    /// Vendor-owned location
    pub source_path: String,
    /// Optional pre-assigned mirror location
    pub destination_path: Option<String>,
    /// First requested day
    pub requested_start_date: Option<NaiveDate>,
    /// Last requested day, inclusive
    pub requested_end_date: Option<NaiveDate>,
}

/// Partial update of a job; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    /// Mirror location
    pub destination_path: Option<String>,
    /// Completion marker
    pub synced_at: Option<DateTime<Utc>>,
    /// Cancellation marker
    pub sync_cancelled_at: Option<DateTime<Utc>>,
    /// Fatal error of the run
    pub error_message: Option<String>,
    /// Cumulative copied objects
    pub copied_objects: Option<u64>,
    /// Cumulative copied bytes
    pub copied_bytes: Option<u64>,
    /// Failed objects of the run
    pub failed_objects: Option<u64>,
    /// Progress ledger snapshot
    pub sync_progress: Option<SyncProgress>,
    /// Verification summary
    pub verification_summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_s3_and_bare_paths() {
        let p: StoragePath = "s3://vendor/exports/job-1".parse().unwrap();
        assert_eq!(p.bucket, "vendor");
        assert_eq!(p.prefix, "exports/job-1/");

        let p: StoragePath = "mirror".parse().unwrap();
        assert_eq!(p.bucket, "mirror");
        assert_eq!(p.prefix, "");

        assert!("s3:///nobucket".parse::<StoragePath>().is_err());
    }

    #[test]
    fn maps_keys_between_prefixes() {
        let src = StoragePath::new("vendor", "exports/job-1/");
        let dst = StoragePath::new("mirror", "/jobs/job-1");

        let relative = src.relative_key("exports/job-1/date=2024-01-01/a.csv");
        assert_eq!(relative, "date=2024-01-01/a.csv");
        assert_eq!(dst.join(relative), "jobs/job-1/date=2024-01-01/a.csv");
        assert_eq!(dst.to_string(), "s3://mirror/jobs/job-1/");
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let mut job = Job::new(JobId::new("j"), "s3://vendor/x/");
        job.copied_objects = 7;

        job.apply(JobUpdate {
            error_message: Some("boom".into()),
            ..Default::default()
        });

        assert_eq!(job.copied_objects, 7);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert_eq!(job.source_path.as_deref(), Some("s3://vendor/x/"));
    }
}
