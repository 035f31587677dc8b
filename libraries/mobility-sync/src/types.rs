use mobility_core::{JobId, RunId, StoragePath};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Minimum spacing between progress snapshot writes
    pub progress_interval: Duration,
    /// Fraction of objects whose ETags are sampled
    pub etag_sample_ratio: f64,
    /// Upper bound on sampled objects
    pub etag_sample_cap: usize,
    /// Parallel metadata fetches during ETag sampling
    pub etag_concurrency: usize,
    /// Missing dates listed in a partition error before truncating
    pub missing_dates_display_limit: usize,
    /// Bucket used when neither the request nor the job names a destination
    pub destination_bucket: Option<String>,
    /// Prefix template for the default destination; `{job_id}` is substituted
    pub destination_prefix_template: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_secs(5),
            etag_sample_ratio: 0.05,
            etag_sample_cap: 50,
            etag_concurrency: 50,
            missing_dates_display_limit: 20,
            destination_bucket: None,
            destination_prefix_template: "jobs/{job_id}/".to_string(),
        }
    }
}

impl SyncConfig {
    /// Destination derived from the configured bucket, if any
    pub fn default_destination(&self, job_id: &JobId) -> Option<StoragePath> {
        let bucket = self.destination_bucket.as_ref()?;
        let prefix = self
            .destination_prefix_template
            .replace("{job_id}", job_id.as_str());
        Some(StoragePath::new(bucket.clone(), prefix))
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub job_id: JobId,
    pub run_id: RunId,
    pub started_at: String,
    pub completed_at: String,
    pub duration_seconds: u64,
    /// Objects copied by this run
    pub objects_copied: u64,
    /// Objects already at the destination before this run
    pub objects_already_present: u64,
    pub total_objects: u64,
    pub total_bytes: u64,
    pub verification: String,
}

/// Terminal outcome of a run; nothing else escapes to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncSummary),
    Cancelled { job_id: JobId },
    Failed { job_id: JobId, message: String },
    /// A newer run for the same job took over
    Superseded { job_id: JobId },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
