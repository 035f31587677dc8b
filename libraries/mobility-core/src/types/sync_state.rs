use super::{JobId, SyncProgress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ephemeral per-job sync state
///
/// Mirrors the fast-changing subset of the job record so progress writes
/// never touch the large, widely shared job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub job_id: JobId,
    pub copied_objects: u64,
    pub copied_bytes: u64,
    pub failed_objects: u64,
    pub expected_object_count: Option<u64>,
    pub expected_total_bytes: Option<u64>,
    pub progress: Option<SyncProgress>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    /// Empty state for a job
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            copied_objects: 0,
            copied_bytes: 0,
            failed_objects: 0,
            expected_object_count: None,
            expected_total_bytes: None,
            progress: None,
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }
}
