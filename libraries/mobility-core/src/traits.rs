//! Collaborator traits consumed by the mirroring engine
//!
//! These abstract the job repository, the object store, and the small
//! per-job sync state record so the engine can run against SQLite, a
//! local directory tree, or in-memory fakes.

use crate::error::Result;
use crate::types::{
    BatchCopyResult, CopyEvent, CopyItem, Job, JobId, JobUpdate, NewJob, ObjectCount,
    ObjectEntry, RunId, SyncState,
};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Persistence of the job record
///
/// Updates are partial merges; implementations must not assume exclusive
/// access to the row.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Get a job by ID
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>>;

    /// Merge the set fields of `update` into the job
    async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<()>;

    /// Start a run: fix expected totals, take the lock for `run_id`, record
    /// the start time and clear completion markers
    async fn initialize_sync(
        &self,
        id: &JobId,
        destination_path: &str,
        expected_count: u64,
        expected_bytes: u64,
        run_id: &RunId,
    ) -> Result<()>;

    /// Release the lock if `run_id` still owns it. Returns whether it did.
    async fn release_sync_lock(&self, id: &JobId, run_id: &RunId) -> Result<bool>;

    /// Create a job (fixtures and CLI)
    async fn create_job(&self, job: NewJob) -> Result<Job>;
}

/// Small, frequently overwritten per-job progress record
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Get the state for a job
    async fn get(&self, job_id: &JobId) -> Result<Option<SyncState>>;

    /// Replace the state for a job
    async fn put(&self, state: &SyncState) -> Result<()>;
}

/// Object storage operations used by the engine
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// List every object under a prefix
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ObjectEntry>>;

    /// List keys only under a prefix
    async fn list_key_set(
        &self,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<HashSet<String>>;

    /// Copy items from one bucket to another
    ///
    /// Sends one `CopyEvent` per finished item on `progress` and drops the
    /// sender on return. Stops starting new copies once `cancel` fires and
    /// reports `cancelled = true`.
    async fn copy_batch(
        &self,
        source_bucket: &str,
        destination_bucket: &str,
        items: Vec<CopyItem>,
        progress: mpsc::UnboundedSender<CopyEvent>,
        cancel: CancellationToken,
    ) -> Result<BatchCopyResult>;

    /// ETag of an object, `None` if it does not exist
    async fn get_object_etag(&self, bucket: &str, key: &str) -> Result<Option<String>>;

    /// Count objects under a prefix, optionally collecting date partitions
    async fn count_objects_by_prefix(
        &self,
        bucket: &str,
        prefix: &str,
        collect_dates: bool,
        cancel: &CancellationToken,
    ) -> Result<ObjectCount>;
}
