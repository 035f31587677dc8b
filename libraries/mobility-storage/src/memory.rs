//! In-memory collaborators
//!
//! Used by tests and dry runs. The object store supports fault injection:
//! failing copies, lost writes, overridden ETags and per-object delay.

use crate::batch;
use async_trait::async_trait;
use chrono::Utc;
use mobility_core::{
    partition_date, BatchCopyResult, CopyEvent, CopyItem, CoreError, Job, JobId, JobRepository,
    JobUpdate, NewJob, ObjectCount, ObjectEntry, ObjectStorage, Result, RunId, SyncState,
    SyncStateStore,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Job repository held in memory
#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: RwLock<BTreeMap<JobId, Job>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a job
    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    /// All jobs, ordered by ID
    pub async fn all(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Job", id.as_str()))?;
        job.apply(update);
        Ok(())
    }

    async fn initialize_sync(
        &self,
        id: &JobId,
        destination_path: &str,
        expected_count: u64,
        expected_bytes: u64,
        run_id: &RunId,
    ) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Job", id.as_str()))?;

        let now = Utc::now();
        job.destination_path = Some(destination_path.to_string());
        job.expected_object_count = Some(expected_count);
        job.expected_total_bytes = Some(expected_bytes);
        job.sync_lock_at = Some(now);
        job.sync_run_id = Some(run_id.clone());
        job.sync_started_at = Some(now);
        job.synced_at = None;
        job.sync_cancelled_at = None;
        job.error_message = None;
        job.failed_objects = 0;
        job.updated_at = now;
        Ok(())
    }

    async fn release_sync_lock(&self, id: &JobId, run_id: &RunId) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return Ok(false);
        };
        if job.sync_run_id.as_ref() != Some(run_id) {
            return Ok(false);
        }

        job.sync_lock_at = None;
        job.sync_run_id = None;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn create_job(&self, new_job: NewJob) -> Result<Job> {
        let mut job = Job::new(JobId::generate(), new_job.source_path);
        job.destination_path = new_job.destination_path;
        job.requested_start_date = new_job.requested_start_date;
        job.requested_end_date = new_job.requested_end_date;

        self.insert(job.clone()).await;
        Ok(job)
    }
}

/// Sync state store held in memory, with an optional slow write path
#[derive(Default)]
pub struct MemorySyncStateStore {
    states: RwLock<HashMap<JobId, SyncState>>,
    writes: AtomicUsize,
    write_delay: Option<Duration>,
}

impl MemorySyncStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write take at least `delay`
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Writes completed so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncStateStore for MemorySyncStateStore {
    async fn get(&self, job_id: &JobId) -> Result<Option<SyncState>> {
        Ok(self.states.read().await.get(job_id).cloned())
    }

    async fn put(&self, state: &SyncState) -> Result<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.states
            .write()
            .await
            .insert(state.job_id.clone(), state.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    size: u64,
    etag: String,
}

#[derive(Default)]
struct Faults {
    failing_keys: HashSet<String>,
    lost_writes: HashSet<String>,
    copy_delay: Option<Duration>,
}

/// Object store held in memory
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    faults: RwLock<Faults>,
    copy_concurrency: usize,
    copies: AtomicUsize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self {
            buckets: RwLock::default(),
            faults: RwLock::default(),
            copy_concurrency: 16,
            copies: AtomicUsize::new(0),
        }
    }
}

/// Quoted single-part ETag derived from the file name and size
///
/// A copy under another prefix keeps the same file name, so seeded
/// destination objects match their source without going through a copy.
fn synthetic_etag(key: &str, size: u64) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    let digest = blake3::hash(format!("{name}:{size}").as_bytes());
    format!("\"{}\"", &digest.to_hex()[..32])
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_copy_concurrency(mut self, concurrency: usize) -> Self {
        self.copy_concurrency = concurrency.max(1);
        self
    }

    /// Store an object with a synthetic ETag
    pub async fn put_object(&self, bucket: &str, key: &str, size: u64) {
        self.put_object_with_etag(bucket, key, size, synthetic_etag(key, size))
            .await;
    }

    /// Store an object with an explicit ETag
    pub async fn put_object_with_etag(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        etag: impl Into<String>,
    ) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    size,
                    etag: etag.into(),
                },
            );
    }

    /// Override the ETag of an existing object. Returns whether it exists.
    pub async fn set_etag(&self, bucket: &str, key: &str, etag: impl Into<String>) -> bool {
        let mut buckets = self.buckets.write().await;
        match buckets.get_mut(bucket).and_then(|b| b.get_mut(key)) {
            Some(object) => {
                object.etag = etag.into();
                true
            }
            None => false,
        }
    }

    /// Remove an object. Returns whether it existed.
    pub async fn remove_object(&self, bucket: &str, key: &str) -> bool {
        let mut buckets = self.buckets.write().await;
        buckets
            .get_mut(bucket)
            .is_some_and(|b| b.remove(key).is_some())
    }

    /// Keys stored under `prefix`
    pub async fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .map(|b| {
                b.keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make copies of `source_key` fail
    pub async fn fail_copies_of(&self, source_key: impl Into<String>) {
        self.faults.write().await.failing_keys.insert(source_key.into());
    }

    /// Make copies of `source_key` report success without writing anything
    pub async fn lose_writes_of(&self, source_key: impl Into<String>) {
        self.faults.write().await.lost_writes.insert(source_key.into());
    }

    /// Delay every object copy by `delay`
    pub async fn set_copy_delay(&self, delay: Duration) {
        self.faults.write().await.copy_delay = Some(delay);
    }

    /// Objects written by `copy_batch` so far
    pub fn copy_count(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    async fn listing(&self, bucket: &str, prefix: &str) -> Vec<ObjectEntry> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .map(|b| {
                b.iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, o)| ObjectEntry::new(k.clone(), o.size))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn copy_one(
        &self,
        source_bucket: &str,
        destination_bucket: &str,
        item: &CopyItem,
    ) -> std::result::Result<(), String> {
        let (delay, fails, lost) = {
            let faults = self.faults.read().await;
            (
                faults.copy_delay,
                faults.failing_keys.contains(&item.source_key),
                faults.lost_writes.contains(&item.source_key),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err("injected copy failure".to_string());
        }

        let object = self
            .buckets
            .read()
            .await
            .get(source_bucket)
            .and_then(|b| b.get(&item.source_key))
            .cloned()
            .ok_or_else(|| format!("source object not found: {}", item.source_key))?;

        if !lost {
            self.put_object_with_etag(
                destination_bucket,
                &item.destination_key,
                object.size,
                object.etag,
            )
            .await;
            self.copies.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ObjectEntry>> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(self.listing(bucket, prefix).await)
    }

    async fn list_key_set(
        &self,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<HashSet<String>> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(self.keys(bucket, prefix).await.into_iter().collect())
    }

    async fn copy_batch(
        &self,
        source_bucket: &str,
        destination_bucket: &str,
        items: Vec<CopyItem>,
        progress: mpsc::UnboundedSender<CopyEvent>,
        cancel: CancellationToken,
    ) -> Result<BatchCopyResult> {
        let result = batch::drive(items, self.copy_concurrency, progress, cancel, |item| async move {
            let outcome = self.copy_one(source_bucket, destination_bucket, &item).await;
            (item, outcome)
        })
        .await;
        Ok(result)
    }

    async fn get_object_etag(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.etag.clone()))
    }

    async fn count_objects_by_prefix(
        &self,
        bucket: &str,
        prefix: &str,
        collect_dates: bool,
        cancel: &CancellationToken,
    ) -> Result<ObjectCount> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let listing = self.listing(bucket, prefix).await;
        let dates = collect_dates.then(|| {
            listing
                .iter()
                .map(|o| {
                    let relative = o.key.strip_prefix(prefix).unwrap_or(&o.key);
                    partition_date(relative).to_string()
                })
                .collect::<BTreeSet<_>>()
        });

        Ok(ObjectCount {
            count: listing.len() as u64,
            dates,
        })
    }
}
