use crate::{jobs, sync_states};
use async_trait::async_trait;
use mobility_core::{
    Job, JobId, JobRepository, JobUpdate, NewJob, Result, RunId, SyncState, SyncStateStore,
};
use sqlx::SqlitePool;

/// Job repository and sync state store backed by `SQLite`
#[derive(Clone)]
pub struct LocalJobStore {
    pool: SqlitePool,
}

impl LocalJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobRepository for LocalJobStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        jobs::get_by_id(&self.pool, id).await.map_err(Into::into)
    }

    async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<()> {
        jobs::update(&self.pool, id, update).await.map_err(Into::into)
    }

    async fn initialize_sync(
        &self,
        id: &JobId,
        destination_path: &str,
        expected_count: u64,
        expected_bytes: u64,
        run_id: &RunId,
    ) -> Result<()> {
        jobs::initialize_sync(
            &self.pool,
            id,
            destination_path,
            expected_count,
            expected_bytes,
            run_id,
        )
        .await
        .map_err(Into::into)
    }

    async fn release_sync_lock(&self, id: &JobId, run_id: &RunId) -> Result<bool> {
        jobs::release_lock(&self.pool, id, run_id)
            .await
            .map_err(Into::into)
    }

    async fn create_job(&self, job: NewJob) -> Result<Job> {
        jobs::create(&self.pool, job).await.map_err(Into::into)
    }
}

#[async_trait]
impl SyncStateStore for LocalJobStore {
    async fn get(&self, job_id: &JobId) -> Result<Option<SyncState>> {
        sync_states::get(&self.pool, job_id)
            .await
            .map_err(Into::into)
    }

    async fn put(&self, state: &SyncState) -> Result<()> {
        sync_states::put(&self.pool, state).await.map_err(Into::into)
    }
}
