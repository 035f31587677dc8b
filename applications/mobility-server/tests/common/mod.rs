/// Common test utilities and fixtures
use axum::Router;
use mobility_core::{Job, JobId};
use mobility_server::{create_router, state::AppState};
use mobility_storage::{MemoryJobRepository, MemoryObjectStore, MemorySyncStateStore};
use mobility_sync::{SyncConfig, SyncManager};
use std::sync::Arc;
use std::time::Duration;

pub const VENDOR_BUCKET: &str = "vendor";
pub const MIRROR_BUCKET: &str = "mirror";
pub const JOB_ID: &str = "job-42";

pub struct TestApp {
    pub router: Router,
    pub manager: Arc<SyncManager>,
    pub objects: Arc<MemoryObjectStore>,
}

/// Router over in-memory collaborators with one job and `objects_per_day`
/// objects for each of two days
pub async fn create_test_app(objects_per_day: usize) -> TestApp {
    let jobs = Arc::new(MemoryJobRepository::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let states = Arc::new(MemorySyncStateStore::new());

    let job_id = JobId::new(JOB_ID);
    let mut job = Job::new(
        job_id.clone(),
        format!("s3://{VENDOR_BUCKET}/exports/{JOB_ID}/"),
    );
    job.destination_path = Some(format!("s3://{MIRROR_BUCKET}/jobs/{JOB_ID}/"));
    jobs.insert(job).await;

    for date in ["2024-03-01", "2024-03-02"] {
        for i in 0..objects_per_day {
            let key = format!("exports/{JOB_ID}/date={date}/part-{i:04}.parquet");
            objects.put_object(VENDOR_BUCKET, &key, 2048).await;
        }
    }

    let config = SyncConfig {
        progress_interval: Duration::ZERO,
        ..SyncConfig::default()
    };
    let manager = Arc::new(SyncManager::new(
        jobs.clone(),
        objects.clone(),
        states,
        config,
    ));

    let router = create_router(AppState::new(Arc::clone(&manager), jobs));

    TestApp {
        router,
        manager,
        objects,
    }
}
