use crate::{
    abort::{AbortHandle, AbortRegistry},
    error::Result,
    resolver::resolve_status,
    state::SnapshotWriter,
    tracker::ProgressTracker,
    verifier::Verifier,
    SyncConfig, SyncError, SyncOutcome, SyncSummary,
};
use chrono::{DateTime, Utc};
use mobility_core::{
    CopyItem, CoreError, Job, JobId, JobRepository, JobUpdate, ObjectStorage, RunId,
    StoragePath, SyncState, SyncStateStore, SyncStatusResponse,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Mutable bookkeeping of one run, inspected after it ends
struct Run {
    job_id: JobId,
    run_id: RunId,
    abort: AbortHandle,
    started_at: DateTime<Utc>,
    expected_objects: Option<u64>,
    expected_bytes: Option<u64>,
    tracker: Option<ProgressTracker>,
}

impl Run {
    fn sync_state(&self) -> SyncState {
        let mut state = SyncState::new(self.job_id.clone());
        state.expected_object_count = self.expected_objects;
        state.expected_total_bytes = self.expected_bytes;
        state.started_at = Some(self.started_at);
        if let Some(tracker) = &self.tracker {
            state.copied_objects = tracker.copied_files();
            state.copied_bytes = tracker.copied_bytes();
            state.failed_objects = tracker.failed_files();
            state.progress = Some(tracker.snapshot());
        }
        state
    }

    fn partial_update(&self) -> JobUpdate {
        match &self.tracker {
            Some(tracker) => JobUpdate {
                copied_objects: Some(tracker.copied_files()),
                copied_bytes: Some(tracker.copied_bytes()),
                failed_objects: Some(tracker.failed_files()),
                sync_progress: Some(tracker.snapshot()),
                ..Default::default()
            },
            None => JobUpdate::default(),
        }
    }
}

/// Drives mirror runs: list, diff, copy, verify, finalize
#[derive(Clone)]
pub struct SyncManager {
    jobs: Arc<dyn JobRepository>,
    storage: Arc<dyn ObjectStorage>,
    states: Arc<dyn SyncStateStore>,
    registry: Arc<AbortRegistry>,
    config: SyncConfig,
}

impl SyncManager {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        storage: Arc<dyn ObjectStorage>,
        states: Arc<dyn SyncStateStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            jobs,
            storage,
            states,
            registry: Arc::new(AbortRegistry::new()),
            config,
        }
    }

    pub fn registry(&self) -> &AbortRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start a run in the background
    ///
    /// The abort token is registered before this returns, so a
    /// `cancel_sync` issued right after always reaches this run.
    pub fn start_sync(
        &self,
        job_id: JobId,
        destination: Option<StoragePath>,
    ) -> (RunId, JoinHandle<SyncOutcome>) {
        let abort = self.registry.register(&job_id);
        let run_id = RunId::generate();
        let manager = self.clone();
        let spawned_run_id = run_id.clone();

        let handle = tokio::spawn(async move {
            manager
                .run_registered(abort, spawned_run_id, destination)
                .await
        });

        (run_id, handle)
    }

    /// Run to completion on the current task
    pub async fn run(&self, job_id: &JobId, destination: Option<StoragePath>) -> SyncOutcome {
        let abort = self.registry.register(job_id);
        self.run_registered(abort, RunId::generate(), destination)
            .await
    }

    /// Cancel the live run of a job. Returns whether one was running.
    pub fn cancel_sync(&self, job_id: &JobId) -> bool {
        let cancelled = self.registry.cancel(job_id);
        if cancelled {
            info!("Cancelling sync of job {}", job_id);
        }
        cancelled
    }

    /// Resolve the current status of a job
    pub async fn get_status(&self, job_id: &JobId) -> Result<Option<SyncStatusResponse>> {
        let Some(job) = self.jobs.get_job(job_id).await? else {
            return Ok(None);
        };
        let state = self.states.get(job_id).await?;
        Ok(Some(resolve_status(&job, state.as_ref(), Utc::now())))
    }

    async fn run_registered(
        &self,
        abort: AbortHandle,
        run_id: RunId,
        destination: Option<StoragePath>,
    ) -> SyncOutcome {
        let job_id = abort.job_id().clone();
        let mut run = Run {
            job_id: job_id.clone(),
            run_id,
            abort,
            started_at: Utc::now(),
            expected_objects: None,
            expected_bytes: None,
            tracker: None,
        };

        info!("Starting sync of job {} (run {})", job_id, run.run_id);

        let result = self.sync_impl(&mut run, destination).await;

        let outcome = match result {
            Ok(summary) => {
                info!(
                    "Sync of job {} complete: {} copied, {} already present, {} total in {}s",
                    job_id,
                    summary.objects_copied,
                    summary.objects_already_present,
                    summary.total_objects,
                    summary.duration_seconds
                );
                SyncOutcome::Completed(summary)
            }
            Err(_) if !self.registry.is_current(&run.abort) => {
                info!("Run {} of job {} superseded by a newer run", run.run_id, job_id);
                SyncOutcome::Superseded { job_id: job_id.clone() }
            }
            Err(SyncError::Cancelled | SyncError::Core(CoreError::Cancelled)) => {
                info!("Sync of job {} cancelled", job_id);
                self.persist_cancelled(&run).await;
                SyncOutcome::Cancelled { job_id: job_id.clone() }
            }
            // A check that failed after the token fired still ends as cancelled
            Err(_) if run.abort.is_cancelled() => {
                info!("Sync of job {} cancelled", job_id);
                self.persist_cancelled(&run).await;
                SyncOutcome::Cancelled { job_id: job_id.clone() }
            }
            Err(e) => {
                error!("Sync of job {} failed: {}", job_id, e);
                let message = e.to_string();
                self.persist_error(&run, &message).await;
                SyncOutcome::Failed {
                    job_id: job_id.clone(),
                    message,
                }
            }
        };

        // The lock only moves if this run still owns it
        match self.jobs.release_sync_lock(&job_id, &run.run_id).await {
            Ok(true) => debug!("Released sync lock of job {}", job_id),
            Ok(false) => {}
            Err(e) => warn!("Failed to release sync lock of job {}: {}", job_id, e),
        }
        self.registry.deregister(&run.abort);

        outcome
    }

    /// Fail with `Cancelled` (or `Superseded`) once the run's token fired
    fn checkpoint(&self, run: &Run) -> Result<()> {
        if !run.abort.is_cancelled() {
            return Ok(());
        }
        if self.registry.is_current(&run.abort) {
            Err(SyncError::Cancelled)
        } else {
            Err(SyncError::Superseded)
        }
    }

    fn resolve_destination(
        &self,
        job: &Job,
        requested: Option<StoragePath>,
    ) -> Result<StoragePath> {
        if let Some(path) = requested {
            return Ok(path);
        }
        if let Some(path) = job.destination_path.as_deref().filter(|p| !p.is_empty()) {
            return Ok(path.parse()?);
        }
        self.config
            .default_destination(&job.id)
            .ok_or(SyncError::NoDestination)
    }

    async fn sync_impl(
        &self,
        run: &mut Run,
        destination: Option<StoragePath>,
    ) -> Result<SyncSummary> {
        let clock = std::time::Instant::now();
        let cancel = run.abort.token().clone();
        self.checkpoint(run)?;

        let job = self
            .jobs
            .get_job(&run.job_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound(run.job_id.clone()))?;

        let source: StoragePath = job
            .source_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(SyncError::NoSource)?
            .parse()?;
        let destination = self.resolve_destination(&job, destination)?;

        // Phase 1: list source
        debug!("Phase 1: Listing {}", source);
        let listing = self
            .storage
            .list_objects(&source.bucket, &source.prefix, &cancel)
            .await?;
        self.checkpoint(run)?;

        let candidates: Vec<CopyItem> = listing
            .into_iter()
            .filter(|o| !o.key.ends_with('/'))
            .map(|o| CopyItem {
                destination_key: destination.join(source.relative_key(&o.key)),
                source_key: o.key,
                size: o.size,
            })
            .collect();

        if candidates.is_empty() {
            return Err(SyncError::NoSourceObjects(source.to_string()));
        }

        // Phase 2: diff against destination
        debug!("Phase 2: Diffing against {}", destination);
        let existing = self
            .storage
            .list_key_set(&destination.bucket, &destination.prefix, &cancel)
            .await?;
        self.checkpoint(run)?;

        let batch: Vec<CopyItem> = candidates
            .iter()
            .filter(|item| !existing.contains(&item.destination_key))
            .cloned()
            .collect();

        // Phase 3: initialize totals and the ledger
        let tracker = ProgressTracker::new(&source, &candidates, &existing);
        let expected_objects = tracker.total_files();
        let expected_bytes = tracker.total_bytes();
        let already_present = tracker.already_present();
        let source_dates = tracker.source_dates();

        self.jobs
            .initialize_sync(
                &run.job_id,
                &destination.to_string(),
                expected_objects,
                expected_bytes,
                &run.run_id,
            )
            .await?;
        run.expected_objects = Some(expected_objects);
        run.expected_bytes = Some(expected_bytes);
        run.tracker = Some(tracker);

        self.states.put(&run.sync_state()).await?;

        info!(
            "Job {}: {} objects ({} bytes) across {} days, {} already present, {} to copy",
            run.job_id,
            expected_objects,
            expected_bytes,
            source_dates.len(),
            already_present,
            batch.len()
        );

        // Phase 4: copy
        let objects_copied = batch.len() as u64;
        if batch.is_empty() {
            debug!("Phase 4: Nothing to copy");
        } else {
            debug!("Phase 4: Copying {} objects", batch.len());
            self.copy_phase(run, &source, &destination, batch).await?;
        }

        // Phase 5: verify
        self.checkpoint(run)?;
        debug!("Phase 5: Verifying");
        let report = Verifier::new(self.storage.as_ref(), &self.config)
            .verify(&job, &source, &destination, &candidates, &source_dates, &cancel)
            .await?;
        let verification = report.summary();

        // Phase 6: finalize
        let completed_at = Utc::now();
        let mut update = run.partial_update();
        update.synced_at = Some(completed_at);
        update.failed_objects = Some(0);
        update.verification_summary = Some(verification.clone());
        self.checkpoint(run)?;
        self.jobs.update_job(&run.job_id, update).await?;

        let mut state = run.sync_state();
        state.completed_at = Some(completed_at);
        self.states.put(&state).await?;

        Ok(SyncSummary {
            job_id: run.job_id.clone(),
            run_id: run.run_id.clone(),
            started_at: run.started_at.to_rfc3339(),
            completed_at: completed_at.to_rfc3339(),
            duration_seconds: clock.elapsed().as_secs(),
            objects_copied,
            objects_already_present: already_present,
            total_objects: expected_objects,
            total_bytes: expected_bytes,
            verification,
        })
    }

    /// Batched copy with throttled, coalesced snapshot writes
    async fn copy_phase(
        &self,
        run: &mut Run,
        source: &StoragePath,
        destination: &StoragePath,
        batch: Vec<CopyItem>,
    ) -> Result<()> {
        let writer = SnapshotWriter::spawn(Arc::clone(&self.states));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = run.abort.token().clone();
        let interval = self.config.progress_interval;

        let copy = self.storage.copy_batch(
            &source.bucket,
            &destination.bucket,
            batch,
            tx,
            cancel.clone(),
        );

        let drain = async {
            let mut last_publish = Instant::now();
            while let Some(event) = rx.recv().await {
                if let Some(tracker) = run.tracker.as_mut() {
                    tracker.apply(&event);
                }
                if last_publish.elapsed() >= interval {
                    writer.publish(run.sync_state());
                    last_publish = Instant::now();
                }
            }
        };

        let (result, ()) = tokio::join!(copy, drain);

        if cancel.is_cancelled() && !self.registry.is_current(&run.abort) {
            writer.abort();
            return Err(SyncError::Superseded);
        }

        if let (Ok(result), Some(tracker)) = (&result, run.tracker.as_mut()) {
            tracker.apply_failures(result);
        }
        writer.publish(run.sync_state());
        writer.finish().await;

        let result = result?;
        if result.cancelled || cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if result.failed > 0 {
            return Err(SyncError::Transfer {
                failed: result.failed,
                first_error: result
                    .first_error()
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        Ok(())
    }

    async fn persist_cancelled(&self, run: &Run) {
        let mut update = run.partial_update();
        update.sync_cancelled_at = Some(Utc::now());

        if let Err(e) = self.jobs.update_job(&run.job_id, update).await {
            error!("Failed to mark job {} cancelled: {}", run.job_id, e);
        }
        self.persist_partial_state(run).await;
    }

    async fn persist_error(&self, run: &Run, message: &str) {
        let mut update = run.partial_update();
        update.error_message = Some(message.to_string());

        if let Err(e) = self.jobs.update_job(&run.job_id, update).await {
            error!("Failed to record error for job {}: {}", run.job_id, e);
        }
        self.persist_partial_state(run).await;
    }

    async fn persist_partial_state(&self, run: &Run) {
        if run.tracker.is_none() {
            return;
        }
        if let Err(e) = self.states.put(&run.sync_state()).await {
            warn!("Failed to persist partial sync state for job {}: {}", run.job_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn run_without_tracker_has_empty_partial_update() {
        let registry = AbortRegistry::new();
        let job_id = JobId::new("j");
        let run = Run {
            job_id: job_id.clone(),
            run_id: RunId::generate(),
            abort: registry.register(&job_id),
            started_at: Utc::now(),
            expected_objects: None,
            expected_bytes: None,
            tracker: None,
        };

        assert_eq!(run.partial_update(), JobUpdate::default());
        assert_eq!(run.sync_state().copied_objects, 0);
    }

    #[test]
    fn partial_update_carries_ledger_counts() {
        let registry = AbortRegistry::new();
        let job_id = JobId::new("j");
        let items = vec![CopyItem {
            source_key: "src/date=2024-01-01/a".into(),
            destination_key: "dst/date=2024-01-01/a".into(),
            size: 42,
        }];
        let existing: HashSet<String> = ["dst/date=2024-01-01/a".to_string()].into();
        let run = Run {
            job_id: job_id.clone(),
            run_id: RunId::generate(),
            abort: registry.register(&job_id),
            started_at: Utc::now(),
            expected_objects: Some(1),
            expected_bytes: Some(42),
            tracker: Some(ProgressTracker::new(
                &StoragePath::new("vendor", "src/"),
                &items,
                &existing,
            )),
        };

        let update = run.partial_update();
        assert_eq!(update.copied_objects, Some(1));
        assert_eq!(update.copied_bytes, Some(42));
        assert!(update.sync_progress.is_some());
    }
}
