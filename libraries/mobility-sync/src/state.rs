use mobility_core::{SyncState, SyncStateStore};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Latest-wins writer for the per-job sync state
///
/// Holds a single slot: publishing while a write is in flight replaces the
/// queued snapshot instead of backlogging, so at most one write is ever in
/// flight and the copy loop never waits on storage.
pub struct SnapshotWriter {
    slot: watch::Sender<Option<SyncState>>,
    handle: JoinHandle<()>,
}

impl SnapshotWriter {
    /// Spawn the writer task for one run
    pub fn spawn(store: Arc<dyn SyncStateStore>) -> Self {
        let (slot, mut rx) = watch::channel(None::<SyncState>);

        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(state) = rx.borrow_and_update().clone() else {
                    continue;
                };

                if let Err(e) = store.put(&state).await {
                    warn!("Failed to persist sync state for job {}: {}", state.job_id, e);
                }
            }
            debug!("Snapshot writer drained");
        });

        Self { slot, handle }
    }

    /// Queue a snapshot, replacing any snapshot not yet written
    pub fn publish(&self, state: SyncState) {
        self.slot.send_replace(Some(state));
    }

    /// Write the last queued snapshot (if any) and stop
    pub async fn finish(self) {
        let Self { slot, handle } = self;
        drop(slot);
        if let Err(e) = handle.await {
            warn!("Snapshot writer task failed: {}", e);
        }
    }

    /// Stop without writing anything still queued
    pub fn abort(self) {
        self.handle.abort();
    }
}
