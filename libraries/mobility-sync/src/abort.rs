//! Process-local cancellation registry, one live token per job

use mobility_core::JobId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation token of one registered run
#[derive(Debug, Clone)]
pub struct AbortHandle {
    job_id: JobId,
    generation: u64,
    token: CancellationToken,
}

impl AbortHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct Registration {
    generation: u64,
    token: CancellationToken,
}

/// Maps job ids to the token of their live run
///
/// Registering a job that already has a live token cancels the old one
/// first, so at most one run per job is ever un-cancelled.
#[derive(Debug, Default)]
pub struct AbortRegistry {
    runs: Mutex<HashMap<JobId, Registration>>,
    next_generation: AtomicU64,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run for `job_id`, cancelling any previous one
    pub fn register(&self, job_id: &JobId) -> AbortHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                job_id.clone(),
                Registration {
                    generation,
                    token: token.clone(),
                },
            );

        if let Some(previous) = previous {
            debug!("Cancelling previous run of job {} (generation {})", job_id, previous.generation);
            previous.token.cancel();
        }

        AbortHandle {
            job_id: job_id.clone(),
            generation,
            token,
        }
    }

    /// Cancel the live run of `job_id`. Returns whether one existed.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        match runs.get(job_id) {
            Some(registration) => {
                registration.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether `handle` is still the registered run for its job
    pub fn is_current(&self, handle: &AbortHandle) -> bool {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle.job_id)
            .is_some_and(|r| r.generation == handle.generation)
    }

    /// Whether `job_id` has a registered run
    pub fn is_running(&self, job_id: &JobId) -> bool {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(job_id)
    }

    /// Remove the registration if `handle` still owns it
    pub fn deregister(&self, handle: &AbortHandle) -> bool {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if runs
            .get(&handle.job_id)
            .is_some_and(|r| r.generation == handle.generation)
        {
            runs.remove(&handle.job_id);
            true
        } else {
            false
        }
    }
}
