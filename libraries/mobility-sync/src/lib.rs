mod abort;
mod error;
mod manager;
mod resolver;
mod state;
mod tracker;
mod types;
mod verifier;

// Public exports
pub use abort::{AbortHandle, AbortRegistry};
pub use error::{Result, SyncError};
pub use manager::SyncManager;
pub use resolver::{
    progress_percent, resolve_status, INACTIVITY_STALL_MINUTES, LOCK_STALL_MINUTES,
};
pub use state::SnapshotWriter;
pub use tracker::ProgressTracker;
pub use types::{SyncConfig, SyncOutcome, SyncSummary};
pub use verifier::{
    sample_indices, sample_size, DeliveryDiscrepancy, IntegrityReport, VerificationReport,
    Verifier,
};
