use mobility_core::{CoreError, JobId};
use thiserror::Error;

/// Errors that can end a sync run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job has no source path")]
    NoSource,

    #[error("No destination configured for job")]
    NoDestination,

    #[error("No objects found at {0}; the vendor export may not have finished")]
    NoSourceObjects(String),

    #[error("{failed} object(s) failed to copy; first error: {first_error}")]
    Transfer { failed: usize, first_error: String },

    #[error("Count mismatch: destination has {destination_count} objects, source has {source_count}")]
    CountMismatch {
        source_count: u64,
        destination_count: u64,
    },

    #[error(
        "Integrity check failed: {mismatches} of {sampled} sampled objects differ; \
         first mismatch {key} (source ETag {source_etag}, destination ETag {destination_etag})"
    )]
    IntegrityMismatch {
        sampled: usize,
        mismatches: usize,
        key: String,
        source_etag: String,
        destination_etag: String,
    },

    #[error("Destination is missing {count} date partition(s): {dates}")]
    MissingPartitions { count: usize, dates: String },

    #[error("Sync was cancelled")]
    Cancelled,

    #[error("Sync was superseded by a newer run")]
    Superseded,

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
