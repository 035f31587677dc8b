//! Mobility Mirror Core
//!
//! Domain types, collaborator traits, and error handling shared by the
//! mirroring engine, its storage adapters, and the server.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Job`, `SyncState`, `DayProgress`, `SyncStatusResponse`, ...
//! - **Collaborator Traits**: `JobRepository`, `ObjectStorage`, `SyncStateStore`
//! - **Error Handling**: Unified `CoreError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use mobility_core::types::{partition_date, StoragePath};
//!
//! let path: StoragePath = "s3://vendor-bucket/exports/job-42/".parse().unwrap();
//! assert_eq!(path.bucket, "vendor-bucket");
//! assert_eq!(path.relative_key("exports/job-42/date=2024-01-01/part-0.parquet"), "date=2024-01-01/part-0.parquet");
//! assert_eq!(partition_date("exports/date=2024-01-01/part-0.parquet"), "2024-01-01");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{CoreError, Result};
pub use traits::{JobRepository, ObjectStorage, SyncStateStore};

pub use types::{
    // Identifiers
    JobId, RunId,
    // Job record
    Job, JobUpdate, NewJob, StoragePath,
    // Object storage
    BatchCopyResult, CopyEvent, CopyItem, ObjectCount, ObjectEntry,
    // Progress ledger
    partition_date, DayError, DayProgress, DayStatus, SyncProgress, UNDATED_PARTITION,
    // Ephemeral state and derived status
    SyncState, SyncStatus, SyncStatusResponse,
};
