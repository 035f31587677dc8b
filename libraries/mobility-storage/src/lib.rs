//! Mobility Mirror Storage
//!
//! Persistence adapters for the mirroring engine.
//!
//! # Architecture
//!
//! - **SQLite**: [`LocalJobStore`] keeps job records and sync states in two
//!   tables, one vertical slice per table
//! - **Local objects**: [`LocalObjectStore`] treats directories under a root
//!   as buckets
//! - **In-memory**: [`MemoryJobRepository`], [`MemorySyncStateStore`] and
//!   [`MemoryObjectStore`] for tests and dry runs, with fault injection
//!
//! # Example
//!
//! ```rust,no_run
//! use mobility_core::{JobRepository, NewJob};
//! use mobility_storage::{create_pool, run_migrations, LocalJobStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool("sqlite://mirror.db").await?;
//! run_migrations(&pool).await?;
//!
//! let store = LocalJobStore::new(pool);
//! let job = store
//!     .create_job(NewJob {
//!         source_path: "s3://vendor/exports/42/".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod batch;
mod columns;
mod context;
mod error;
mod local;
mod memory;

// Vertical slices
pub mod jobs;
pub mod sync_states;

pub use context::LocalJobStore;
pub use error::StorageError;
pub use local::LocalObjectStore;
pub use memory::{MemoryJobRepository, MemoryObjectStore, MemorySyncStateStore};

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePool;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// Call once at startup before handing the pool to [`LocalJobStore`].
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `sqlite://mirror.db`)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    tracing::debug!("Creating SQLite pool for {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}
