//! Test helpers and fixtures for storage integration tests
//!
//! These helpers create test databases using REAL SQLite files (NOT in-memory)
//! so migrations, constraints and WAL mode behave as in production.

#![allow(dead_code)]

use mobility_core::{JobRepository, NewJob};
use mobility_storage::LocalJobStore;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Test database wrapper that cleans up on drop
pub struct TestDb {
    pub pool: SqlitePool,
    _temp_dir: TempDir,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db_url = format!("sqlite://{}", db_path.display());

        let pool = mobility_storage::create_pool(&db_url)
            .await
            .expect("Failed to create pool");

        mobility_storage::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        Self {
            pool,
            _temp_dir: temp_dir,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn store(&self) -> LocalJobStore {
        LocalJobStore::new(self.pool.clone())
    }
}

/// Test fixture: a job pointing at a vendor prefix
pub async fn create_test_job(store: &LocalJobStore, source: &str) -> mobility_core::Job {
    store
        .create_job(NewJob {
            source_path: source.to_string(),
            ..Default::default()
        })
        .await
        .expect("Failed to create test job")
}
