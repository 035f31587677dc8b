//! Integration tests for the sync_states vertical slice

mod test_helpers;

use chrono::Utc;
use mobility_core::{DayProgress, DayStatus, JobId, SyncProgress, SyncState, SyncStateStore};
use test_helpers::*;

fn state_with_progress(job_id: &JobId, copied: u64) -> SyncState {
    let mut day = DayProgress {
        total_files: 10,
        copied_files: copied,
        total_bytes: 1000,
        copied_bytes: copied * 100,
        ..Default::default()
    };
    day.refresh_status();

    let mut state = SyncState::new(job_id.clone());
    state.copied_objects = copied;
    state.copied_bytes = copied * 100;
    state.expected_object_count = Some(10);
    state.expected_total_bytes = Some(1000);
    state.started_at = Some(Utc::now());
    state.progress = Some(SyncProgress {
        current_day: Some("2024-01-01".into()),
        days: [("2024-01-01".to_string(), day)].into(),
        ..Default::default()
    });
    state
}

#[tokio::test]
async fn test_missing_state_is_none() {
    let test_db = TestDb::new().await;
    let store = test_db.store();

    let state = SyncStateStore::get(&store, &JobId::new("nope"))
        .await
        .expect("Query should succeed");

    assert!(state.is_none());
}

#[tokio::test]
async fn test_put_then_get_roundtrips_ledger() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let job_id = JobId::new("job-1");

    let state = state_with_progress(&job_id, 4);
    store.put(&state).await.expect("Failed to put state");

    let loaded = SyncStateStore::get(&store, &job_id)
        .await
        .unwrap()
        .expect("State should exist");

    assert_eq!(loaded.copied_objects, 4);
    assert_eq!(loaded.expected_object_count, Some(10));
    let progress = loaded.progress.expect("Ledger should be stored");
    assert_eq!(progress.days["2024-01-01"].status, DayStatus::Copying);
    assert_eq!(progress.current_day.as_deref(), Some("2024-01-01"));
}

#[tokio::test]
async fn test_put_replaces_previous_state() {
    let test_db = TestDb::new().await;
    let store = test_db.store();
    let job_id = JobId::new("job-1");

    store.put(&state_with_progress(&job_id, 2)).await.unwrap();
    let mut done = state_with_progress(&job_id, 10);
    done.completed_at = Some(Utc::now());
    store.put(&done).await.unwrap();

    let loaded = SyncStateStore::get(&store, &job_id).await.unwrap().unwrap();
    assert_eq!(loaded.copied_objects, 10);
    assert!(loaded.completed_at.is_some());
    assert_eq!(
        loaded.progress.unwrap().days["2024-01-01"].status,
        DayStatus::Completed
    );
}

#[tokio::test]
async fn test_delete_state() {
    let test_db = TestDb::new().await;
    let job_id = JobId::new("job-1");
    test_db
        .store()
        .put(&state_with_progress(&job_id, 1))
        .await
        .unwrap();

    assert!(mobility_storage::sync_states::delete(test_db.pool(), &job_id)
        .await
        .unwrap());
    assert!(!mobility_storage::sync_states::delete(test_db.pool(), &job_id)
        .await
        .unwrap());
}
