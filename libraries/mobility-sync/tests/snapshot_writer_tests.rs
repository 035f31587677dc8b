//! Latest-wins behavior of the sync state writer

use mobility_core::{JobId, SyncState, SyncStateStore};
use mobility_storage::MemorySyncStateStore;
use mobility_sync::SnapshotWriter;
use std::sync::Arc;
use std::time::Duration;

fn state(copied: u64) -> SyncState {
    let mut state = SyncState::new(JobId::new("job-1"));
    state.copied_objects = copied;
    state
}

#[tokio::test]
async fn test_slow_store_coalesces_to_latest_snapshot() {
    let store = Arc::new(MemorySyncStateStore::new().with_write_delay(Duration::from_millis(50)));
    let writer = SnapshotWriter::spawn(store.clone());

    for copied in 0..100 {
        writer.publish(state(copied));
    }
    writer.finish().await;

    assert!(
        store.write_count() <= 2,
        "expected coalesced writes, got {}",
        store.write_count()
    );
    let stored = store.get(&JobId::new("job-1")).await.unwrap().unwrap();
    assert_eq!(stored.copied_objects, 99);
}

#[tokio::test]
async fn test_publishing_never_waits_for_the_store() {
    let store = Arc::new(MemorySyncStateStore::new().with_write_delay(Duration::from_millis(200)));
    let writer = SnapshotWriter::spawn(store.clone());

    let started = std::time::Instant::now();
    for copied in 0..1000 {
        writer.publish(state(copied));
        tokio::task::yield_now().await;
    }
    assert!(started.elapsed() < Duration::from_millis(200));

    writer.finish().await;
    let stored = store.get(&JobId::new("job-1")).await.unwrap().unwrap();
    assert_eq!(stored.copied_objects, 999);
}

#[tokio::test]
async fn test_abort_drops_queued_snapshot() {
    let store = Arc::new(MemorySyncStateStore::new().with_write_delay(Duration::from_millis(50)));
    let writer = SnapshotWriter::spawn(store.clone());

    writer.publish(state(7));
    writer.abort();

    // Past the point where a queued write would have landed
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.write_count(), 0);
    assert!(store.get(&JobId::new("job-1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_finish_without_publish_writes_nothing() {
    let store = Arc::new(MemorySyncStateStore::new());
    let writer = SnapshotWriter::spawn(store.clone());

    writer.finish().await;

    assert_eq!(store.write_count(), 0);
}
