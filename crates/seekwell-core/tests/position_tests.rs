//! Integration tests for position persistence

use seekwell_core::{JsonFileBackend, PositionBackend, PositionConfig, PositionStore, VideoId};
use seekwell_core::position::{PositionSnapshot, SNAPSHOT_VERSION};
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir, capacity: usize) -> PositionConfig {
    PositionConfig {
        path: dir.path().join("state").join("positions.json"),
        capacity,
        flush_debounce_ms: 60_000,
    }
}

// =============================================================================
// Restart
// =============================================================================

#[tokio::test]
async fn test_position_survives_restart() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, 500);
    let id = VideoId::from("bv1");

    let store = PositionStore::open_file(&cfg).await;
    assert!(store.put(&id, 45_000, 600_000).await);
    store.shutdown().await;

    let reopened = PositionStore::open_file(&cfg).await;
    assert_eq!(reopened.get(&id).await, 45_000);
    assert_eq!(reopened.get(&VideoId::from("never-seen")).await, 0);
}

#[test]
fn test_restart_on_fresh_runtime() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, 500);

    tokio_test::block_on(async {
        let store = PositionStore::open_file(&cfg).await;
        store.put(&VideoId::from("bv9"), 7_500, 90_000).await;
        store.shutdown().await;
    });

    let offset = tokio_test::block_on(async {
        PositionStore::open_file(&cfg).await.get(&VideoId::from("bv9")).await
    });
    assert_eq!(offset, 7_500);
}

#[tokio::test]
async fn test_zero_write_does_not_clobber_saved_offset() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, 500);
    let id = VideoId::from("bv1");

    let store = PositionStore::open_file(&cfg).await;
    store.put(&id, 45_000, 600_000).await;
    assert!(!store.put(&id, 0, 600_000).await);
    store.shutdown().await;

    let reopened = PositionStore::open_file(&cfg).await;
    assert_eq!(reopened.get(&id).await, 45_000);
}

// =============================================================================
// Snapshot format
// =============================================================================

#[tokio::test]
async fn test_snapshot_file_format() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, 500);

    let store = PositionStore::open_file(&cfg).await;
    store.put(&VideoId::from("a"), 1_000, 10_000).await;
    store.put(&VideoId::from("b"), 2_000, 10_000).await;
    store.flush().await;

    let text = std::fs::read_to_string(&cfg.path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["entries"][0]["id"], "a");
    assert_eq!(json["entries"][1]["offset_ms"], 2_000);
    assert!(json["entries"][1]["updated_at"].is_string());

    // No temp file left behind
    let leftovers: Vec<_> = std::fs::read_dir(cfg.path.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_eviction_order_survives_reload() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, 3);

    let store = PositionStore::open_file(&cfg).await;
    for (id, offset) in [("a", 1_000), ("b", 2_000), ("c", 3_000)] {
        store.put(&VideoId::from(id), offset, 10_000).await;
    }
    store.get(&VideoId::from("a")).await;
    store.shutdown().await;

    let reopened = PositionStore::open_file(&cfg).await;
    reopened.put(&VideoId::from("d"), 4_000, 10_000).await;

    assert_eq!(reopened.get(&VideoId::from("b")).await, 0);
    let ids: Vec<String> = reopened
        .entries()
        .await
        .into_iter()
        .map(|e| e.id.to_string())
        .collect();
    assert_eq!(ids, vec!["c", "a", "d"]);
}

#[tokio::test]
async fn test_corrupt_or_unknown_snapshot_starts_empty() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, 500);
    std::fs::create_dir_all(cfg.path.parent().unwrap()).unwrap();

    std::fs::write(&cfg.path, "{not json").unwrap();
    let store = PositionStore::open_file(&cfg).await;
    assert!(store.is_empty().await);

    let backend = JsonFileBackend::new(cfg.path.clone());
    backend
        .save(&PositionSnapshot {
            version: SNAPSHOT_VERSION + 1,
            entries: Vec::new(),
        })
        .await
        .unwrap();
    assert!(backend.load().await.is_err());

    let store = PositionStore::open(Arc::new(backend), &cfg).await;
    assert!(store.is_empty().await);
    assert!(store.put(&VideoId::from("bv1"), 1_000, 10_000).await);
    store.shutdown().await;

    let reopened = PositionStore::open_file(&cfg).await;
    assert_eq!(reopened.get(&VideoId::from("bv1")).await, 1_000);
}
