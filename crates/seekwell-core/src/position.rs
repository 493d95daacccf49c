//! Position Store - durable resume offsets per video
//!
//! Writes land in memory immediately and a background task persists a
//! snapshot after a short debounce, so a burst of ticks costs one write.
//! Storage failures are logged and absorbed: a read that cannot be served
//! returns 0 and a write that cannot be persisted is retried on the next flush.

use crate::config::PositionConfig;
use crate::types::{PlaybackOffset, VideoId};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// One remembered resume offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub id: VideoId,
    pub offset_ms: PlaybackOffset,
    pub updated_at: DateTime<Utc>,
}

/// Persisted form of the store; entries run oldest to newest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub version: u32,
    pub entries: Vec<PositionEntry>,
}

impl PositionSnapshot {
    pub fn new(entries: Vec<PositionEntry>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entries,
        }
    }
}

/// Storage seam for position snapshots
#[async_trait]
pub trait PositionBackend: Send + Sync {
    /// Load the last saved snapshot, `None` if nothing was ever saved
    async fn load(&self) -> Result<Option<PositionSnapshot>>;

    /// Replace the saved snapshot
    async fn save(&self, snapshot: &PositionSnapshot) -> Result<()>;
}

/// JSON file backend with atomic replace
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "positions.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PositionBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<PositionSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: PositionSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::SnapshotVersion(snapshot.version));
        }
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &PositionSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// In-memory backend, shared between store instances to simulate restarts
#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshot: Mutex<Option<PositionSnapshot>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent load and save fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Option<PositionSnapshot> {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl PositionBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<PositionSnapshot>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage("memory backend unavailable".into()));
        }
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &PositionSnapshot) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage("memory backend unavailable".into()));
        }
        *self.snapshot.lock().await = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    offset_ms: PlaybackOffset,
    updated_at: DateTime<Utc>,
    tick: u64,
}

/// Offsets keyed by video, evicting the least recently used past capacity
#[derive(Debug)]
struct RecencyMap {
    capacity: usize,
    tick: u64,
    slots: HashMap<VideoId, Slot>,
    order: BTreeMap<u64, VideoId>,
}

impl RecencyMap {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            slots: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, id: &VideoId) -> Option<PlaybackOffset> {
        let tick = self.next_tick();
        let slot = self.slots.get_mut(id)?;
        self.order.remove(&slot.tick);
        slot.tick = tick;
        self.order.insert(tick, id.clone());
        Some(slot.offset_ms)
    }

    /// Insert or overwrite; returns the evicted ids
    fn insert(
        &mut self,
        id: VideoId,
        offset_ms: PlaybackOffset,
        updated_at: DateTime<Utc>,
    ) -> Vec<VideoId> {
        let tick = self.next_tick();
        if let Some(old) = self.slots.get(&id) {
            self.order.remove(&old.tick);
        }
        self.order.insert(tick, id.clone());
        self.slots.insert(
            id,
            Slot {
                offset_ms,
                updated_at,
                tick,
            },
        );

        let mut evicted = Vec::new();
        while self.slots.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.slots.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    fn remove(&mut self, id: &VideoId) -> bool {
        match self.slots.remove(id) {
            Some(slot) => {
                self.order.remove(&slot.tick);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn entries(&self) -> Vec<PositionEntry> {
        self.order
            .values()
            .filter_map(|id| {
                self.slots.get(id).map(|slot| PositionEntry {
                    id: id.clone(),
                    offset_ms: slot.offset_ms,
                    updated_at: slot.updated_at,
                })
            })
            .collect()
    }
}

struct StoreInner {
    backend: Arc<dyn PositionBackend>,
    map: Mutex<RecencyMap>,
    dirty: AtomicBool,
    closed: AtomicBool,
    wake: Arc<Notify>,
    save_lock: Mutex<()>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl StoreInner {
    async fn persist(&self) {
        let _guard = self.save_lock.lock().await;
        self.dirty.store(false, Ordering::SeqCst);

        let snapshot = PositionSnapshot::new(self.map.lock().await.entries());
        let count = snapshot.entries.len();

        match self.backend.save(&snapshot).await {
            Ok(()) => debug!(entries = count, "Positions persisted"),
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                warn!(error = %e, code = e.error_code(), "Failed to persist positions");
            }
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        // Lets an idle flusher observe that the store is gone
        self.wake.notify_one();
    }
}

async fn run_flusher(inner: Weak<StoreInner>, wake: Arc<Notify>, debounce: Duration) {
    loop {
        wake.notified().await;
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.closed.load(Ordering::SeqCst) {
            break;
        }
        if inner.dirty.load(Ordering::SeqCst) {
            inner.persist().await;
        }
    }
    debug!("Position flusher stopped");
}

/// Durable video → resume offset mapping
#[derive(Clone)]
pub struct PositionStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for PositionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionStore")
            .field("dirty", &self.inner.dirty.load(Ordering::SeqCst))
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl PositionStore {
    /// Open a store over `backend` and start its flusher.
    ///
    /// A snapshot that cannot be loaded is logged and the store starts empty.
    pub async fn open(backend: Arc<dyn PositionBackend>, config: &PositionConfig) -> Self {
        let mut map = RecencyMap::new(config.capacity);

        match backend.load().await {
            Ok(Some(snapshot)) => {
                let loaded = snapshot.entries.len();
                for entry in snapshot.entries {
                    map.insert(entry.id, entry.offset_ms, entry.updated_at);
                }
                info!(loaded, kept = map.len(), capacity = config.capacity, "Positions loaded");
            }
            Ok(None) => debug!("No saved positions"),
            Err(e) => warn!(
                error = %e,
                code = e.error_code(),
                "Failed to load positions, starting empty"
            ),
        }

        let wake = Arc::new(Notify::new());
        let inner = Arc::new(StoreInner {
            backend,
            map: Mutex::new(map),
            dirty: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            wake: wake.clone(),
            save_lock: Mutex::new(()),
            flusher: Mutex::new(None),
        });

        let handle = tokio::spawn(run_flusher(
            Arc::downgrade(&inner),
            wake,
            config.flush_debounce(),
        ));
        *inner.flusher.lock().await = Some(handle);

        Self { inner }
    }

    /// Open a JSON-file store at the configured path
    pub async fn open_file(config: &PositionConfig) -> Self {
        Self::open(Arc::new(JsonFileBackend::new(config.path.clone())), config).await
    }

    /// Last saved offset for `id`, or 0 when unknown
    pub async fn get(&self, id: &VideoId) -> PlaybackOffset {
        self.inner.map.lock().await.get(id).unwrap_or(0)
    }

    /// Remember `offset_ms` for `id`.
    ///
    /// Skipped when the offset is not positive or the media has no measurable
    /// duration yet. Returns whether the value was recorded.
    #[instrument(skip(self), fields(video_id = %id))]
    pub async fn put(&self, id: &VideoId, offset_ms: i64, duration_ms: i64) -> bool {
        if offset_ms <= 0 || duration_ms <= 0 {
            debug!(offset_ms, duration_ms, "Position not recorded");
            return false;
        }

        let evicted = self
            .inner
            .map
            .lock()
            .await
            .insert(id.clone(), offset_ms as PlaybackOffset, Utc::now());
        if !evicted.is_empty() {
            debug!(evicted = ?evicted, "Evicted least recently used positions");
        }

        self.mark_dirty();
        true
    }

    /// Forget one video; returns whether it was present
    pub async fn remove(&self, id: &VideoId) -> bool {
        let removed = self.inner.map.lock().await.remove(id);
        if removed {
            self.mark_dirty();
        }
        removed
    }

    /// Forget every video
    pub async fn clear(&self) {
        self.inner.map.lock().await.clear();
        self.mark_dirty();
    }

    pub async fn len(&self) -> usize {
        self.inner.map.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All entries, least recently used first
    pub async fn entries(&self) -> Vec<PositionEntry> {
        self.inner.map.lock().await.entries()
    }

    /// Persist the current contents now
    pub async fn flush(&self) {
        self.inner.persist().await;
    }

    /// Stop the flusher and persist one last time
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.inner.flusher.lock().await.take() {
            handle.abort();
        }
        self.inner.persist().await;
        info!("Position store shut down");
    }

    fn mark_dirty(&self) {
        self.inner.dirty.store(true, Ordering::SeqCst);
        if !self.inner.closed.load(Ordering::SeqCst) {
            self.inner.wake.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize) -> PositionConfig {
        PositionConfig {
            capacity,
            flush_debounce_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = PositionStore::open(Arc::new(MemoryBackend::new()), &config(10)).await;
        let id = VideoId::from("bv1");

        assert_eq!(store.get(&id).await, 0);
        assert!(store.put(&id, 45_000, 600_000).await);
        assert_eq!(store.get(&id).await, 45_000);

        assert!(store.put(&id, 50_000, 600_000).await);
        assert_eq!(store.get(&id).await, 50_000);
    }

    #[tokio::test]
    async fn test_guard_keeps_existing_offset() {
        let store = PositionStore::open(Arc::new(MemoryBackend::new()), &config(10)).await;
        let id = VideoId::from("bv1");
        store.put(&id, 45_000, 600_000).await;

        assert!(!store.put(&id, 0, 600_000).await);
        assert!(!store.put(&id, -5, 600_000).await);
        assert!(!store.put(&id, 10_000, 0).await);
        assert!(!store.put(&id, 10_000, -1).await);
        assert_eq!(store.get(&id).await, 45_000);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let store = PositionStore::open(Arc::new(MemoryBackend::new()), &config(2)).await;
        let (a, b, c) = (VideoId::from("a"), VideoId::from("b"), VideoId::from("c"));

        store.put(&a, 1_000, 10_000).await;
        store.put(&b, 2_000, 10_000).await;
        // Reading a makes b the least recently used
        assert_eq!(store.get(&a).await, 1_000);
        store.put(&c, 3_000, 10_000).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(&b).await, 0);
        assert_eq!(store.get(&a).await, 1_000);
        assert_eq!(store.get(&c).await, 3_000);
    }

    #[tokio::test]
    async fn test_flush_and_reload_keeps_recency() {
        let backend = Arc::new(MemoryBackend::new());
        let store = PositionStore::open(backend.clone(), &config(3)).await;
        for (id, offset) in [("a", 1_000), ("b", 2_000), ("c", 3_000)] {
            store.put(&VideoId::from(id), offset, 10_000).await;
        }
        store.get(&VideoId::from("a")).await;
        store.shutdown().await;

        let snapshot = backend.snapshot().await.unwrap();
        let ids: Vec<&str> = snapshot.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let reopened = PositionStore::open(backend.clone(), &config(3)).await;
        reopened.put(&VideoId::from("d"), 4_000, 10_000).await;
        assert_eq!(reopened.get(&VideoId::from("b")).await, 0);
        assert_eq!(reopened.get(&VideoId::from("a")).await, 1_000);
    }

    #[tokio::test]
    async fn test_load_failure_starts_empty() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_failing(true);
        let cfg = PositionConfig {
            capacity: 10,
            flush_debounce_ms: 60_000,
            ..Default::default()
        };
        let store = PositionStore::open(backend.clone(), &cfg).await;
        assert!(store.is_empty().await);

        // Writes still work in memory and the failed flush is absorbed
        assert!(store.put(&VideoId::from("bv1"), 5_000, 10_000).await);
        store.flush().await;
        assert_eq!(store.get(&VideoId::from("bv1")).await, 5_000);
        assert_eq!(backend.save_count(), 0);

        backend.set_failing(false);
        store.flush().await;
        assert_eq!(backend.save_count(), 1);
    }

    #[tokio::test]
    async fn test_background_flush_coalesces() {
        let backend = Arc::new(MemoryBackend::new());
        let cfg = PositionConfig {
            capacity: 10,
            flush_debounce_ms: 50,
            ..Default::default()
        };
        let store = PositionStore::open(backend.clone(), &cfg).await;
        let id = VideoId::from("bv1");
        for offset in [1_000, 2_000, 3_000] {
            store.put(&id, offset, 10_000).await;
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        let snapshot = backend.snapshot().await.unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].offset_ms, 3_000);
        assert!(backend.save_count() >= 1);
        assert!(backend.save_count() <= 2);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = PositionStore::open(Arc::new(MemoryBackend::new()), &config(10)).await;
        store.put(&VideoId::from("a"), 1_000, 10_000).await;
        store.put(&VideoId::from("b"), 2_000, 10_000).await;

        assert!(store.remove(&VideoId::from("a")).await);
        assert!(!store.remove(&VideoId::from("a")).await);
        assert_eq!(store.len().await, 1);

        store.clear().await;
        assert!(store.is_empty().await);
    }
}
