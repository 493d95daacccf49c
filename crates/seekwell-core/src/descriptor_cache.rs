//! Short-lived cache of descriptor responses across loads
//!
//! Re-opening a video shortly after leaving it is served from here instead of
//! the network. Entries expire after a TTL since stream URLs are signed and
//! go stale. Capacity is bounded; the least recently used entry goes first.
//!
//! This is separate from the per-video `QualityCatalog`, which is replaced
//! wholesale on every load.

use crate::types::{DescriptorResponse, VideoId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Descriptor cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorCacheConfig {
    pub enabled: bool,
    /// Maximum number of videos cached
    pub capacity: usize,
    /// Entry lifetime (milliseconds)
    pub ttl_ms: u64,
}

impl Default for DescriptorCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 80,
            ttl_ms: 10 * 60 * 1000,
        }
    }
}

#[derive(Debug)]
struct CachedDescriptors {
    response: DescriptorResponse,
    stored_at: Instant,
    last_used: u64,
}

/// TTL-bounded LRU of descriptor responses keyed by video
#[derive(Debug)]
pub struct DescriptorCache {
    config: DescriptorCacheConfig,
    entries: HashMap<VideoId, CachedDescriptors>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl DescriptorCache {
    pub fn new(config: DescriptorCacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.capacity > 0
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.config.ttl_ms)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn get(&mut self, video_id: &VideoId) -> Option<DescriptorResponse> {
        self.get_at(video_id, Instant::now())
    }

    /// Fresh response for `video_id` as of `now`; an expired entry is dropped
    pub fn get_at(&mut self, video_id: &VideoId, now: Instant) -> Option<DescriptorResponse> {
        let ttl = self.ttl();
        let tick = self.next_tick();

        let Some(entry) = self.entries.get_mut(video_id) else {
            self.misses += 1;
            debug!(video_id = %video_id, "Descriptor cache miss");
            return None;
        };

        let age = now.saturating_duration_since(entry.stored_at);
        if age >= ttl {
            self.entries.remove(video_id);
            self.misses += 1;
            debug!(
                video_id = %video_id,
                age_ms = age.as_millis() as u64,
                "Descriptor cache entry expired"
            );
            return None;
        }

        entry.last_used = tick;
        self.hits += 1;
        debug!(
            video_id = %video_id,
            expires_in_ms = (ttl - age).as_millis() as u64,
            "Descriptor cache hit"
        );
        Some(entry.response.clone())
    }

    pub fn put(&mut self, video_id: &VideoId, response: DescriptorResponse) {
        self.put_at(video_id, response, Instant::now());
    }

    pub fn put_at(&mut self, video_id: &VideoId, response: DescriptorResponse, now: Instant) {
        if !self.is_enabled() {
            return;
        }

        let tick = self.next_tick();
        self.entries.insert(
            video_id.clone(),
            CachedDescriptors {
                response,
                stored_at: now,
                last_used: tick,
            },
        );

        while self.entries.len() > self.config.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!(video_id = %id, "Descriptor cache evicted");
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Drop the entry for `video_id`, e.g. after its URLs were rejected
    pub fn invalidate(&mut self, video_id: &VideoId) -> bool {
        self.entries.remove(video_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
