//! Failure cooldowns for descriptor fetches
//!
//! Repeatedly hammering the descriptor endpoint after failures raises the
//! server's rate-limit score. Two windows suppress fetches:
//! - per video: a video that failed is not re-fetched for a while
//! - global: after several consecutive failures, nothing is fetched
//!
//! A forced load skips the check entirely.

use crate::types::VideoId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooldown configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Per-video cooldown after a failure (milliseconds)
    pub video_cooldown_ms: u64,
    /// Consecutive failures that trigger the global cooldown
    pub global_failure_threshold: u32,
    /// Global cooldown length (milliseconds)
    pub global_cooldown_ms: u64,
    /// Maximum number of failed videos remembered
    pub max_tracked_videos: usize,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            video_cooldown_ms: 30 * 60 * 1000,
            global_failure_threshold: 3,
            global_cooldown_ms: 5 * 60 * 1000,
            max_tracked_videos: 50,
        }
    }
}

/// Whether a fetch for a video may proceed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownStatus {
    Ready,
    Video {
        remaining: Duration,
    },
    Global {
        remaining: Duration,
        consecutive_failures: u32,
    },
}

impl CooldownStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, CooldownStatus::Ready)
    }
}

/// Tracks fetch failures for one orchestrator
#[derive(Debug)]
pub struct CooldownTracker {
    config: CooldownConfig,
    failed_videos: HashMap<VideoId, Instant>,
    consecutive_failures: u32,
    global_since: Option<Instant>,
}

impl CooldownTracker {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            failed_videos: HashMap::new(),
            consecutive_failures: 0,
            global_since: None,
        }
    }

    fn video_window(&self) -> Duration {
        Duration::from_millis(self.config.video_cooldown_ms)
    }

    fn global_window(&self) -> Duration {
        Duration::from_millis(self.config.global_cooldown_ms)
    }

    /// Current status for `video_id`
    pub fn status(&mut self, video_id: &VideoId) -> CooldownStatus {
        self.status_at(video_id, Instant::now())
    }

    /// Status as of `now`; expired windows are cleared as a side effect
    pub fn status_at(&mut self, video_id: &VideoId, now: Instant) -> CooldownStatus {
        if let Some(since) = self.global_since {
            let elapsed = now.saturating_duration_since(since);
            if elapsed < self.global_window() {
                let remaining = self.global_window() - elapsed;
                debug!(remaining_ms = remaining.as_millis() as u64, "Global cooldown active");
                return CooldownStatus::Global {
                    remaining,
                    consecutive_failures: self.consecutive_failures,
                };
            }
            info!("Global cooldown ended");
            self.global_since = None;
            self.consecutive_failures = 0;
        }

        if let Some(failed_at) = self.failed_videos.get(video_id).copied() {
            let elapsed = now.saturating_duration_since(failed_at);
            if elapsed < self.video_window() {
                let remaining = self.video_window() - elapsed;
                debug!(
                    video_id = %video_id,
                    remaining_ms = remaining.as_millis() as u64,
                    "Video cooldown active"
                );
                return CooldownStatus::Video { remaining };
            }
            self.failed_videos.remove(video_id);
        }

        CooldownStatus::Ready
    }

    /// Record a failed fetch
    pub fn record_failure(&mut self, video_id: &VideoId, reason: &str) {
        self.record_failure_at(video_id, reason, Instant::now());
    }

    pub fn record_failure_at(&mut self, video_id: &VideoId, reason: &str, now: Instant) {
        self.failed_videos.insert(video_id.clone(), now);
        self.prune(now);
        self.consecutive_failures += 1;

        warn!(
            video_id = %video_id,
            reason,
            consecutive_failures = self.consecutive_failures,
            "Fetch failure recorded"
        );

        if self.consecutive_failures >= self.config.global_failure_threshold
            && self.global_since.is_none()
        {
            self.global_since = Some(now);
            warn!(
                consecutive_failures = self.consecutive_failures,
                "Global cooldown triggered"
            );
        }
    }

    /// Record a successful fetch; resets the failure streak
    pub fn record_success(&mut self, video_id: &VideoId) {
        if self.consecutive_failures > 0 {
            debug!(previous = self.consecutive_failures, "Failure streak reset");
        }
        self.consecutive_failures = 0;
        self.global_since = None;
        self.failed_videos.remove(video_id);
    }

    /// Forget the cooldown for one video (user-forced retry)
    pub fn clear_video(&mut self, video_id: &VideoId) {
        self.failed_videos.remove(video_id);
    }

    /// Forget all cooldown state
    pub fn clear_all(&mut self) {
        self.failed_videos.clear();
        self.consecutive_failures = 0;
        self.global_since = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn tracked_videos(&self) -> usize {
        self.failed_videos.len()
    }

    fn prune(&mut self, now: Instant) {
        let window = self.video_window();
        self.failed_videos
            .retain(|_, failed_at| now.saturating_duration_since(*failed_at) <= window);

        while self.failed_videos.len() > self.config.max_tracked_videos {
            let oldest = self
                .failed_videos
                .iter()
                .min_by_key(|(_, failed_at)| **failed_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.failed_videos.remove(&id);
                }
                None => break,
            }
        }
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(CooldownConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CooldownConfig {
        CooldownConfig {
            video_cooldown_ms: 1_000,
            global_failure_threshold: 3,
            global_cooldown_ms: 500,
            max_tracked_videos: 2,
        }
    }

    #[test]
    fn test_video_cooldown_window() {
        let mut tracker = CooldownTracker::new(config());
        let start = Instant::now();
        let id = VideoId::from("bv1");

        assert!(tracker.status_at(&id, start).is_ready());
        tracker.record_failure_at(&id, "empty url", start);

        match tracker.status_at(&id, start + Duration::from_millis(400)) {
            CooldownStatus::Video { remaining } => {
                assert_eq!(remaining, Duration::from_millis(600))
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(tracker.status_at(&VideoId::from("bv2"), start).is_ready());
        assert!(tracker.status_at(&id, start + Duration::from_millis(1_000)).is_ready());
        assert_eq!(tracker.tracked_videos(), 0);
    }

    #[test]
    fn test_global_cooldown_after_threshold() {
        let mut tracker = CooldownTracker::new(config());
        let start = Instant::now();
        for id in ["a", "b", "c"] {
            tracker.record_failure_at(&VideoId::from(id), "timeout", start);
        }

        let other = VideoId::from("fresh");
        assert!(matches!(
            tracker.status_at(&other, start + Duration::from_millis(100)),
            CooldownStatus::Global { consecutive_failures: 3, .. }
        ));

        // Global window ends and resets the streak
        assert!(tracker.status_at(&other, start + Duration::from_millis(600)).is_ready());
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn test_success_resets_streak() {
        let mut tracker = CooldownTracker::new(config());
        let start = Instant::now();
        let id = VideoId::from("bv1");
        tracker.record_failure_at(&id, "timeout", start);
        tracker.record_failure_at(&VideoId::from("bv2"), "timeout", start);
        tracker.record_success(&id);

        assert_eq!(tracker.consecutive_failures(), 0);
        assert!(tracker.status_at(&id, start).is_ready());
    }

    #[test]
    fn test_tracked_videos_bounded() {
        let mut tracker = CooldownTracker::new(config());
        let start = Instant::now();
        tracker.record_failure_at(&VideoId::from("a"), "x", start);
        tracker.record_failure_at(&VideoId::from("b"), "x", start + Duration::from_millis(1));
        tracker.clear_all();
        tracker.record_failure_at(&VideoId::from("c"), "x", start + Duration::from_millis(2));
        tracker.record_failure_at(&VideoId::from("d"), "x", start + Duration::from_millis(3));
        tracker.record_success(&VideoId::from("zzz"));
        tracker.record_failure_at(&VideoId::from("e"), "x", start + Duration::from_millis(4));

        assert_eq!(tracker.tracked_videos(), 2);
        assert!(tracker
            .status_at(&VideoId::from("c"), start + Duration::from_millis(5))
            .is_ready());
    }
}
