//! Headless rendering engine
//!
//! Stands in for a real decoder: it accepts requests, logs them and advances a
//! wall-clock position so ticks and switches behave as they would on screen.

use async_trait::async_trait;
use seekwell_core::{PlayableRequest, RenderingEngine};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::info;

struct Playback {
    request: PlayableRequest,
    base_ms: u64,
    started: Instant,
}

/// Engine that plays nothing and keeps time
pub struct HeadlessEngine {
    playback: Mutex<Option<Playback>>,
    duration_ms: Mutex<Option<u64>>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            playback: Mutex::new(None),
            duration_ms: Mutex::new(None),
        }
    }

    /// Duration becomes known once the descriptors arrive
    pub fn set_duration(&self, duration_ms: Option<u64>) {
        *lock(&self.duration_ms) = duration_ms;
    }

    pub fn current_request(&self) -> Option<PlayableRequest> {
        lock(&self.playback).as_ref().map(|p| p.request.clone())
    }

    fn clamp(&self, position_ms: u64) -> u64 {
        match *lock(&self.duration_ms) {
            Some(duration) => position_ms.min(duration),
            None => position_ms,
        }
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl RenderingEngine for HeadlessEngine {
    async fn prepare_and_play(&self, request: &PlayableRequest) -> seekwell_core::Result<()> {
        info!(
            quality = %request.quality,
            video_url = %request.video_url,
            audio_url = ?request.audio_url,
            resume_offset_ms = request.resume_offset_ms,
            "Headless playback started"
        );
        *lock(&self.playback) = Some(Playback {
            request: request.clone(),
            base_ms: request.resume_offset_ms,
            started: Instant::now(),
        });
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> seekwell_core::Result<()> {
        let target = self.clamp(position_ms);
        if let Some(playback) = lock(&self.playback).as_mut() {
            playback.base_ms = target;
            playback.started = Instant::now();
        }
        info!(position_ms = target, "Headless seek");
        Ok(())
    }

    fn current_position_ms(&self) -> i64 {
        let position = lock(&self.playback)
            .as_ref()
            .map(|p| p.base_ms + p.started.elapsed().as_millis() as u64);
        match position {
            Some(ms) => self.clamp(ms) as i64,
            None => 0,
        }
    }

    fn duration_ms(&self) -> i64 {
        let duration = *lock(&self.duration_ms);
        duration.map(|d| d as i64).unwrap_or(0)
    }

    fn is_playing(&self) -> bool {
        lock(&self.playback).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seekwell_core::QualityId;

    fn request(resume: u64) -> PlayableRequest {
        PlayableRequest {
            video_url: "https://cdn/v.m4s".into(),
            audio_url: None,
            resume_offset_ms: resume,
            quality: QualityId::HD,
            video_backup_urls: Vec::new(),
            audio_backup_urls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_position_starts_at_resume_offset() {
        let engine = HeadlessEngine::new();
        assert_eq!(engine.current_position_ms(), 0);
        assert!(!engine.is_playing());

        engine.prepare_and_play(&request(45_000)).await.unwrap();
        assert!(engine.is_playing());
        assert!(engine.current_position_ms() >= 45_000);
        assert_eq!(engine.current_request().unwrap().resume_offset_ms, 45_000);
    }

    #[tokio::test]
    async fn test_seek_is_clamped_to_duration() {
        let engine = HeadlessEngine::new();
        engine.set_duration(Some(60_000));
        engine.prepare_and_play(&request(0)).await.unwrap();

        engine.seek(90_000).await.unwrap();
        assert_eq!(engine.current_position_ms(), 60_000);
        assert_eq!(engine.duration_ms(), 60_000);
    }

    #[test]
    fn test_unknown_duration_reads_zero() {
        let engine = HeadlessEngine::default();
        assert_eq!(engine.duration_ms(), 0);
    }
}
