//! Source assembly
//!
//! Turns resolved streams plus a resume offset into a [`PlayableRequest`] and
//! hands it to the rendering engine. With an audio stream the two play as one
//! merged timeline; without one the video stream is self-contained.

use crate::engine::RenderingEngine;
use crate::resolver::ResolvedStreams;
use crate::types::*;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The only component that issues "prepare and play"
#[derive(Clone)]
pub struct SourceAssembler {
    engine: Arc<dyn RenderingEngine>,
}

impl SourceAssembler {
    pub fn new(engine: Arc<dyn RenderingEngine>) -> Self {
        Self { engine }
    }

    /// Build the request without touching the engine
    pub fn assemble(
        &self,
        streams: &ResolvedStreams,
        resume_offset_ms: i64,
    ) -> Result<PlayableRequest> {
        let video_url = streams
            .video
            .effective_url()
            .ok_or(Error::NoPlayableUrl {
                kind: StreamKind::Video,
                quality: streams.video.quality,
            })?
            .to_string();

        let audio = streams.audio.as_ref().and_then(|audio| match audio.effective_url() {
            Some(url) => Some((url.to_string(), audio.fallback_urls())),
            None => {
                warn!(quality = %audio.quality, "Audio stream has no URL, playing video alone");
                None
            }
        });
        let (audio_url, audio_backup_urls) = match audio {
            Some((url, backups)) => (Some(url), backups),
            None => (None, Vec::new()),
        };

        Ok(PlayableRequest {
            video_url,
            audio_url,
            resume_offset_ms: clamp_offset(resume_offset_ms),
            quality: streams.quality,
            video_backup_urls: streams.video.fallback_urls(),
            audio_backup_urls,
        })
    }

    /// Assemble and start playback; engine errors propagate
    #[instrument(skip(self, streams), fields(quality = %streams.quality))]
    pub async fn start(
        &self,
        streams: &ResolvedStreams,
        resume_offset_ms: i64,
    ) -> Result<PlayableRequest> {
        let request = self.assemble(streams, resume_offset_ms)?;
        debug!(
            video_url = %request.video_url,
            merged = request.is_merged(),
            backups = request.video_backup_urls.len(),
            "Prepared playable request"
        );

        self.engine.prepare_and_play(&request).await?;
        info!(resume_offset_ms = request.resume_offset_ms, "Playback started");
        Ok(request)
    }
}
