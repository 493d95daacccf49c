//! Playback Orchestrator - the façade the presentation layer talks to
//!
//! Coordinates:
//! - Descriptor fetches, recent-descriptor reuse and cooldown checks
//! - Resume offsets from the position store
//! - Quality switches (cache first, re-fetch on miss)
//! - State machine transitions
//!
//! Every load and switch takes a request token under the session lock before
//! its first await. A load takes it while entering `Loading`; a switch takes
//! it while observing `Playing`, so only a newer load or switch can outrank
//! either. A result whose token is no longer the newest is discarded without
//! touching state or the engine. Leaving a video only cancels work for that
//! video.

use crate::{
    assembler::SourceAssembler,
    catalog::QualityCatalog,
    config::CoreConfig,
    cooldown::{CooldownStatus, CooldownTracker},
    descriptor_cache::DescriptorCache,
    engine::RenderingEngine,
    error::{Error, LoadError},
    position::PositionStore,
    provider::DescriptorProvider,
    quality::initial_quality,
    resolver::{QualityResolver, ResolvedStreams},
    types::*,
    Result,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Per-call load options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Skip cooldown checks (user-initiated retry)
    pub force: bool,
    /// Overrides the configured preference and auto-highest selection
    pub preferred_quality: Option<QualityId>,
}

impl LoadOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }
}

/// Successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub video_id: VideoId,
    pub metadata: VideoMetadata,
    /// Offset playback started at (0 = from the beginning)
    pub resume_offset_ms: PlaybackOffset,
    /// Quality asked for
    pub requested_quality: QualityId,
    /// Quality actually playing
    pub quality: QualityId,
    pub was_fallback: bool,
    /// Descriptors came from the recent-descriptor cache, not the network
    pub from_cache: bool,
    pub request: PlayableRequest,
    pub options: Vec<QualityOption>,
}

/// Result of a quality switch. Only `Switched` changed playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched {
        quality: QualityId,
        was_fallback: bool,
        label: String,
        request: PlayableRequest,
    },
    /// Already playing the requested quality
    AlreadyCurrent,
    /// The re-fetch had no usable video stream
    Unavailable,
    Failed(LoadError),
    /// A newer load or switch took over
    Superseded,
    NotPlaying,
}

impl SwitchOutcome {
    pub fn is_switched(&self) -> bool {
        matches!(self, SwitchOutcome::Switched { .. })
    }
}

struct Current {
    video_id: VideoId,
    catalog: QualityCatalog,
    request: PlayableRequest,
}

struct Session {
    state: PlaybackState,
    current: Option<Current>,
    /// Video of the load that owns the newest token, until it settles
    pending: Option<VideoId>,
}

impl Session {
    /// Whether `video_id` is what this session is loading or showing
    fn is_owned_by(&self, video_id: &VideoId) -> bool {
        match &self.pending {
            Some(pending) => pending == video_id,
            None => self
                .current
                .as_ref()
                .map_or(true, |c| &c.video_id == video_id),
        }
    }
}

/// Playback orchestrator for one presentation surface
pub struct PlaybackOrchestrator {
    /// Session ID for log correlation
    id: SessionId,
    config: CoreConfig,
    provider: Arc<dyn DescriptorProvider>,
    engine: Arc<dyn RenderingEngine>,
    assembler: SourceAssembler,
    resolver: QualityResolver,
    positions: PositionStore,
    cooldown: Mutex<CooldownTracker>,
    descriptors: Mutex<DescriptorCache>,
    session: RwLock<Session>,
    /// State change broadcaster
    state_tx: watch::Sender<PlaybackState>,
    /// Newest request token
    token: AtomicU64,
}

impl PlaybackOrchestrator {
    pub fn new(
        provider: Arc<dyn DescriptorProvider>,
        engine: Arc<dyn RenderingEngine>,
        positions: PositionStore,
        config: CoreConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);

        Self {
            id: SessionId::new(),
            cooldown: Mutex::new(CooldownTracker::new(config.cooldown.clone())),
            descriptors: Mutex::new(DescriptorCache::new(config.descriptor_cache.clone())),
            config,
            provider,
            assembler: SourceAssembler::new(engine.clone()),
            engine,
            resolver: QualityResolver::new(),
            positions,
            session: RwLock::new(Session {
                state: PlaybackState::Idle,
                current: None,
                pending: None,
            }),
            state_tx,
            token: AtomicU64::new(0),
        }
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    /// Get current state
    pub async fn state(&self) -> PlaybackState {
        self.session.read().await.state
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub async fn current_video(&self) -> Option<VideoId> {
        self.session.read().await.current.as_ref().map(|c| c.video_id.clone())
    }

    pub async fn current_request(&self) -> Option<PlayableRequest> {
        self.session.read().await.current.as_ref().map(|c| c.request.clone())
    }

    pub async fn current_quality(&self) -> Option<QualityId> {
        self.session.read().await.current.as_ref().map(|c| c.request.quality)
    }

    pub async fn current_metadata(&self) -> Option<VideoMetadata> {
        self.session
            .read()
            .await
            .current
            .as_ref()
            .map(|c| c.catalog.metadata().clone())
    }

    /// Selectable qualities for the current video, highest first
    pub async fn quality_options(&self) -> Vec<QualityOption> {
        self.session
            .read()
            .await
            .current
            .as_ref()
            .map(|c| c.catalog.options())
            .unwrap_or_default()
    }

    /// Cooldown status for a video, without loading it
    pub async fn cooldown_status(&self, video_id: &VideoId) -> CooldownStatus {
        self.cooldown.lock().await.status(video_id)
    }

    fn next_token(&self) -> u64 {
        self.token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_stale(&self, token: u64) -> bool {
        self.token.load(Ordering::SeqCst) != token
    }

    /// Transition to new state
    fn set_state(&self, session: &mut Session, new_state: PlaybackState) -> Result<()> {
        let current = session.state;
        if current == new_state && new_state != PlaybackState::Loading {
            return Ok(());
        }
        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }

        session.state = new_state;
        self.state_tx.send_replace(new_state);
        info!(from = %current, to = %new_state, session_id = %self.id, "State transition");
        Ok(())
    }

    /// Load with default options
    pub async fn load(&self, video_id: &VideoId) -> std::result::Result<LoadResult, LoadError> {
        self.load_with(video_id, LoadOptions::default()).await
    }

    /// Load a video: fetch descriptors (or reuse recent ones), read the
    /// resume offset, replace the catalog and start playback.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn load_with(
        &self,
        video_id: &VideoId,
        options: LoadOptions,
    ) -> std::result::Result<LoadResult, LoadError> {
        let token = {
            let mut session = self.session.write().await;
            self.set_state(&mut session, PlaybackState::Loading)?;
            session.pending = Some(video_id.clone());
            self.next_token()
        };
        info!(video_id = %video_id, token, force = options.force, "Loading video");

        // The outgoing video stays current until this load settles
        self.save_current_position().await;

        if let Some(err) = self.check_cooldown(video_id, options.force).await {
            return self.fail_load(token, err).await;
        }

        let resume_offset_ms = self.positions.get(video_id).await;

        let playback = &self.config.playback;
        let requested = match options.preferred_quality {
            Some(q) => q,
            None => initial_quality(
                playback.preferred_quality,
                playback.account_tier,
                playback.auto_highest_quality,
            ),
        };

        let (response, from_cache) = match self.recent_descriptors(video_id, options).await {
            Some(response) => (response, true),
            None => {
                let fetched = self.provider.fetch_descriptors(video_id, Some(requested)).await;
                if self.is_stale(token) {
                    debug!(video_id = %video_id, token, "Discarding superseded load result");
                    return Err(LoadError::Superseded);
                }
                match fetched {
                    Ok(response) => (response, false),
                    Err(err) => {
                        self.cooldown
                            .lock()
                            .await
                            .record_failure(video_id, &err.to_string());
                        return self.fail_load(token, err.into()).await;
                    }
                }
            }
        };

        let catalog = QualityCatalog::from_response(video_id.clone(), response.clone());
        let streams = if from_cache {
            self.resolver
                .resolve_cached(&catalog, requested)
                .or_else(|| self.resolver.normalize_fetch(requested, &response))
        } else {
            self.resolver.normalize_fetch(requested, &response)
        };
        let Some(streams) = streams else {
            self.descriptors.lock().await.invalidate(video_id);
            self.cooldown
                .lock()
                .await
                .record_failure(video_id, "no playable stream");
            return self.fail_load(token, LoadError::NoPlayableStream).await;
        };
        if !from_cache {
            self.descriptors.lock().await.put(video_id, response);
        }

        let mut session = self.session.write().await;
        if self.is_stale(token) {
            debug!(video_id = %video_id, token, "Discarding superseded load result");
            return Err(LoadError::Superseded);
        }
        session.pending = None;

        let request = match self.assembler.start(&streams, resume_offset_ms as i64).await {
            Ok(request) => request,
            Err(err) => {
                warn!(
                    video_id = %video_id,
                    error = %err,
                    code = err.error_code(),
                    "Engine rejected request"
                );
                session.current = None;
                if let Err(e) = self.set_state(&mut session, PlaybackState::Failed) {
                    warn!(error = %e, "Failed to record load failure");
                }
                drop(session);
                self.descriptors.lock().await.invalidate(video_id);
                return Err(err.into());
            }
        };

        let result = LoadResult {
            video_id: video_id.clone(),
            metadata: catalog.metadata().clone(),
            resume_offset_ms,
            requested_quality: requested,
            quality: streams.quality,
            was_fallback: streams.was_fallback,
            from_cache,
            request: request.clone(),
            options: catalog.options(),
        };

        session.current = Some(Current {
            video_id: video_id.clone(),
            catalog,
            request,
        });
        self.set_state(&mut session, PlaybackState::Playing)?;
        drop(session);

        self.cooldown.lock().await.record_success(video_id);

        info!(
            video_id = %video_id,
            quality = %result.quality,
            was_fallback = result.was_fallback,
            from_cache = result.from_cache,
            resume_offset_ms,
            "Video loaded"
        );
        Ok(result)
    }

    /// Recently fetched descriptors for `video_id`, unless this load must
    /// go to the network
    async fn recent_descriptors(
        &self,
        video_id: &VideoId,
        options: LoadOptions,
    ) -> Option<DescriptorResponse> {
        if options.force || self.config.playback.auto_highest_quality {
            return None;
        }
        self.descriptors.lock().await.get(video_id)
    }

    async fn check_cooldown(&self, video_id: &VideoId, force: bool) -> Option<LoadError> {
        let mut cooldown = self.cooldown.lock().await;
        if force {
            cooldown.clear_video(video_id);
            return None;
        }

        match cooldown.status(video_id) {
            CooldownStatus::Ready => None,
            CooldownStatus::Video { remaining } => {
                let remaining_ms = remaining.as_millis() as u64;
                info!(video_id = %video_id, remaining_ms, "Video is cooling down");
                Some(LoadError::RateLimited {
                    retry_after_ms: Some(remaining_ms),
                    global: false,
                })
            }
            CooldownStatus::Global { remaining, .. } => {
                let remaining_ms = remaining.as_millis() as u64;
                info!(remaining_ms, "Global cooldown blocks load");
                Some(LoadError::RateLimited {
                    retry_after_ms: Some(remaining_ms),
                    global: true,
                })
            }
        }
    }

    async fn fail_load(
        &self,
        token: u64,
        err: LoadError,
    ) -> std::result::Result<LoadResult, LoadError> {
        let mut session = self.session.write().await;
        if self.is_stale(token) {
            return Err(LoadError::Superseded);
        }

        warn!(
            error = %err,
            code = err.error_code(),
            retryable = err.is_retryable(),
            "Load failed"
        );
        session.pending = None;
        session.current = None;
        if let Err(e) = self.set_state(&mut session, PlaybackState::Failed) {
            warn!(error = %e, "Failed to record load failure");
        }
        Err(err)
    }

    /// Switch the current video to `target` quality.
    ///
    /// The live position is captured before anything else so the new
    /// request resumes where the old one was. Any outcome other than
    /// `Switched` leaves playback untouched.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn switch_quality(&self, target: QualityId) -> SwitchOutcome {
        let position_ms = self.engine.current_position_ms();

        // Token taken under the same lock that saw `Playing`, so a load
        // that has already started always outranks this switch
        let (video_id, cached, token) = {
            let session = self.session.read().await;
            if session.state != PlaybackState::Playing {
                return SwitchOutcome::NotPlaying;
            }
            let Some(current) = session.current.as_ref() else {
                return SwitchOutcome::NotPlaying;
            };
            if current.request.quality == target {
                return SwitchOutcome::AlreadyCurrent;
            }
            (
                current.video_id.clone(),
                self.resolver.resolve_cached(&current.catalog, target),
                self.next_token(),
            )
        };

        info!(video_id = %video_id, target = %target, position_ms, token, "Switching quality");

        if let Some(streams) = cached {
            return self.apply_switch(token, streams, None, position_ms).await;
        }

        let fetched = self.provider.fetch_descriptors(&video_id, Some(target)).await;
        if self.is_stale(token) {
            debug!(token, "Discarding superseded switch result");
            return SwitchOutcome::Superseded;
        }

        let response = match fetched {
            Ok(response) => response,
            Err(err) => {
                warn!(target = %target, error = %err, "Quality re-fetch failed");
                return SwitchOutcome::Failed(err.into());
            }
        };

        let Some(streams) = self.resolver.normalize_fetch(target, &response) else {
            return SwitchOutcome::Unavailable;
        };
        self.descriptors.lock().await.put(&video_id, response.clone());
        let catalog = QualityCatalog::from_response(video_id, response);
        self.apply_switch(token, streams, Some(catalog), position_ms).await
    }

    async fn apply_switch(
        &self,
        token: u64,
        streams: ResolvedStreams,
        catalog: Option<QualityCatalog>,
        position_ms: i64,
    ) -> SwitchOutcome {
        let mut session = self.session.write().await;
        if self.is_stale(token) {
            debug!(token, "Discarding superseded switch result");
            return SwitchOutcome::Superseded;
        }
        let Some(current) = session.current.as_mut() else {
            return SwitchOutcome::NotPlaying;
        };

        let request = match self.assembler.start(&streams, position_ms).await {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "Engine rejected switch");
                return SwitchOutcome::Failed(err.into());
            }
        };

        if let Some(catalog) = catalog {
            current.catalog = catalog;
        }
        current.request = request.clone();
        let label = current.catalog.label(streams.quality);

        info!(
            quality = %streams.quality,
            requested = %streams.requested,
            was_fallback = streams.was_fallback,
            "Quality switched"
        );
        SwitchOutcome::Switched {
            quality: streams.quality,
            was_fallback: streams.was_fallback,
            label,
            request,
        }
    }

    /// Seek the current video, clamped to the duration when known
    #[instrument(skip(self))]
    pub async fn seek(&self, position_ms: u64) -> Result<PlaybackOffset> {
        if self.session.read().await.current.is_none() {
            return Err(Error::NotLoaded);
        }

        let duration = self.engine.duration_ms();
        let target = if duration > 0 {
            position_ms.min(duration as u64)
        } else {
            position_ms
        };
        self.engine.seek(target).await?;
        debug!(target, "Seeked");
        Ok(target)
    }

    /// Record the engine position for `video_id` if it is the current video
    pub async fn save_position(&self, video_id: &VideoId) -> bool {
        let is_current = self
            .session
            .read()
            .await
            .current
            .as_ref()
            .is_some_and(|c| &c.video_id == video_id);
        if !is_current {
            debug!(video_id = %video_id, "Not the current video, position not saved");
            return false;
        }

        self.positions
            .put(
                video_id,
                self.engine.current_position_ms(),
                self.engine.duration_ms(),
            )
            .await
    }

    async fn save_current_position(&self) -> bool {
        match self.current_video().await {
            Some(video_id) => self.save_position(&video_id).await,
            None => false,
        }
    }

    /// Periodic save while playing
    pub async fn report_position_tick(&self) -> bool {
        if self.state().await != PlaybackState::Playing {
            return false;
        }
        self.save_current_position().await
    }

    /// The presentation surface for `video_id` is going away: save its
    /// position, cancel its in-flight load and return to idle.
    ///
    /// Leaving a video that a newer load has already displaced is a no-op,
    /// so a page torn down after the next one started cannot cancel it.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn on_leave(&self, video_id: &VideoId) {
        let (owned, is_current) = {
            let session = self.session.read().await;
            (
                session.is_owned_by(video_id),
                session.current.as_ref().is_some_and(|c| &c.video_id == video_id),
            )
        };
        if !owned {
            debug!(video_id = %video_id, "Leaving a video that is no longer current, ignored");
            return;
        }
        if is_current {
            self.save_position(video_id).await;
        }

        {
            let mut session = self.session.write().await;
            if !session.is_owned_by(video_id) {
                debug!(video_id = %video_id, "A newer load took over, leave ignored");
                return;
            }
            self.next_token();
            session.pending = None;
            session.current = None;
            if let Err(e) = self.set_state(&mut session, PlaybackState::Idle) {
                warn!(error = %e, "Failed to return to idle");
            }
        }
        self.positions.flush().await;
        info!(video_id = %video_id, "Left video");
    }

    /// Persist positions and stop background work
    pub async fn shutdown(&self) {
        self.save_current_position().await;
        self.positions.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_options() {
        let options = LoadOptions::forced();
        assert!(options.force);
        assert_eq!(options.preferred_quality, None);
        assert!(!LoadOptions::default().force);
    }

    #[test]
    fn test_switch_outcome() {
        assert!(!SwitchOutcome::Unavailable.is_switched());
        assert!(!SwitchOutcome::Failed(LoadError::NoPlayableStream).is_switched());
    }
}
