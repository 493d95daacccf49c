//! Rendering engine seam

use crate::types::PlayableRequest;
use crate::Result;
use async_trait::async_trait;

/// The component that actually decodes and renders media.
///
/// Position and duration readings are raw: they may be negative or zero
/// while the engine does not know them yet.
#[async_trait]
pub trait RenderingEngine: Send + Sync {
    /// Replace the current media with `request` and start playing it
    async fn prepare_and_play(&self, request: &PlayableRequest) -> Result<()>;

    /// Seek within the current media
    async fn seek(&self, position_ms: u64) -> Result<()>;

    /// Current playback position in milliseconds
    fn current_position_ms(&self) -> i64;

    /// Media duration in milliseconds
    fn duration_ms(&self) -> i64;

    fn is_playing(&self) -> bool;
}
