//! Core types for Seekwell

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an orchestrator session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, stable key for a video and its selected sub-part
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VideoId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Playback offset in milliseconds. Zero means "no resume point".
pub type PlaybackOffset = u64;

/// Clamp a raw engine reading (which may be negative while unknown) to an offset
pub fn clamp_offset(raw_ms: i64) -> PlaybackOffset {
    raw_ms.max(0) as PlaybackOffset
}

/// Stream quality identifier. Higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityId(pub u32);

impl QualityId {
    pub const UHD_8K: QualityId = QualityId(127);
    pub const DOLBY_VISION: QualityId = QualityId(126);
    pub const HDR: QualityId = QualityId(125);
    pub const UHD_4K: QualityId = QualityId(120);
    pub const FHD_60: QualityId = QualityId(116);
    pub const FHD_PLUS: QualityId = QualityId(112);
    pub const FHD: QualityId = QualityId(80);
    pub const HD_60: QualityId = QualityId(74);
    pub const HD: QualityId = QualityId(64);
    pub const SD: QualityId = QualityId(32);
    pub const LD: QualityId = QualityId(16);

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for QualityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for QualityId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Elementary stream kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// One candidate elementary stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Quality identifier
    pub quality: QualityId,
    /// Stream kind
    pub kind: StreamKind,
    /// Primary URL
    #[serde(default)]
    pub url: String,
    /// Equivalent backup URLs, tried in order after the primary
    #[serde(default)]
    pub backup_urls: Vec<String>,
    /// Bandwidth in bits per second
    #[serde(default)]
    pub bandwidth: Option<u64>,
    /// Codec string (e.g. "avc1.640032")
    #[serde(default)]
    pub codecs: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl StreamDescriptor {
    /// Create a descriptor with only a primary URL
    pub fn new(kind: StreamKind, quality: QualityId, url: impl Into<String>) -> Self {
        Self {
            quality,
            kind,
            url: url.into(),
            backup_urls: Vec::new(),
            bandwidth: None,
            codecs: None,
            width: None,
            height: None,
        }
    }

    /// Create a video descriptor
    pub fn video(quality: QualityId, url: impl Into<String>) -> Self {
        Self::new(StreamKind::Video, quality, url)
    }

    /// Create an audio descriptor
    pub fn audio(quality: QualityId, url: impl Into<String>) -> Self {
        Self::new(StreamKind::Audio, quality, url)
    }

    /// Attach backup URLs
    pub fn with_backups<I, S>(mut self, backups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backup_urls = backups.into_iter().map(Into::into).collect();
        self
    }

    /// The URL to hand over first: the primary, or the first non-empty backup
    pub fn effective_url(&self) -> Option<&str> {
        if !self.url.is_empty() {
            return Some(&self.url);
        }
        self.backup_urls
            .iter()
            .find(|u| !u.is_empty())
            .map(String::as_str)
    }

    /// Non-empty URLs after the effective one, in retry order
    pub fn fallback_urls(&self) -> Vec<String> {
        let mut urls = std::iter::once(&self.url)
            .chain(self.backup_urls.iter())
            .filter(|u| !u.is_empty());
        urls.next();
        urls.cloned().collect()
    }

    /// A descriptor is usable when it has at least one non-empty URL
    pub fn is_usable(&self) -> bool {
        self.effective_url().is_some()
    }

    pub fn is_video(&self) -> bool {
        self.kind == StreamKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == StreamKind::Audio
    }
}

/// Descriptive metadata returned alongside descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub title: String,
    /// Content duration in milliseconds, when the server reports it
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Selected sub-part label, if any
    #[serde(default)]
    pub part: Option<String>,
}

/// Structured result of a descriptor fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorResponse {
    #[serde(default)]
    pub metadata: VideoMetadata,
    #[serde(default)]
    pub descriptors: Vec<StreamDescriptor>,
    /// Quality the server actually granted for this request
    #[serde(default)]
    pub granted_quality: Option<QualityId>,
    /// Qualities the server is willing to serve to this user
    #[serde(default)]
    pub entitled_qualities: Vec<QualityId>,
    /// Labels parallel to `entitled_qualities`
    #[serde(default)]
    pub quality_labels: Vec<String>,
}

impl DescriptorResponse {
    pub fn video_descriptors(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.descriptors.iter().filter(|d| d.is_video())
    }

    pub fn audio_descriptors(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.descriptors.iter().filter(|d| d.is_audio())
    }
}

/// Instruction handed to the rendering engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableRequest {
    pub video_url: String,
    /// Separate audio stream sharing the video's clock
    pub audio_url: Option<String>,
    pub resume_offset_ms: PlaybackOffset,
    /// Quality of the selected video stream
    pub quality: QualityId,
    /// Backups for the caller to retry with on a playback failure
    pub video_backup_urls: Vec<String>,
    pub audio_backup_urls: Vec<String>,
}

impl PlayableRequest {
    /// True when video and audio are merged into one timeline
    pub fn is_merged(&self) -> bool {
        self.audio_url.is_some()
    }
}

/// Orchestrator state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing loaded
    Idle,
    /// Fetching descriptors for a load
    Loading,
    /// A request has been handed to the engine
    Playing,
    /// The last load failed
    Failed,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Loading) |
            // From Loading (a newer load may restart it)
            (Loading, Loading) | (Loading, Playing) | (Loading, Failed) | (Loading, Idle) |
            // From Playing
            (Playing, Loading) | (Playing, Idle) |
            // From Failed
            (Failed, Loading) | (Failed, Idle)
        )
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Failed => write!(f, "failed"),
        }
    }
}

/// Display projection of one selectable quality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOption {
    pub id: QualityId,
    pub label: String,
    /// Listed by the server as servable to this user
    pub entitled: bool,
    /// Present in the current catalog (switchable without a fetch)
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_url_prefers_primary() {
        let d = StreamDescriptor::video(QualityId::FHD, "https://cdn-a/v.m4s")
            .with_backups(["https://cdn-b/v.m4s"]);
        assert_eq!(d.effective_url(), Some("https://cdn-a/v.m4s"));
        assert_eq!(d.fallback_urls(), vec!["https://cdn-b/v.m4s".to_string()]);
    }

    #[test]
    fn test_effective_url_falls_back_to_backup() {
        let d = StreamDescriptor::video(QualityId::FHD, "")
            .with_backups(["", "https://cdn-b/v.m4s", "https://cdn-c/v.m4s"]);
        assert_eq!(d.effective_url(), Some("https://cdn-b/v.m4s"));
        assert_eq!(d.fallback_urls(), vec!["https://cdn-c/v.m4s".to_string()]);
        assert!(d.is_usable());

        let empty = StreamDescriptor::audio(QualityId(30280), "");
        assert!(!empty.is_usable());
        assert!(empty.fallback_urls().is_empty());
    }

    #[test]
    fn test_clamp_offset() {
        assert_eq!(clamp_offset(-9), 0);
        assert_eq!(clamp_offset(0), 0);
        assert_eq!(clamp_offset(45_000), 45_000);
    }

    #[test]
    fn test_state_transitions() {
        assert!(PlaybackState::Idle.can_transition_to(PlaybackState::Loading));
        assert!(PlaybackState::Loading.can_transition_to(PlaybackState::Playing));
        assert!(PlaybackState::Loading.can_transition_to(PlaybackState::Failed));
        assert!(PlaybackState::Playing.can_transition_to(PlaybackState::Loading));
        assert!(PlaybackState::Failed.can_transition_to(PlaybackState::Loading));

        assert!(!PlaybackState::Idle.can_transition_to(PlaybackState::Playing));
        assert!(!PlaybackState::Playing.can_transition_to(PlaybackState::Failed));
        assert!(!PlaybackState::Failed.can_transition_to(PlaybackState::Playing));
    }

    #[test]
    fn test_descriptor_response_deserializes_with_defaults() {
        let json = r#"{
            "descriptors": [
                {"quality": 80, "kind": "video", "url": "https://cdn/80.m4s"},
                {"quality": 30280, "kind": "audio", "url": "https://cdn/a.m4s",
                 "backup_urls": ["https://bk/a.m4s"]}
            ],
            "granted_quality": 80
        }"#;
        let resp: DescriptorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.granted_quality, Some(QualityId::FHD));
        assert_eq!(resp.video_descriptors().count(), 1);
        assert_eq!(resp.audio_descriptors().next().unwrap().backup_urls.len(), 1);
        assert!(resp.entitled_qualities.is_empty());
    }
}
