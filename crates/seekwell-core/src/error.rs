//! Error types for Seekwell Core

use crate::types::{QualityId, StreamKind};
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure error types
#[derive(Error, Debug)]
pub enum Error {
    // Assembly errors
    #[error("No playable URL for {kind} stream at quality {quality}")]
    NoPlayableUrl { kind: StreamKind, quality: QualityId },

    // Rendering engine errors
    #[error("Rendering engine error: {0}")]
    Engine(String),

    #[error("No video loaded")]
    NotLoaded,

    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Persistence errors
    #[error("Position store error: {0}")]
    Storage(String),

    #[error("Unsupported position snapshot version: {0}")]
    SnapshotVersion(u32),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a rendering engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Error::Engine(msg.into())
    }

    /// Returns the error code for logs and diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoPlayableUrl { .. } => "NO_PLAYABLE_URL",
            Error::Engine(_) => "ENGINE",
            Error::NotLoaded => "NOT_LOADED",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::Storage(_) => "STORAGE",
            Error::SnapshotVersion(_) => "SNAPSHOT_VERSION",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ConfigParse(_) => "CONFIG_PARSE",
            Error::Network(_) => "NETWORK",
            Error::Url(_) => "URL",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}

/// Classified failure of a descriptor fetch.
///
/// Produced by [`DescriptorProvider`](crate::provider::DescriptorProvider)
/// implementations; transport details never leak past this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transient network failure: {0}")]
    Transient(String),

    #[error("Video or quality not found: {0}")]
    NotFound(String),

    #[error("Region or entitlement restriction: {0}")]
    RegionRestricted(String),

    #[error("Rate limited by server")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Malformed descriptor response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Returns true if the same request may succeed when repeated as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Terminal result of a failed `load`, classified for the presentation layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Region restricted: {0}")]
    RegionRestricted(String),

    #[error("Rate limited (retry after {retry_after_ms:?} ms, global: {global})")]
    RateLimited {
        retry_after_ms: Option<u64>,
        global: bool,
    },

    #[error("No playable stream in descriptor response")]
    NoPlayableStream,

    #[error("Playback failed to start: {0}")]
    Playback(String),

    #[error("Superseded by a newer request")]
    Superseded,
}

impl LoadError {
    /// Returns true if a plain retry is worth offering
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoadError::Network(_) | LoadError::NoPlayableStream | LoadError::Playback(_)
        )
    }

    /// Returns true if only a forced retry can get past this error
    pub fn requires_force(&self) -> bool {
        matches!(self, LoadError::RateLimited { .. })
    }

    /// Returns the error code for logs and diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            LoadError::Network(_) => "NETWORK",
            LoadError::NotFound(_) => "NOT_FOUND",
            LoadError::RegionRestricted(_) => "REGION_RESTRICTED",
            LoadError::RateLimited { global: true, .. } => "GLOBAL_COOLDOWN",
            LoadError::RateLimited { .. } => "RATE_LIMITED",
            LoadError::NoPlayableStream => "PLAY_URL_EMPTY",
            LoadError::Playback(_) => "PLAYBACK",
            LoadError::Superseded => "SUPERSEDED",
        }
    }
}

impl From<FetchError> for LoadError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transient(msg) => LoadError::Network(msg),
            FetchError::NotFound(msg) => LoadError::NotFound(msg),
            FetchError::RegionRestricted(msg) => LoadError::RegionRestricted(msg),
            FetchError::RateLimited { retry_after_ms } => LoadError::RateLimited {
                retry_after_ms,
                global: false,
            },
            FetchError::Malformed(_) => LoadError::NoPlayableStream,
        }
    }
}

impl From<Error> for LoadError {
    fn from(err: Error) -> Self {
        LoadError::Playback(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_mapping() {
        assert_eq!(
            LoadError::from(FetchError::Transient("timeout".into())),
            LoadError::Network("timeout".into())
        );
        assert_eq!(
            LoadError::from(FetchError::RateLimited { retry_after_ms: Some(1000) }),
            LoadError::RateLimited { retry_after_ms: Some(1000), global: false }
        );
        assert_eq!(
            LoadError::from(FetchError::Malformed("no data".into())),
            LoadError::NoPlayableStream
        );
    }

    #[test]
    fn test_retryability() {
        assert!(LoadError::Network("reset".into()).is_retryable());
        assert!(LoadError::NoPlayableStream.is_retryable());
        assert!(!LoadError::NotFound("bv1".into()).is_retryable());
        assert!(!LoadError::RegionRestricted("bv1".into()).is_retryable());

        let limited = LoadError::RateLimited { retry_after_ms: None, global: true };
        assert!(!limited.is_retryable());
        assert!(limited.requires_force());
        assert_eq!(limited.error_code(), "GLOBAL_COOLDOWN");
    }

    #[test]
    fn test_only_transient_fetch_errors_retry() {
        assert!(FetchError::Transient("503".into()).is_retryable());
        assert!(!FetchError::RateLimited { retry_after_ms: None }.is_retryable());
        assert!(!FetchError::NotFound("gone".into()).is_retryable());
    }
}
