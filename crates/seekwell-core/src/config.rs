//! Core configuration
//!
//! Every section has defaults, so an empty or partial TOML file is valid.

use crate::cooldown::CooldownConfig;
use crate::descriptor_cache::DescriptorCacheConfig;
use crate::quality::AccountTier;
use crate::types::QualityId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub playback: PlaybackConfig,
    pub positions: PositionConfig,
    pub cooldown: CooldownConfig,
    pub descriptor_cache: DescriptorCacheConfig,
    pub provider: ProviderConfig,
}

/// Quality selection preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Ask for the best quality the account tier allows
    pub auto_highest_quality: bool,
    /// Preferred quality when not auto-selecting
    pub preferred_quality: Option<QualityId>,
    pub account_tier: AccountTier,
}

/// Position store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Snapshot file location
    pub path: PathBuf,
    /// Maximum number of videos remembered
    pub capacity: usize,
    /// Delay between a write and its flush, so bursts coalesce
    pub flush_debounce_ms: u64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/positions.json"),
            capacity: 500,
            flush_debounce_ms: 1_000,
        }
    }
}

impl PositionConfig {
    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }
}

/// HTTP descriptor provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the descriptor endpoint
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/".to_string(),
            request_timeout_ms: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Exponential backoff for transient fetch failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let scaled = self.initial_delay_ms as f64 * self.multiplier.powi(retry as i32);
        let capped = scaled.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl CoreConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.positions.capacity == 0 {
            return Err(Error::InvalidConfig("positions.capacity must be > 0".into()));
        }
        if self.provider.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "provider.retry.max_attempts must be >= 1".into(),
            ));
        }
        if self.provider.retry.multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "provider.retry.multiplier must be >= 1.0".into(),
            ));
        }
        Url::parse(&self.provider.base_url)?;
        Ok(())
    }
}
