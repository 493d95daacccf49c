//! Seekwell Core - adaptive playback core
//!
//! This crate provides what sits between a video page and a rendering engine:
//! - Durable resume offsets per video
//! - Quality resolution against a cached descriptor catalog
//! - Assembly of playable requests from video and audio streams
//! - A playback orchestrator with supersession of stale requests
//! - Failure cooldowns, a short-lived descriptor cache and an HTTP
//!   descriptor provider
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Seekwell Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │  Descriptor  │  │   Quality    │  │   Cooldown   │           │
//! │  │   Provider   │  │   Resolver   │  │   Tracker    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │ Orchestrator│                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │   Position   │  │   Source    │  │  Rendering   │            │
//! │  │    Store     │  │  Assembler  ├──►    Engine    │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod quality;
pub mod catalog;
pub mod resolver;
pub mod cooldown;
pub mod descriptor_cache;
pub mod position;
pub mod engine;
pub mod assembler;
pub mod provider;
pub mod orchestrator;

pub use error::{Error, FetchError, LoadError, Result};
pub use types::*;
pub use config::{CoreConfig, PlaybackConfig, PositionConfig, ProviderConfig, RetryPolicy};
pub use quality::{AccountTier, QualityPermission};
pub use catalog::QualityCatalog;
pub use resolver::{QualityResolver, ResolvedStreams};
pub use cooldown::{CooldownConfig, CooldownStatus, CooldownTracker};
pub use descriptor_cache::{DescriptorCache, DescriptorCacheConfig};
pub use position::{JsonFileBackend, MemoryBackend, PositionBackend, PositionEntry, PositionStore};
pub use engine::RenderingEngine;
pub use assembler::SourceAssembler;
pub use provider::{DescriptorProvider, HttpDescriptorProvider};
pub use orchestrator::{LoadOptions, LoadResult, PlaybackOrchestrator, SwitchOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Seekwell Core initialized");
}
