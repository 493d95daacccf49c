//! Descriptor providers

mod http;

pub use http::{classify_code, classify_status, HttpDescriptorProvider};

use crate::error::FetchError;
use crate::types::{DescriptorResponse, QualityId, VideoId};
use async_trait::async_trait;

/// Source of stream descriptors for a video
#[async_trait]
pub trait DescriptorProvider: Send + Sync {
    /// Fetch descriptors, optionally scoped to a target quality.
    ///
    /// The server may grant a different quality than the one asked for;
    /// the response reports what was granted.
    async fn fetch_descriptors(
        &self,
        video_id: &VideoId,
        target_quality: Option<QualityId>,
    ) -> std::result::Result<DescriptorResponse, FetchError>;
}
