//! Quality resolution
//!
//! Cache-first: an exact match in the current catalog is served without a
//! network call. Anything else is reported as unresolved, and the caller
//! re-fetches descriptors scoped to the target. Fetch results are then
//! normalized against the quality the server actually granted.

use crate::catalog::QualityCatalog;
use crate::types::*;
use tracing::{debug, instrument, warn};

/// A concrete (video, optional audio) pair for a requested quality
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStreams {
    pub video: StreamDescriptor,
    pub audio: Option<StreamDescriptor>,
    /// What the caller asked for
    pub requested: QualityId,
    /// What the selected video stream actually is
    pub quality: QualityId,
    /// The server substituted a different quality for the request
    pub was_fallback: bool,
}

/// Stateless resolver; the catalog is owned by the orchestrator
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityResolver;

impl QualityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Exact match against the cached catalog, or `None` for a cache miss.
    ///
    /// Never picks a neighbouring quality: stale entries are not guesses.
    #[instrument(skip(self, catalog), fields(video_id = %catalog.video_id()))]
    pub fn resolve_cached(
        &self,
        catalog: &QualityCatalog,
        target: QualityId,
    ) -> Option<ResolvedStreams> {
        let Some(video) = catalog.find_video(target) else {
            debug!(
                target = %target,
                available = ?catalog.cached_qualities(),
                "Cache miss"
            );
            return None;
        };

        debug!(target = %target, "Exact match in cache");
        Some(ResolvedStreams {
            video: video.clone(),
            audio: catalog.first_audio().cloned(),
            requested: target,
            quality: target,
            was_fallback: false,
        })
    }

    /// Pick streams from a fresh fetch response for `requested`.
    ///
    /// The video stream matching the server-granted quality wins. When no
    /// descriptor carries exactly that quality, the highest usable one below
    /// it is taken, then the lowest above it. Returns `None` when the
    /// response has no usable video stream at all.
    #[instrument(skip(self, response))]
    pub fn normalize_fetch(
        &self,
        requested: QualityId,
        response: &DescriptorResponse,
    ) -> Option<ResolvedStreams> {
        let granted = response.granted_quality.unwrap_or(requested);

        let usable: Vec<&StreamDescriptor> = response
            .video_descriptors()
            .filter(|d| d.is_usable())
            .collect();

        let video = usable
            .iter()
            .find(|d| d.quality == granted)
            .or_else(|| {
                usable
                    .iter()
                    .filter(|d| d.quality < granted)
                    .max_by_key(|d| d.quality)
            })
            .or_else(|| {
                usable
                    .iter()
                    .filter(|d| d.quality > granted)
                    .min_by_key(|d| d.quality)
            });

        let Some(video) = video else {
            warn!(
                requested = %requested,
                granted = %granted,
                descriptors = response.descriptors.len(),
                "Fetch returned no usable video stream"
            );
            return None;
        };

        let quality = video.quality;
        let was_fallback = quality != requested;
        if was_fallback {
            debug!(
                requested = %requested,
                granted = %granted,
                actual = %quality,
                "Server substituted quality"
            );
        }

        Some(ResolvedStreams {
            video: (*video).clone(),
            audio: response.audio_descriptors().next().cloned(),
            requested,
            quality,
            was_fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(qualities: &[u32]) -> QualityCatalog {
        let mut descriptors: Vec<StreamDescriptor> = qualities
            .iter()
            .map(|q| StreamDescriptor::video(QualityId(*q), format!("https://cdn/{}.m4s", q)))
            .collect();
        descriptors.push(StreamDescriptor::audio(QualityId(30280), "https://cdn/a1.m4s"));
        descriptors.push(StreamDescriptor::audio(QualityId(30232), "https://cdn/a2.m4s"));

        QualityCatalog::from_response(
            "bv1".into(),
            DescriptorResponse {
                descriptors,
                ..Default::default()
            },
        )
    }

    fn fetched(granted: Option<u32>, qualities: &[u32]) -> DescriptorResponse {
        DescriptorResponse {
            descriptors: qualities
                .iter()
                .map(|q| StreamDescriptor::video(QualityId(*q), format!("https://fresh/{}.m4s", q)))
                .chain(std::iter::once(StreamDescriptor::audio(
                    QualityId(30280),
                    "https://fresh/a.m4s",
                )))
                .collect(),
            granted_quality: granted.map(QualityId),
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_match_pairs_first_audio() {
        let resolver = QualityResolver::new();
        let catalog = catalog_with(&[120, 80, 64, 32]);

        let resolved = resolver.resolve_cached(&catalog, QualityId::FHD).unwrap();
        assert_eq!(resolved.video.url, "https://cdn/80.m4s");
        assert_eq!(resolved.audio.unwrap().url, "https://cdn/a1.m4s");
        assert!(!resolved.was_fallback);
    }

    #[test]
    fn test_cache_miss_does_not_guess() {
        let resolver = QualityResolver::new();
        let catalog = catalog_with(&[80, 64]);
        assert!(resolver.resolve_cached(&catalog, QualityId::UHD_4K).is_none());
        assert!(resolver.resolve_cached(&catalog, QualityId(74)).is_none());
    }

    #[test]
    fn test_normalize_uses_granted_quality() {
        let resolver = QualityResolver::new();
        let response = fetched(Some(80), &[80, 64, 32]);

        let resolved = resolver.normalize_fetch(QualityId::UHD_4K, &response).unwrap();
        assert_eq!(resolved.quality, QualityId::FHD);
        assert_eq!(resolved.video.quality, QualityId::FHD);
        assert_eq!(resolved.requested, QualityId::UHD_4K);
        assert!(resolved.was_fallback);
    }

    #[test]
    fn test_normalize_exact_grant_is_not_fallback() {
        let resolver = QualityResolver::new();
        let response = fetched(Some(120), &[120, 80]);

        let resolved = resolver.normalize_fetch(QualityId::UHD_4K, &response).unwrap();
        assert_eq!(resolved.video.url, "https://fresh/120.m4s");
        assert!(!resolved.was_fallback);
    }

    #[test]
    fn test_normalize_without_granted_field() {
        let resolver = QualityResolver::new();
        let response = fetched(None, &[80, 64]);
        let resolved = resolver.normalize_fetch(QualityId::HD, &response).unwrap();
        assert_eq!(resolved.quality, QualityId::HD);
        assert!(!resolved.was_fallback);
    }

    #[test]
    fn test_normalize_closest_when_granted_missing_from_list() {
        let resolver = QualityResolver::new();

        // Below the grant wins over above it
        let response = fetched(Some(80), &[116, 64, 32]);
        let resolved = resolver.normalize_fetch(QualityId::FHD, &response).unwrap();
        assert_eq!(resolved.quality, QualityId::HD);
        assert!(resolved.was_fallback);

        // Nothing below: lowest above
        let response = fetched(Some(16), &[64, 32]);
        let resolved = resolver.normalize_fetch(QualityId::LD, &response).unwrap();
        assert_eq!(resolved.quality, QualityId::SD);
    }

    #[test]
    fn test_normalize_no_usable_video() {
        let resolver = QualityResolver::new();
        let response = DescriptorResponse {
            descriptors: vec![
                StreamDescriptor::video(QualityId::FHD, ""),
                StreamDescriptor::audio(QualityId(30280), "https://fresh/a.m4s"),
            ],
            granted_quality: Some(QualityId::FHD),
            ..Default::default()
        };
        assert!(resolver.normalize_fetch(QualityId::FHD, &response).is_none());
    }
}
