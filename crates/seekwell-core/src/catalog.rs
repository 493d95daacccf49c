//! Quality catalog for the currently loaded video

use crate::quality::{quality_label, STANDARD_LOW_QUALITIES};
use crate::types::*;
use std::collections::{BTreeMap, BTreeSet};

/// All descriptors known for one video, plus entitlement and labels.
///
/// Built wholesale from a single [`DescriptorResponse`]; there is no way to
/// patch one in place. Descriptor URLs are short-lived, so a newer fetch
/// always replaces the whole catalog.
#[derive(Debug, Clone)]
pub struct QualityCatalog {
    video_id: VideoId,
    metadata: VideoMetadata,
    descriptors: Vec<StreamDescriptor>,
    granted_quality: Option<QualityId>,
    entitled: BTreeSet<QualityId>,
    labels: BTreeMap<QualityId, String>,
    qualities: Vec<QualityId>,
}

impl QualityCatalog {
    /// Build a catalog from a fetch response
    pub fn from_response(video_id: VideoId, response: DescriptorResponse) -> Self {
        let entitled: BTreeSet<QualityId> = response.entitled_qualities.iter().copied().collect();

        let labels: BTreeMap<QualityId, String> = response
            .entitled_qualities
            .iter()
            .zip(response.quality_labels.iter())
            .filter(|(_, label)| !label.is_empty())
            .map(|(q, label)| (*q, label.clone()))
            .collect();

        let mut merged: BTreeSet<QualityId> = entitled.clone();
        merged.extend(response.video_descriptors().map(|d| d.quality));
        merged.extend(STANDARD_LOW_QUALITIES);
        let qualities: Vec<QualityId> = merged.into_iter().rev().collect();

        Self {
            video_id,
            metadata: response.metadata,
            descriptors: response.descriptors,
            granted_quality: response.granted_quality,
            entitled,
            labels,
            qualities,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn descriptors(&self) -> &[StreamDescriptor] {
        &self.descriptors
    }

    pub fn granted_quality(&self) -> Option<QualityId> {
        self.granted_quality
    }

    pub fn video_descriptors(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.descriptors.iter().filter(|d| d.is_video())
    }

    pub fn audio_descriptors(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.descriptors.iter().filter(|d| d.is_audio())
    }

    /// First usable video descriptor with exactly this quality
    pub fn find_video(&self, quality: QualityId) -> Option<&StreamDescriptor> {
        self.video_descriptors()
            .find(|d| d.quality == quality && d.is_usable())
    }

    /// Audio to pair with any video: the first audio descriptor
    pub fn first_audio(&self) -> Option<&StreamDescriptor> {
        self.audio_descriptors().next()
    }

    /// Qualities present among video descriptors, highest first
    pub fn cached_qualities(&self) -> Vec<QualityId> {
        let set: BTreeSet<QualityId> = self.video_descriptors().map(|d| d.quality).collect();
        set.into_iter().rev().collect()
    }

    /// Every selectable quality, highest first
    pub fn qualities(&self) -> &[QualityId] {
        &self.qualities
    }

    pub fn is_entitled(&self, quality: QualityId) -> bool {
        self.entitled.contains(&quality)
    }

    /// Server label if one was supplied, else the standard label
    pub fn label(&self, quality: QualityId) -> String {
        self.labels
            .get(&quality)
            .cloned()
            .unwrap_or_else(|| quality_label(quality))
    }

    /// Read-only projection for display
    pub fn options(&self) -> Vec<QualityOption> {
        self.qualities
            .iter()
            .map(|q| QualityOption {
                id: *q,
                label: self.label(*q),
                entitled: self.is_entitled(*q),
                cached: self.find_video(*q).is_some(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> DescriptorResponse {
        DescriptorResponse {
            metadata: VideoMetadata {
                title: "Demo".into(),
                duration_ms: Some(600_000),
                part: None,
            },
            descriptors: vec![
                StreamDescriptor::video(QualityId::FHD, "https://cdn/80.m4s"),
                StreamDescriptor::video(QualityId::HD, "https://cdn/64.m4s"),
                StreamDescriptor::video(QualityId(74), ""),
                StreamDescriptor::audio(QualityId(30280), "https://cdn/a1.m4s"),
                StreamDescriptor::audio(QualityId(30216), "https://cdn/a2.m4s"),
            ],
            granted_quality: Some(QualityId::FHD),
            entitled_qualities: vec![QualityId::UHD_4K, QualityId::FHD, QualityId::HD],
            quality_labels: vec!["4K Ultra".into(), "".into(), "720P HD".into()],
        }
    }

    #[test]
    fn test_merged_quality_list() {
        let catalog = QualityCatalog::from_response("bv1".into(), response());
        assert_eq!(
            catalog.qualities(),
            &[
                QualityId::UHD_4K,
                QualityId::FHD,
                QualityId(74),
                QualityId::HD,
                QualityId::SD,
                QualityId::LD
            ]
        );
        assert_eq!(
            catalog.cached_qualities(),
            vec![QualityId::FHD, QualityId(74), QualityId::HD]
        );
    }

    #[test]
    fn test_labels_prefer_server() {
        let catalog = QualityCatalog::from_response("bv1".into(), response());
        assert_eq!(catalog.label(QualityId::UHD_4K), "4K Ultra");
        // Empty server label falls back to the standard one
        assert_eq!(catalog.label(QualityId::FHD), "1080P");
        assert_eq!(catalog.label(QualityId::SD), "480P");
    }

    #[test]
    fn test_find_video_ignores_unusable() {
        let catalog = QualityCatalog::from_response("bv1".into(), response());
        assert!(catalog.find_video(QualityId::FHD).is_some());
        assert!(catalog.find_video(QualityId(74)).is_none());
        assert!(catalog.find_video(QualityId::UHD_4K).is_none());
        assert_eq!(catalog.first_audio().unwrap().url, "https://cdn/a1.m4s");
    }

    #[test]
    fn test_options_projection() {
        let catalog = QualityCatalog::from_response("bv1".into(), response());
        let options = catalog.options();
        let uhd = options.iter().find(|o| o.id == QualityId::UHD_4K).unwrap();
        assert!(uhd.entitled);
        assert!(!uhd.cached);

        let sd = options.iter().find(|o| o.id == QualityId::SD).unwrap();
        assert!(!sd.entitled);
        assert_eq!(sd.label, "480P");
    }
}
