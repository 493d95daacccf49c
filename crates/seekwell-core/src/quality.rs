//! Quality labels and account-tier policy
//!
//! Handles:
//! - Standard labels per quality identifier
//! - Login / premium requirements per quality
//! - Initial quality selection for a load

use crate::types::QualityId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Qualities that can always be requested, even when not entitled
pub const STANDARD_LOW_QUALITIES: [QualityId; 2] = [QualityId::SD, QualityId::LD];

/// Default target when nothing better is known
pub const DEFAULT_QUALITY: QualityId = QualityId::HD;

/// Standard human-readable label for a quality identifier
pub fn quality_label(quality: QualityId) -> String {
    let label = match quality.0 {
        127 => "8K",
        126 => "Dolby Vision",
        125 => "HDR",
        120 => "4K",
        116 => "1080P60",
        112 => "1080P+",
        80 => "1080P",
        74 => "720P60",
        64 => "720P",
        32 => "480P",
        16 => "360P",
        other => return format!("{}P", other),
    };
    label.to_string()
}

/// What kind of account the viewer has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountTier {
    #[default]
    Guest,
    LoggedIn,
    Premium,
}

/// Local permission check result for a quality
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityPermission {
    Permitted,
    RequiresLogin { label: String },
    RequiresPremium { label: String },
}

/// Quality at or above which a premium account is needed
pub fn requires_premium(quality: QualityId) -> bool {
    quality >= QualityId::FHD_PLUS
}

/// Quality at or above which a login is needed
pub fn requires_login(quality: QualityId) -> bool {
    quality >= QualityId::FHD
}

/// Check whether `tier` may request `quality`
pub fn check_permission(quality: QualityId, tier: AccountTier) -> QualityPermission {
    if requires_premium(quality) && tier != AccountTier::Premium {
        return QualityPermission::RequiresPremium {
            label: quality_label(quality),
        };
    }
    if requires_login(quality) && tier == AccountTier::Guest {
        return QualityPermission::RequiresLogin {
            label: quality_label(quality),
        };
    }
    QualityPermission::Permitted
}

/// Highest quality in `available` that `tier` is permitted to request.
///
/// Falls back to the lowest available quality, or [`DEFAULT_QUALITY`] when the
/// list is empty.
pub fn max_permitted_quality(available: &[QualityId], tier: AccountTier) -> QualityId {
    let mut sorted = available.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    if let Some(q) = sorted
        .iter()
        .find(|q| check_permission(**q, tier) == QualityPermission::Permitted)
    {
        return *q;
    }
    sorted.last().copied().unwrap_or(DEFAULT_QUALITY)
}

/// Target quality for the first descriptor fetch of a load
pub fn initial_quality(
    preferred: Option<QualityId>,
    tier: AccountTier,
    auto_highest: bool,
) -> QualityId {
    let target = match (auto_highest, tier, preferred) {
        (true, AccountTier::Premium, _) => QualityId::UHD_4K,
        (true, AccountTier::LoggedIn, _) => QualityId::FHD,
        (true, AccountTier::Guest, _) => QualityId::HD,
        (false, _, Some(q)) => q,
        (false, AccountTier::Premium, None) => QualityId::FHD_60,
        (false, AccountTier::LoggedIn, None) => QualityId::FHD,
        (false, AccountTier::Guest, None) => QualityId::SD,
    };
    debug!(?preferred, ?tier, auto_highest, target = %target, "Initial quality resolved");
    target
}
