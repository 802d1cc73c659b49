//! OMAF quality-ranking descriptors.
//!
//! Representations and adaptation sets may carry a sphere-region quality
//! ranking (SRQR) or a 2D quality ranking descriptor. Lower ranking values
//! mean better quality.

use serde::{Deserialize, Serialize};

/// Quality ranking scheme of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityScheme {
    /// `urn:mpeg:mpegI:omaf:2017:srqr`
    SphereRegion,
    /// `urn:mpeg:mpegI:omaf:2017:2dqr`
    TwoDimensional,
}

/// One supplemental-property quality descriptor from the MPD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityDescriptor {
    pub scheme: QualityScheme,
    pub quality_ranking: u8,
    /// Ranking applies to the whole sphere rather than one region.
    pub global: bool,
}

/// Quality level resolved for a representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityLevel {
    pub level: u8,
    pub global: bool,
}

/// Result of looking up quality metadata on one MPD level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLookup {
    Found(QualityLevel),
    /// Metadata exists in a scheme the player does not read.
    NotSupported,
    /// No quality metadata on this level.
    NoMetadata,
}

/// First recognised descriptor decides.
#[must_use]
pub fn quality_ranking(descriptors: &[QualityDescriptor]) -> QualityLookup {
    match descriptors.first() {
        Some(descriptor) if descriptor.scheme == QualityScheme::SphereRegion => {
            QualityLookup::Found(QualityLevel {
                level: descriptor.quality_ranking,
                global: descriptor.global,
            })
        }
        Some(_) => QualityLookup::NotSupported,
        None => QualityLookup::NoMetadata,
    }
}

/// Quality of a representation, taken from the representation level and
/// falling back to the adaptation-set level.
///
/// `None` leaves the representation unordered by quality, which is an
/// accepted degraded mode.
#[must_use]
pub fn parse_video_quality(
    representation_level: &[QualityDescriptor],
    adaptation_set_level: &[QualityDescriptor],
) -> Option<QualityLevel> {
    match quality_ranking(representation_level) {
        QualityLookup::Found(level) => Some(level),
        QualityLookup::NotSupported => None,
        QualityLookup::NoMetadata => match quality_ranking(adaptation_set_level) {
            QualityLookup::Found(level) => Some(level),
            QualityLookup::NotSupported | QualityLookup::NoMetadata => None,
        },
    }
}
