//! DASH provider error types.

use common::types::{AdaptationSetId, SegmentId};
use thiserror::Error;

/// DASH provider error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DashError {
    /// The adaptation set has no current representation.
    #[error("No representation in adaptation set {0}")]
    NoRepresentation(AdaptationSetId),

    /// The MP4 parser refused a (concatenated) media segment.
    #[error("Parser rejected segment {segment}: {reason}")]
    ParserRejected { segment: SegmentId, reason: String },

    /// The segment download engine reported a failure.
    #[error("Download failed: {0}")]
    Download(String),

    /// The MPD carries quality metadata in a scheme this player does not read.
    #[error("Quality ranking scheme not supported")]
    UnsupportedQualityScheme,
}

impl DashError {
    /// Whether the provider may keep running and retry on the next pass.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DashError::Download(_) | DashError::ParserRejected { .. })
    }

    /// Returns a bounded label string for the error variant (for metrics).
    #[must_use]
    pub fn error_type_label(&self) -> &'static str {
        match self {
            DashError::NoRepresentation(_) => "no_representation",
            DashError::ParserRejected { .. } => "parser_rejected",
            DashError::Download(_) => "download",
            DashError::UnsupportedQualityScheme => "unsupported_quality_scheme",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = DashError::ParserRejected {
            segment: 7,
            reason: "truncated moof".to_string(),
        };
        assert_eq!(err.to_string(), "Parser rejected segment 7: truncated moof");
        assert_eq!(
            DashError::NoRepresentation(3).to_string(),
            "No representation in adaptation set 3"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(DashError::Download("timeout".to_string()).is_recoverable());
        assert!(!DashError::NoRepresentation(1).is_recoverable());
        assert!(!DashError::UnsupportedQualityScheme.is_recoverable());
    }

    #[test]
    fn test_error_type_labels() {
        assert_eq!(DashError::NoRepresentation(1).error_type_label(), "no_representation");
        assert_eq!(
            DashError::UnsupportedQualityScheme.error_type_label(),
            "unsupported_quality_scheme"
        );
    }
}
