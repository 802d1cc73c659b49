//! Metrics for extractor segment concatenation.
//!
//! All metrics use the `omaf_` prefix. Adaptation set ids are not used as
//! labels.

use metrics::counter;

/// Record a concatenated segment handed to the parser.
///
/// Metrics: `omaf_segments_concatenated_total`, `omaf_concatenated_bytes_total`
pub fn record_segment_concatenated(bytes: usize) {
    counter!("omaf_segments_concatenated_total").increment(1);
    counter!("omaf_concatenated_bytes_total").increment(bytes as u64);
}

/// Why a concatenation could not proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// A supporting set lacks the segment but is still downloading.
    MissingTile,
    /// A supporting set lacks the segment and is not downloading.
    NotDownloading,
}

impl BlockReason {
    fn as_str(self) -> &'static str {
        match self {
            BlockReason::MissingTile => "missing_tile",
            BlockReason::NotDownloading => "not_downloading",
        }
    }
}

/// Record a concatenation attempt that had to wait for tile data.
///
/// Metric: `omaf_concatenation_blocked_total`
/// Labels: `reason`
pub fn record_concatenation_blocked(reason: BlockReason) {
    counter!("omaf_concatenation_blocked_total", "reason" => reason.as_str()).increment(1);
}

/// Record a representation switch in a tile set during concatenation.
///
/// Metric: `omaf_tile_switches_total`
pub fn record_tile_switch() {
    counter!("omaf_tile_switches_total").increment(1);
}
