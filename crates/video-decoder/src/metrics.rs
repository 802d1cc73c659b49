//! Metrics for the decoder manager and frame cache.
//!
//! All metrics use the `omaf_` prefix and follow Prometheus naming
//! conventions. Labels are bounded enums; stream ids are never used as
//! labels.

use metrics::{counter, gauge};

/// Discard reasons for `omaf_frames_discarded_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Arrived below the stream's discard target.
    DiscardTarget,
    /// Older than the frame currently on screen.
    OlderThanActive,
    /// Same PTS as an already queued frame.
    DuplicatePts,
    /// Fell behind the playback position.
    TooOld,
}

impl DiscardReason {
    fn as_str(self) -> &'static str {
        match self {
            DiscardReason::DiscardTarget => "discard_target",
            DiscardReason::OlderThanActive => "older_than_active",
            DiscardReason::DuplicatePts => "duplicate_pts",
            DiscardReason::TooOld => "too_old",
        }
    }
}

/// Record a decoded frame that will never be presented.
///
/// Metric: `omaf_frames_discarded_total`
/// Labels: `reason`
pub fn record_frames_discarded(reason: DiscardReason, count: usize) {
    counter!("omaf_frames_discarded_total", "reason" => reason.as_str())
        .increment(count as u64);
}

/// Record a frame upload to a texture.
///
/// Metric: `omaf_frames_uploaded_total`
pub fn record_frame_uploaded() {
    counter!("omaf_frames_uploaded_total").increment(1);
}

/// Record a render tick without a consistent frame set.
///
/// Metric: `omaf_sync_misses_total`
pub fn record_sync_miss() {
    counter!("omaf_sync_misses_total").increment(1);
}

/// Record a decoder reservation attempt.
///
/// Metric: `omaf_decoder_reservations_total`
/// Labels: `status` (success, error)
pub fn record_decoder_reservation(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("omaf_decoder_reservations_total", "status" => status).increment(1);
}

/// Set the number of streams holding a decoder.
///
/// Metric: `omaf_active_decoders`
pub fn set_active_decoders(count: usize) {
    // usize to f64 conversion is exact for realistic slot counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("omaf_active_decoders").set(count as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_counters_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_frames_discarded(DiscardReason::TooOld, 3);
            record_frame_uploaded();
            record_sync_miss();
            record_decoder_reservation(false);
            set_active_decoders(2);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let discarded = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "omaf_frames_discarded_total")
            .expect("discard counter recorded");
        assert!(matches!(discarded.3, DebugValue::Counter(3)));

        let names: Vec<&str> = snapshot
            .iter()
            .map(|(key, _, _, _)| key.key().name())
            .collect();
        assert!(names.contains(&"omaf_frames_uploaded_total"));
        assert!(names.contains(&"omaf_sync_misses_total"));
        assert!(names.contains(&"omaf_decoder_reservations_total"));
        assert!(names.contains(&"omaf_active_decoders"));
    }
}
