//! Tile adaptation sets.
//!
//! A tile set holds every representation (quality variant) of one spatial
//! tile. One representation is current; during a switch a second one is
//! downloading as `next` until it has the segment the extractor needs.
//! Since all variants of a tile share one resolution, the concatenation side
//! may take a segment from whichever representation holds it, best quality
//! first.

use crate::errors::DashError;
use crate::quality::{parse_video_quality, QualityDescriptor};
use crate::representation::TileRepresentation;
use crate::segment::{DashSegment, DownloadStart};
use common::types::{AdaptationSetId, SegmentId};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

/// Tile set shared by every extractor that depends on it.
pub type SharedTileSet = Arc<Mutex<TileAdaptationSet>>;

pub struct TileAdaptationSet {
    id: AdaptationSetId,
    current: TileRepresentation,
    next: Option<TileRepresentation>,
    alternatives: Vec<TileRepresentation>,
}

impl TileAdaptationSet {
    /// The first representation becomes the current one.
    ///
    /// # Errors
    ///
    /// `DashError::NoRepresentation` if `representations` is empty.
    pub fn new(
        id: AdaptationSetId,
        representations: Vec<TileRepresentation>,
    ) -> Result<Self, DashError> {
        let mut representations = representations.into_iter();
        let current = representations
            .next()
            .ok_or(DashError::NoRepresentation(id))?;
        Ok(Self {
            id,
            current,
            next: None,
            alternatives: representations.collect(),
        })
    }

    /// Build a set from manifest entries, each paired with its
    /// representation-level quality descriptors.
    ///
    /// `set_quality` applies where a representation carries none. When every
    /// representation resolves a quality level they are ordered best first,
    /// so the best one becomes current; otherwise manifest order is kept.
    ///
    /// # Errors
    ///
    /// `DashError::NoRepresentation` if `representations` is empty.
    pub fn from_manifest(
        id: AdaptationSetId,
        set_quality: &[QualityDescriptor],
        representations: Vec<(TileRepresentation, Vec<QualityDescriptor>)>,
    ) -> Result<Self, DashError> {
        let mut ranked = true;
        let mut representations: Vec<TileRepresentation> = representations
            .into_iter()
            .map(|(mut representation, quality)| {
                match parse_video_quality(&quality, set_quality) {
                    Some(level) => representation.assign_quality_level(level.level),
                    None => ranked = false,
                }
                representation
            })
            .collect();

        if ranked {
            representations.sort_by_key(|representation| representation.quality_level());
        } else {
            debug!(
                target: "omaf.dash.tile_set",
                set = id,
                "No complete quality ranking, keeping manifest order"
            );
        }
        Self::new(id, representations)
    }

    #[must_use]
    pub fn shared(self) -> SharedTileSet {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn id(&self) -> AdaptationSetId {
        self.id
    }

    #[must_use]
    pub fn current(&self) -> &TileRepresentation {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut TileRepresentation {
        &mut self.current
    }

    #[must_use]
    pub fn current_representation_id(&self) -> &str {
        self.current.id()
    }

    /// A quality switch is waiting for the next representation's data.
    #[must_use]
    pub fn is_switch_ongoing(&self) -> bool {
        self.next.is_some()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.next
            .as_ref()
            .map_or(self.current.is_downloading(), TileRepresentation::is_downloading)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.current.is_initialized()
    }

    #[must_use]
    pub fn is_buffering(&self) -> bool {
        !self.is_end_of_stream() && !self.is_initialized()
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.current.is_error()
    }

    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.current.is_end_of_stream()
    }

    #[must_use]
    pub fn bandwidth(&self) -> u32 {
        self.current.bandwidth()
    }

    #[must_use]
    pub fn last_segment_id(&self, include_downloading: bool) -> SegmentId {
        self.current.last_segment_id(include_downloading)
    }

    pub fn process_segment_download(&mut self) {
        self.current.process_segment_download();
        if let Some(next) = self.next.as_mut() {
            next.process_segment_download();
        }
    }

    pub fn start_download(&mut self, start: DownloadStart) {
        self.current.start_download(start);
    }

    pub fn start_download_from_segment(
        &mut self,
        target: SegmentId,
        next_to_process: Option<SegmentId>,
    ) -> SegmentId {
        self.current.start_download_from_segment(target, next_to_process)
    }

    pub fn stop_download(&mut self) {
        for representation in self.representations_mut() {
            representation.stop_download();
        }
    }

    /// A pending switch is abandoned; the next representation is aborted.
    pub fn stop_download_async(&mut self, abort: bool, reset: bool) {
        if let Some(mut next) = self.next.take() {
            next.stop_download_async(true, reset);
            self.alternatives.push(next);
        }
        self.current.stop_download_async(abort, reset);
    }

    pub fn clear_downloaded_content(&mut self) {
        if let Some(next) = self.next.take() {
            self.current.stop_download();
            self.alternatives.push(next);
        }
        for representation in self.representations_mut() {
            representation.clear_downloaded_content();
        }
    }

    /// Drop segments older than `segment_id` in every representation;
    /// `None` also resets their download counters.
    pub fn clean_up_old_segments(&mut self, segment_id: Option<SegmentId>) {
        for representation in self.representations_mut() {
            representation.clean_up_old_segments(segment_id);
        }
    }

    pub fn set_buffering_time(&mut self, expected_ping_time_ms: u32) {
        for representation in self.representations_mut() {
            representation.set_buffering_time(expected_ping_time_ms);
        }
    }

    /// Make the representation `representation_id` the download target.
    ///
    /// Returns `true` if a switch was started (or completed right away from
    /// cached segments).
    pub fn select_representation(
        &mut self,
        representation_id: &str,
        next_processed_segment: SegmentId,
    ) -> bool {
        let is_current = self.current.id() == representation_id;
        let position = self
            .alternatives
            .iter()
            .position(|representation| representation.id() == representation_id);
        if !is_current && position.is_none() {
            if self
                .next
                .as_ref()
                .is_some_and(|next| next.id() == representation_id)
            {
                trace!(target: "omaf.dash.tile_set", set = self.id, representation_id, "Already switching");
            }
            return false;
        }

        if let Some(mut next) = self.next.take() {
            debug!(
                target: "omaf.dash.tile_set",
                set = self.id,
                representation = next.id(),
                "Next representation was downloading, stop it"
            );
            next.stop_download();
            self.alternatives.push(next);
        }
        let Some(position) = position else {
            return false;
        };

        let next = self.alternatives.remove(position);
        debug!(
            target: "omaf.dash.tile_set",
            set = self.id,
            from = self.current.id(),
            to = next.id(),
            "Select representation"
        );
        self.next = Some(next);
        // Not aborted, an interrupted segment would break segment alignment.
        self.current.stop_download_async(false, false);
        self.prepare_for_switch(next_processed_segment)
    }

    fn prepare_for_switch(&mut self, next_processed_segment: SegmentId) -> bool {
        let current_last = self.current.last_segment_id(false);
        let mut estimated = if current_last == 0 {
            next_processed_segment
        } else {
            current_last.saturating_add(1)
        };
        let Some(next) = self.next.as_mut() else {
            return false;
        };
        let next_last = next.last_segment_id(false);
        if next_last >= estimated {
            estimated = next_last.saturating_add(1);
        }
        next.clean_up_old_segments(Some(next_processed_segment));
        next.start_download_from_segment(estimated, Some(next_processed_segment));

        if next.ready_to_switch(next_processed_segment) {
            debug!(target: "omaf.dash.tile_set", set = self.id, "Using already downloaded segments");
            self.do_switch();
        }
        true
    }

    /// Complete a pending switch at `next_segment_id` when it is safe.
    ///
    /// Returns `true` if the current representation changed.
    pub fn try_switching_representation(&mut self, next_segment_id: SegmentId) -> bool {
        let Some(next) = self.next.as_mut() else {
            return false;
        };
        next.clean_up_old_segments(Some(next_segment_id));
        if next.ready_to_switch(next_segment_id) {
            trace!(
                target: "omaf.dash.tile_set",
                set = self.id,
                segment = next_segment_id,
                "Next representation has data, switch"
            );
            self.do_switch();
            return true;
        }
        if self
            .current
            .peek_segment()
            .is_some_and(|segment| segment.segment_id == next_segment_id)
        {
            trace!(
                target: "omaf.dash.tile_set",
                set = self.id,
                representation = self.current.id(),
                "Keep using the current representation"
            );
            return false;
        }
        trace!(
            target: "omaf.dash.tile_set",
            set = self.id,
            "Current representation has no useful data left, switch"
        );
        self.do_switch();
        true
    }

    fn do_switch(&mut self) {
        let Some(next) = self.next.take() else {
            return;
        };
        debug!(
            target: "omaf.dash.tile_set",
            set = self.id,
            from = self.current.id(),
            from_bandwidth = self.current.bandwidth(),
            to = next.id(),
            to_bandwidth = next.bandwidth(),
            "Switch done"
        );
        let mut previous = std::mem::replace(&mut self.current, next);
        previous.switched_to_another();
        self.alternatives.push(previous);
    }

    /// Size of segment `segment_id` in the best-quality representation
    /// holding it.
    pub fn has_segment(&mut self, segment_id: SegmentId) -> Option<usize> {
        let set = self.id;
        let mut oldest_all: Option<SegmentId> = None;
        for representation in self.representations_by_quality() {
            match representation.has_segment(segment_id) {
                Ok(size) => return Some(size),
                Err(Some(oldest)) => {
                    oldest_all = Some(oldest_all.map_or(oldest, |all| all.min(oldest)));
                }
                Err(None) => {}
            }
        }
        trace!(
            target: "omaf.dash.tile_set",
            set,
            segment = segment_id,
            oldest = ?oldest_all,
            "Segment not yet available for concatenation"
        );
        None
    }

    /// Take segment `segment_id` from the best-quality representation
    /// holding it. The representation id is recorded in the segment's
    /// sources.
    pub fn take_segment(&mut self, segment_id: SegmentId) -> Option<DashSegment> {
        self.representations_by_quality()
            .into_iter()
            .find_map(|representation| match representation.has_segment(segment_id) {
                Ok(_) => representation.take_segment().map(|mut segment| {
                    segment.sources.push(representation.id().to_owned());
                    segment
                }),
                Err(_) => None,
            })
    }

    fn representations_mut(&mut self) -> impl Iterator<Item = &mut TileRepresentation> {
        std::iter::once(&mut self.current)
            .chain(self.next.as_mut())
            .chain(self.alternatives.iter_mut())
    }

    /// Best quality (lowest ranking) first; unranked representations last.
    fn representations_by_quality(&mut self) -> Vec<&mut TileRepresentation> {
        let mut representations: Vec<&mut TileRepresentation> =
            self.representations_mut().collect();
        representations
            .sort_by_key(|representation| representation.quality_level().unwrap_or(u8::MAX));
        representations
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::quality::QualityScheme;
    use crate::test_support::QueueStream;

    fn representation(id: &str, quality: u8) -> (TileRepresentation, QueueStream) {
        let stream = QueueStream::default();
        let bandwidth = 1_000 * u32::from(10 - quality);
        let representation = TileRepresentation::new(id, bandwidth, Box::new(stream.clone()))
            .with_quality_level(quality);
        (representation, stream)
    }

    fn two_quality_set() -> (TileAdaptationSet, QueueStream, QueueStream) {
        let (low, low_stream) = representation("low", 5);
        let (high, high_stream) = representation("high", 1);
        let set = TileAdaptationSet::new(2, vec![low, high]).unwrap();
        (set, low_stream, high_stream)
    }

    #[test]
    fn test_empty_set_is_rejected() {
        let err = TileAdaptationSet::new(4, Vec::new()).err();
        assert_eq!(err, Some(DashError::NoRepresentation(4)));
    }

    fn srqr(ranking: u8) -> Vec<QualityDescriptor> {
        vec![QualityDescriptor {
            scheme: QualityScheme::SphereRegion,
            quality_ranking: ranking,
            global: false,
        }]
    }

    fn unranked(id: &str) -> TileRepresentation {
        TileRepresentation::new(id, 1_000, Box::new(QueueStream::default()))
    }

    fn alternative_ids(set: &TileAdaptationSet) -> Vec<&str> {
        set.alternatives.iter().map(TileRepresentation::id).collect()
    }

    #[test]
    fn test_manifest_ranking_puts_best_quality_first() {
        let set = TileAdaptationSet::from_manifest(
            3,
            &srqr(3),
            vec![
                (unranked("low"), srqr(5)),
                (unranked("mid"), Vec::new()),
                (unranked("high"), srqr(1)),
            ],
        )
        .unwrap();

        assert_eq!(set.current_representation_id(), "high");
        assert_eq!(set.current().quality_level(), Some(1));
        assert_eq!(alternative_ids(&set), vec!["mid", "low"]);
        let levels: Vec<Option<u8>> = set
            .alternatives
            .iter()
            .map(TileRepresentation::quality_level)
            .collect();
        assert_eq!(levels, vec![Some(3), Some(5)]);
    }

    #[test]
    fn test_manifest_order_kept_without_full_ranking() {
        let set = TileAdaptationSet::from_manifest(
            3,
            &[],
            vec![
                (unranked("low"), srqr(5)),
                (unranked("plain"), Vec::new()),
                (unranked("high"), srqr(1)),
            ],
        )
        .unwrap();

        assert_eq!(set.current_representation_id(), "low");
        assert_eq!(set.current().quality_level(), Some(5));
        assert_eq!(alternative_ids(&set), vec!["plain", "high"]);
        assert_eq!(
            set.alternatives.first().and_then(TileRepresentation::quality_level),
            None
        );
    }

    #[test]
    fn test_empty_manifest_is_rejected() {
        let err = TileAdaptationSet::from_manifest(4, &srqr(1), Vec::new()).err();
        assert_eq!(err, Some(DashError::NoRepresentation(4)));
    }

    #[test]
    fn test_segment_search_prefers_best_quality() {
        let (mut set, low_stream, high_stream) = two_quality_set();
        low_stream.deliver(&[3]);
        high_stream.deliver(&[3]);
        set.current_mut().process_segment_download();
        set.alternatives.iter_mut().for_each(TileRepresentation::process_segment_download);

        assert_eq!(set.has_segment(3), Some(4));
        let segment = set.take_segment(3).unwrap();
        assert_eq!(segment.segment_id, 3);
        assert_eq!(segment.sources, vec!["high".to_string()]);
        // The best quality copy went first, the current one still holds its own.
        assert_eq!(set.current().segment_count(), 1);
        assert!(set.take_segment(3).is_some());
        assert!(set.take_segment(3).is_none());
    }

    #[test]
    fn test_missing_segment() {
        let (mut set, low_stream, _) = two_quality_set();
        low_stream.deliver(&[6]);
        set.process_segment_download();
        assert_eq!(set.has_segment(5), None);
        assert_eq!(set.has_segment(6), Some(4));
    }

    #[test]
    fn test_select_representation_starts_next_download() {
        let (mut set, low_stream, high_stream) = two_quality_set();
        set.start_download(DownloadStart::AtTime(0));
        low_stream.deliver(&[1, 2]);
        set.process_segment_download();

        assert!(set.select_representation("high", 2));
        assert!(set.is_switch_ongoing());
        assert_eq!(
            high_stream.started().last(),
            Some(&DownloadStart::FromSegment(3))
        );
        assert!(set.is_active());
        assert!(!set.current().is_downloading());
    }

    #[test]
    fn test_select_current_representation_is_noop() {
        let (mut set, _, _) = two_quality_set();
        assert!(!set.select_representation("low", 1));
        assert!(!set.select_representation("unknown", 1));
        assert!(!set.is_switch_ongoing());
    }

    #[test]
    fn test_switch_waits_while_current_has_data() {
        let (mut set, low_stream, high_stream) = two_quality_set();
        set.start_download(DownloadStart::AtTime(0));
        low_stream.deliver(&[1, 2, 3]);
        set.process_segment_download();
        assert!(set.select_representation("high", 2));
        set.clean_up_old_segments(Some(2));

        // Next has nothing yet; current still holds segment 2.
        assert!(!set.try_switching_representation(2));
        assert_eq!(set.current_representation_id(), "low");

        high_stream.deliver(&[4]);
        set.process_segment_download();
        // Segment 4 is only in the next representation.
        assert!(set.try_switching_representation(4));
        assert_eq!(set.current_representation_id(), "high");
        assert!(!set.is_switch_ongoing());
    }

    #[test]
    fn test_switch_forced_when_current_runs_dry() {
        let (mut set, low_stream, _) = two_quality_set();
        set.start_download(DownloadStart::AtTime(0));
        low_stream.deliver(&[1]);
        set.process_segment_download();
        assert!(set.select_representation("high", 1));

        assert!(set.try_switching_representation(2));
        assert_eq!(set.current_representation_id(), "high");
    }

    #[test]
    fn test_stop_async_abandons_switch() {
        let (mut set, _, high_stream) = two_quality_set();
        set.start_download(DownloadStart::AtTime(0));
        assert!(set.select_representation("high", 1));
        high_stream.set_completing(true);

        set.stop_download_async(false, false);
        assert!(!set.is_switch_ongoing());
        assert!(!high_stream.completing());
        assert!(!set.is_active());
    }

    #[test]
    fn test_clean_up_resets_every_representation() {
        let (mut set, low_stream, high_stream) = two_quality_set();
        low_stream.deliver(&[1, 2]);
        high_stream.deliver(&[1]);
        set.current_mut().process_segment_download();
        set.alternatives.iter_mut().for_each(TileRepresentation::process_segment_download);

        set.clean_up_old_segments(None);
        assert_eq!(set.last_segment_id(false), 0);
        assert_eq!(set.has_segment(1), None);
        assert!(set.is_buffering());
    }
}
