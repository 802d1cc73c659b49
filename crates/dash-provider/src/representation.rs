//! Tile and extractor representations.
//!
//! A tile representation only buffers downloaded segments; its payload
//! cannot be parsed alone and is consumed by an extractor. The extractor
//! representation owns the parser that receives concatenated segments.

use crate::errors::DashError;
use crate::segment::{DashSegment, DownloadStart, SegmentParser, SegmentStream};
use common::types::SegmentId;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// One tile representation with its downloaded segment queue.
pub struct TileRepresentation {
    id: String,
    bandwidth: u32,
    quality_level: Option<u8>,
    stream: Box<dyn SegmentStream>,
    segments: VecDeque<DashSegment>,
    last_segment_id: SegmentId,
    downloading: bool,
    buffering_time_ms: u32,
}

impl TileRepresentation {
    pub fn new(id: impl Into<String>, bandwidth: u32, stream: Box<dyn SegmentStream>) -> Self {
        Self {
            id: id.into(),
            bandwidth,
            quality_level: None,
            stream,
            segments: VecDeque::new(),
            last_segment_id: 0,
            downloading: false,
            buffering_time_ms: 0,
        }
    }

    /// Builder-style quality assignment; lower levels are better.
    #[must_use]
    pub fn with_quality_level(mut self, quality_level: u8) -> Self {
        self.quality_level = Some(quality_level);
        self
    }

    pub fn assign_quality_level(&mut self, quality_level: u8) {
        self.quality_level = Some(quality_level);
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn bandwidth(&self) -> u32 {
        self.bandwidth
    }

    #[must_use]
    pub fn quality_level(&self) -> Option<u8> {
        self.quality_level
    }

    #[must_use]
    pub fn buffering_time_ms(&self) -> u32 {
        self.buffering_time_ms
    }

    pub fn set_buffering_time(&mut self, buffering_time_ms: u32) {
        self.buffering_time_ms = buffering_time_ms;
    }

    #[must_use]
    pub fn is_downloading(&self) -> bool {
        self.downloading
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.last_segment_id > 0 || !self.segments.is_empty()
    }

    pub fn start_download(&mut self, start: DownloadStart) {
        debug!(target: "omaf.dash.representation", representation = %self.id, ?start, "Start download");
        self.downloading = true;
        self.stream.start(start);
    }

    /// Restart downloading at `target`, reusing segments already cached.
    ///
    /// Returns the segment the download actually starts from.
    pub fn start_download_from_segment(
        &mut self,
        target: SegmentId,
        next_to_process: Option<SegmentId>,
    ) -> SegmentId {
        let mut target = target;
        let last_available = self.segments.back().map_or(0, |segment| segment.segment_id);
        if last_available >= target {
            // Continue from the next segment not yet loaded.
            target = last_available.saturating_add(1);
        }
        match next_to_process {
            None => self.clean_up_old_segments(Some(target)),
            Some(next) => {
                self.clean_up_old_segments(Some(next));
                if last_available > next {
                    // Gaps in the queue are not allowed.
                    target = last_available.saturating_add(1);
                }
            }
        }
        self.start_download(DownloadStart::FromSegment(target));
        target
    }

    pub fn stop_download(&mut self) {
        self.downloading = false;
        self.stream.stop(false);
    }

    /// Stop without waiting for the download in progress; `abort` cancels it.
    pub fn stop_download_async(&mut self, abort: bool, reset: bool) {
        self.downloading = false;
        self.stream.stop(abort);
        if reset {
            self.clear_downloaded_content();
        }
    }

    /// Move completed downloads into the segment queue.
    pub fn process_segment_download(&mut self) {
        for segment in self.stream.poll_completed() {
            trace!(
                target: "omaf.dash.representation",
                representation = %self.id,
                segment = segment.segment_id,
                "Segment downloaded"
            );
            self.last_segment_id = segment.segment_id;
            self.segments.push_back(segment);
        }
    }

    /// Oldest queued segment.
    #[must_use]
    pub fn peek_segment(&self) -> Option<&DashSegment> {
        self.segments.front()
    }

    /// Remove and return the oldest queued segment.
    pub fn take_segment(&mut self) -> Option<DashSegment> {
        self.segments.pop_front()
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Drop queued segments older than `next_segment_id`.
    ///
    /// `None` drops everything and resets the download counter, as needed
    /// after a pause when a different representation may resume.
    pub fn clean_up_old_segments(&mut self, next_segment_id: Option<SegmentId>) {
        let Some(next_segment_id) = next_segment_id else {
            self.last_segment_id = 0;
            self.segments.clear();
            return;
        };
        while self
            .segments
            .front()
            .is_some_and(|segment| segment.segment_id < next_segment_id)
        {
            if let Some(segment) = self.segments.pop_front() {
                trace!(
                    target: "omaf.dash.representation",
                    representation = %self.id,
                    next = next_segment_id,
                    oldest = segment.segment_id,
                    "Discarding old segment"
                );
            }
        }
    }

    /// Size of the queued segment `segment_id`, dropping older segments on
    /// the way. `Err` carries the oldest queued segment id when only newer
    /// segments exist.
    pub fn has_segment(&mut self, segment_id: SegmentId) -> Result<usize, Option<SegmentId>> {
        self.clean_up_old_segments(Some(segment_id));
        match self.segments.front() {
            Some(segment) if segment.segment_id == segment_id => Ok(segment.size()),
            Some(segment) => Err(Some(segment.segment_id)),
            None => Err(None),
        }
    }

    /// Last downloaded segment id; with `include_downloading` a segment in
    /// progress counts as well.
    #[must_use]
    pub fn last_segment_id(&self, include_downloading: bool) -> SegmentId {
        if include_downloading && self.stream.is_completing_download() {
            return self.last_segment_id.saturating_add(1);
        }
        self.last_segment_id
    }

    /// Whether the next needed segment is the oldest one queued.
    pub fn ready_to_switch(&mut self, next_needed: SegmentId) -> bool {
        self.clean_up_old_segments(Some(next_needed));
        match self.segments.front() {
            Some(segment) if segment.segment_id == next_needed => true,
            Some(segment) => {
                trace!(
                    target: "omaf.dash.representation",
                    representation = %self.id,
                    found = segment.segment_id,
                    needed = next_needed,
                    "Only newer segments, not ready to switch"
                );
                false
            }
            None => false,
        }
    }

    /// Abort a download in progress once another representation took over.
    pub fn switched_to_another(&mut self) {
        if self.stream.is_completing_download() {
            self.stream.stop(true);
        }
    }

    pub fn clear_downloaded_content(&mut self) {
        self.stream.clear_downloaded_segments();
        self.segments.clear();
    }

    #[must_use]
    pub fn is_buffering(&self) -> bool {
        self.downloading && self.stream.is_buffering()
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.stream.is_error()
    }

    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.stream.is_end_of_stream()
    }
}

/// Representation of an extractor track; feeds concatenated segments to
/// its parser.
pub struct ExtractorRepresentation {
    tile: TileRepresentation,
    parser: Box<dyn SegmentParser>,
}

impl ExtractorRepresentation {
    #[must_use]
    pub fn new(tile: TileRepresentation, parser: Box<dyn SegmentParser>) -> Self {
        Self { tile, parser }
    }

    /// Download side of the representation.
    #[must_use]
    pub fn segments(&self) -> &TileRepresentation {
        &self.tile
    }

    pub fn segments_mut(&mut self) -> &mut TileRepresentation {
        &mut self.tile
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.tile.id()
    }

    /// The parser can take `segment_id` once it finished the previous one.
    /// Before any stream exists it is always ready.
    #[must_use]
    pub fn ready_for_segment(&self, segment_id: SegmentId) -> bool {
        !self.parser.is_initialized() || self.parser.ready_for_segment(segment_id)
    }

    /// # Errors
    ///
    /// Propagates the parser's rejection.
    pub fn parse_concatenated_segment(&mut self, segment: DashSegment) -> Result<(), DashError> {
        self.parser.add_segment(segment)
    }

    /// All samples consumed and nothing more is downloading.
    #[must_use]
    pub fn is_done(&self) -> bool {
        let end_of_stream = self.tile.is_end_of_stream();
        if self.tile.is_downloading() && !end_of_stream {
            return false;
        }
        if end_of_stream && !self.parser.is_initialized() {
            return true;
        }
        self.parser.is_done()
    }

    pub fn switched_to_another(&mut self) {
        self.tile.switched_to_another();
    }

    pub fn clear_downloaded_content(&mut self) {
        self.tile.clear_downloaded_content();
        self.parser.release_all_segments();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::{QueueStream, StubParser};

    fn tile_with(ids: &[SegmentId]) -> (TileRepresentation, QueueStream) {
        let stream = QueueStream::default();
        let mut tile = TileRepresentation::new("tile", 1_000, Box::new(stream.clone()));
        stream.deliver(ids);
        tile.process_segment_download();
        (tile, stream)
    }

    #[test]
    fn test_downloads_queue_in_order() {
        let (tile, _) = tile_with(&[3, 4, 5]);
        assert_eq!(tile.segment_count(), 3);
        assert_eq!(tile.peek_segment().unwrap().segment_id, 3);
        assert_eq!(tile.last_segment_id(false), 5);
        assert!(tile.is_initialized());
    }

    #[test]
    fn test_clean_up_old_segments() {
        let (mut tile, _) = tile_with(&[3, 4, 5]);
        tile.clean_up_old_segments(Some(5));
        assert_eq!(tile.segment_count(), 1);
        assert_eq!(tile.last_segment_id(false), 5);

        tile.clean_up_old_segments(None);
        assert_eq!(tile.segment_count(), 0);
        assert_eq!(tile.last_segment_id(false), 0);
    }

    #[test]
    fn test_has_segment_skips_older() {
        let (mut tile, _) = tile_with(&[3, 4, 6]);
        assert_eq!(tile.has_segment(4), Ok(4));
        assert_eq!(tile.segment_count(), 2);
        assert_eq!(tile.has_segment(5), Err(Some(6)));
        assert_eq!(tile.has_segment(9), Err(None));
    }

    #[test]
    fn test_last_segment_includes_download_in_progress() {
        let (tile, stream) = tile_with(&[2]);
        stream.set_completing(true);
        assert_eq!(tile.last_segment_id(true), 3);
        assert_eq!(tile.last_segment_id(false), 2);
    }

    #[test]
    fn test_start_from_segment_continues_after_cache() {
        let (mut tile, stream) = tile_with(&[4, 5, 6]);
        let start = tile.start_download_from_segment(5, Some(5));
        assert_eq!(start, 7);
        assert_eq!(tile.peek_segment().unwrap().segment_id, 5);
        assert!(tile.is_downloading());
        assert_eq!(
            stream.started().last(),
            Some(&DownloadStart::FromSegment(7))
        );
    }

    #[test]
    fn test_start_from_segment_without_cache() {
        let stream = QueueStream::default();
        let mut tile = TileRepresentation::new("tile", 1_000, Box::new(stream));
        assert_eq!(tile.start_download_from_segment(9, None), 9);
    }

    #[test]
    fn test_ready_to_switch() {
        let (mut tile, _) = tile_with(&[2, 3]);
        assert!(tile.ready_to_switch(3));
        assert!(!tile.ready_to_switch(5));
    }

    #[test]
    fn test_switched_to_another_aborts_download() {
        let (mut tile, stream) = tile_with(&[1]);
        stream.set_completing(true);
        tile.switched_to_another();
        assert!(!stream.completing());
    }

    #[test]
    fn test_stop_async_with_reset_clears() {
        let (mut tile, stream) = tile_with(&[1, 2]);
        tile.start_download(DownloadStart::AtTime(0));
        tile.stop_download_async(false, true);
        assert!(!tile.is_downloading());
        assert_eq!(tile.segment_count(), 0);
        assert_eq!(stream.cleared(), 1);
    }

    #[test]
    fn test_extractor_done_states() {
        let stream = QueueStream::default();
        let parser = StubParser::default();
        let mut extractor = ExtractorRepresentation::new(
            TileRepresentation::new("extractor", 100, Box::new(stream.clone())),
            Box::new(parser.clone()),
        );
        assert!(extractor.ready_for_segment(9));

        extractor.segments_mut().start_download(DownloadStart::AtTime(0));
        assert!(!extractor.is_done());

        // Stream ended before anything was parsed.
        stream.set_end_of_stream(true);
        assert!(extractor.is_done());
    }

    #[test]
    fn test_extractor_clear_releases_parser() {
        let stream = QueueStream::default();
        let parser = StubParser::default();
        let mut extractor = ExtractorRepresentation::new(
            TileRepresentation::new("extractor", 100, Box::new(stream.clone())),
            Box::new(parser.clone()),
        );
        extractor
            .parse_concatenated_segment(DashSegment::new(1, 1, bytes::Bytes::from_static(b"moof")))
            .unwrap();
        assert_eq!(parser.parsed().len(), 1);

        extractor.clear_downloaded_content();
        assert_eq!(parser.released(), 1);
        assert_eq!(stream.cleared(), 1);
        assert!(parser.parsed().is_empty());
    }
}
