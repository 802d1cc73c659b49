//! Multi-resolution extractor adaptation set.
//!
//! An OMAF extractor track carries no coded video of its own. Each of its
//! media segments is assembled by appending the same-numbered segment of
//! every supporting tile adaptation set to the extractor segment, and only
//! then handed to the MP4 parser:
//!
//! ```text
//!   extractor rep ──┐
//!   tile set A ─────┼─► concatenate(segment N) ─► parser ─► decoder manager
//!   tile set B ─────┘
//! ```
//!
//! Concatenation of segment N is all-or-nothing: every supporting set must
//! hold segment N (or at least still be downloading towards it). Several
//! extractors, one per viewing direction, may share tile sets; only the one
//! in use consumes segments, the others keep downloading so a switch to
//! them is fast.

use crate::errors::DashError;
use crate::metrics::{self, BlockReason};
use crate::representation::ExtractorRepresentation;
use crate::segment::{DashSegment, DownloadStart};
use crate::tile_set::SharedTileSet;
use bytes::BytesMut;
use common::types::{AdaptationSetId, SegmentId};
use tracing::{debug, trace};

/// Concatenation starts from segment 1 until told otherwise.
const FIRST_SEGMENT_ID: SegmentId = 1;

struct SupportingSet {
    id: AdaptationSetId,
    set: SharedTileSet,
}

pub struct DashAdaptationSetExtractorMr {
    id: AdaptationSetId,
    representation: Option<ExtractorRepresentation>,
    supporting_sets: Vec<SupportingSet>,
    in_use: bool,
    next_segment_to_be_concatenated: SegmentId,
    /// Segment a (re)started download targets; 0 before the first start.
    target_next_segment_id: SegmentId,
    download_start_time_ms: Option<u64>,
    expected_ping_time_ms: u32,
}

impl DashAdaptationSetExtractorMr {
    #[must_use]
    pub fn new(id: AdaptationSetId) -> Self {
        Self {
            id,
            representation: None,
            supporting_sets: Vec::new(),
            in_use: false,
            next_segment_to_be_concatenated: FIRST_SEGMENT_ID,
            target_next_segment_id: 0,
            download_start_time_ms: None,
            expected_ping_time_ms: 0,
        }
    }

    #[must_use]
    pub fn with_representation(mut self, representation: ExtractorRepresentation) -> Self {
        self.representation = Some(representation);
        self
    }

    pub fn add_supporting_set(&mut self, set: SharedTileSet) {
        let id = set.lock().id();
        trace!(target: "omaf.dash.extractor", extractor = self.id, set = id, "Add supporting set");
        self.supporting_sets.push(SupportingSet { id, set });
    }

    #[must_use]
    pub fn id(&self) -> AdaptationSetId {
        self.id
    }

    #[must_use]
    pub fn representation(&self) -> Option<&ExtractorRepresentation> {
        self.representation.as_ref()
    }

    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    #[must_use]
    pub fn has_supporting_set(&self, id: AdaptationSetId) -> bool {
        self.supporting_sets.iter().any(|supporting| supporting.id == id)
    }

    #[must_use]
    pub fn supporting_set_count(&self) -> usize {
        self.supporting_sets.len()
    }

    #[must_use]
    pub fn next_processed_segment_id(&self) -> SegmentId {
        self.next_segment_to_be_concatenated
    }

    #[must_use]
    pub fn target_next_segment_id(&self) -> SegmentId {
        self.target_next_segment_id
    }

    #[must_use]
    pub fn download_start_time_ms(&self) -> Option<u64> {
        self.download_start_time_ms
    }

    #[must_use]
    pub fn expected_ping_time_ms(&self) -> u32 {
        self.expected_ping_time_ms
    }

    /// Whether the extractor's own representation is downloading.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.representation
            .as_ref()
            .is_some_and(|representation| representation.segments().is_downloading())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.representation
            .as_ref()
            .is_some_and(|representation| representation.segments().is_initialized())
    }

    /// Whether the next pending extractor segment can be completed.
    ///
    /// Every supporting set must either be downloading or already hold the
    /// segment. A set that is neither will never deliver it.
    #[must_use]
    pub fn can_concatenate(&self) -> bool {
        let Some(segment_id) = self
            .representation
            .as_ref()
            .and_then(|representation| representation.segments().peek_segment())
            .map(|segment| segment.segment_id)
        else {
            return false;
        };
        for supporting in &self.supporting_sets {
            let mut set = supporting.set.lock();
            if set.current().is_downloading() || set.has_segment(segment_id).is_some() {
                continue;
            }
            debug!(
                target: "omaf.dash.extractor",
                extractor = self.id,
                set = supporting.id,
                representation = set.current_representation_id(),
                segment = segment_id,
                "Cannot complete extractor segment, supporting set is missing it"
            );
            metrics::record_concatenation_blocked(BlockReason::NotDownloading);
            return false;
        }
        true
    }

    /// Collect completed downloads and, when in use, feed the parser.
    ///
    /// Inactive supporting sets are started here only while the extractor
    /// itself downloads, so a stopped set is never restarted behind the
    /// player's back.
    ///
    /// # Errors
    ///
    /// `DashError::NoRepresentation` without a representation, or the
    /// parser's rejection of a concatenated segment.
    pub fn process_segment_download(&mut self) -> Result<(), DashError> {
        let id = self.id;
        let Some(representation) = self.representation.as_mut() else {
            return Err(DashError::NoRepresentation(id));
        };
        representation.segments_mut().process_segment_download();

        if self.supporting_sets.is_empty() || !representation.segments().is_initialized() {
            return Ok(());
        }

        let active = representation.segments().is_downloading();
        for supporting in &self.supporting_sets {
            let mut set = supporting.set.lock();
            if set.is_active() {
                set.process_segment_download();
            } else if active {
                debug!(
                    target: "omaf.dash.extractor",
                    extractor = id,
                    set = supporting.id,
                    target_segment = self.target_next_segment_id,
                    "Start downloading supporting set"
                );
                if self.target_next_segment_id > 0 {
                    set.start_download_from_segment(
                        self.target_next_segment_id,
                        Some(self.next_segment_to_be_concatenated),
                    );
                } else {
                    set.start_download(DownloadStart::AtTime(
                        self.download_start_time_ms.unwrap_or_default(),
                    ));
                }
            }
        }

        // Segments of an extractor not in use stay queued for a later switch.
        let ready = representation.ready_for_segment(self.next_segment_to_be_concatenated);
        if self.in_use && ready {
            self.concatenate_and_parse_segments()?;
        }
        Ok(())
    }

    /// Concatenate the next extractor segment with the matching tile
    /// segments and hand it to the parser.
    ///
    /// Returns `Ok(true)` if a segment was parsed, `Ok(false)` if some tile
    /// data is still missing.
    ///
    /// # Errors
    ///
    /// `DashError::NoRepresentation` without a representation, or the
    /// parser's rejection of the concatenated segment.
    pub fn concatenate_and_parse_segments(&mut self) -> Result<bool, DashError> {
        let id = self.id;
        let next = self.next_segment_to_be_concatenated;
        let Some(representation) = self.representation.as_mut() else {
            return Err(DashError::NoRepresentation(id));
        };
        let Some(mut segment_id) = representation
            .segments()
            .peek_segment()
            .map(|segment| segment.segment_id)
        else {
            return Ok(false);
        };
        if segment_id < next {
            trace!(target: "omaf.dash.extractor", extractor = id, segment = segment_id, next, "Too old segment");
            representation.segments_mut().clean_up_old_segments(Some(next));
            match representation.segments().peek_segment() {
                Some(segment) => segment_id = segment.segment_id,
                None => return Ok(false),
            }
        }

        let mut total_size = representation
            .segments()
            .peek_segment()
            .map_or(0, DashSegment::size);
        let mut available = true;
        for supporting in &self.supporting_sets {
            let mut set = supporting.set.lock();
            if set.try_switching_representation(segment_id) {
                metrics::record_tile_switch();
            }
            match set.has_segment(segment_id) {
                Some(size) => total_size += size,
                None => available = false,
            }
        }
        if !available {
            metrics::record_concatenation_blocked(BlockReason::MissingTile);
            return Ok(false);
        }

        let Some(own) = representation.segments_mut().take_segment() else {
            return Ok(false);
        };
        let mut data = BytesMut::with_capacity(total_size);
        data.extend_from_slice(&own.data);
        let mut sources = vec![representation.id().to_owned()];
        for supporting in &self.supporting_sets {
            // Availability was checked above while holding each lock in turn;
            // only this extractor consumes segments, so they are still there.
            if let Some(tile) = supporting.set.lock().take_segment(segment_id) {
                data.extend_from_slice(&tile.data);
                sources.extend(tile.sources);
            }
        }

        let concatenated = DashSegment {
            segment_id,
            init_segment_id: own.init_segment_id,
            data: data.freeze(),
            sources,
        };
        debug!(
            target: "omaf.dash.extractor",
            extractor = id,
            segment = segment_id,
            bytes = concatenated.size(),
            sources = ?concatenated.sources,
            "Concatenated segment"
        );
        metrics::record_segment_concatenated(concatenated.size());
        self.next_segment_to_be_concatenated = segment_id.saturating_add(1);
        representation.parse_concatenated_segment(concatenated)?;
        Ok(true)
    }

    /// Start consuming segments from `segment_id` on.
    pub fn switch_to_this(&mut self, segment_id: SegmentId) {
        debug!(target: "omaf.dash.extractor", extractor = self.id, segment = segment_id, "Switch to this");
        self.in_use = true;
        self.next_segment_to_be_concatenated = segment_id;
        if let Some(representation) = self.representation.as_mut() {
            representation.segments_mut().clean_up_old_segments(Some(segment_id));
        }
        // Segment N-1 may still be downloading, so concatenation re-checks ids.
        for supporting in &self.supporting_sets {
            supporting.set.lock().clean_up_old_segments(Some(segment_id));
        }
    }

    /// Stop consuming segments; buffered data is kept in case the switch is
    /// reverted.
    pub fn switching_to_another(&mut self) {
        if let Some(representation) = self.representation.as_mut() {
            representation.switched_to_another();
        }
        self.in_use = false;
    }

    /// The switch away is final. Buffered extractor data is cleared so a
    /// shared tile set is not held back by a segment left in the parser.
    pub fn switched_to_another(&mut self) {
        debug!(target: "omaf.dash.extractor", extractor = self.id, "Switched to another");
        if let Some(representation) = self.representation.as_mut() {
            representation.clear_downloaded_content();
        }
        self.in_use = false;
    }

    /// Smallest last-downloaded segment id across the extractor and its
    /// supporting sets; sets with nothing downloaded are ignored.
    #[must_use]
    pub fn last_segment_id(&self) -> Option<SegmentId> {
        let representation = self.representation.as_ref()?;
        let mut last = representation.segments().last_segment_id(false);
        for supporting in &self.supporting_sets {
            let id = supporting.set.lock().last_segment_id(false);
            if id > 0 && id < last {
                last = id;
            }
        }
        Some(last)
    }

    fn set_buffering_time(&mut self, expected_ping_time_ms: u32) {
        self.expected_ping_time_ms = expected_ping_time_ms;
        if let Some(representation) = self.representation.as_mut() {
            representation
                .segments_mut()
                .set_buffering_time(expected_ping_time_ms);
        }
        for supporting in &self.supporting_sets {
            supporting.set.lock().set_buffering_time(expected_ping_time_ms);
        }
    }

    /// Start downloading at a presentation time.
    ///
    /// # Errors
    ///
    /// `DashError::NoRepresentation` without a representation.
    pub fn start_download(
        &mut self,
        start_time_ms: u64,
        expected_ping_time_ms: u32,
    ) -> Result<(), DashError> {
        if self.representation.is_none() {
            return Err(DashError::NoRepresentation(self.id));
        }
        debug!(
            target: "omaf.dash.extractor",
            extractor = self.id,
            start_time_ms,
            expected_ping_time_ms,
            "Start download"
        );
        self.set_buffering_time(expected_ping_time_ms);
        self.target_next_segment_id = self.next_segment_to_be_concatenated;
        self.download_start_time_ms = Some(start_time_ms);
        if let Some(representation) = self.representation.as_mut() {
            representation
                .segments_mut()
                .start_download(DownloadStart::AtTime(start_time_ms));
        }
        for supporting in &self.supporting_sets {
            let mut set = supporting.set.lock();
            if !set.is_active() {
                set.start_download_from_segment(
                    self.target_next_segment_id,
                    Some(self.next_segment_to_be_concatenated),
                );
            }
        }
        Ok(())
    }

    /// Start downloading from `target`; `next_to_process` also moves the
    /// concatenation cursor.
    ///
    /// Returns the segment the extractor representation actually starts
    /// from, which skips segments already cached.
    ///
    /// # Errors
    ///
    /// `DashError::NoRepresentation` without a representation.
    pub fn start_download_from_segment(
        &mut self,
        target: SegmentId,
        next_to_process: Option<SegmentId>,
        expected_ping_time_ms: u32,
    ) -> Result<SegmentId, DashError> {
        if self.representation.is_none() {
            return Err(DashError::NoRepresentation(self.id));
        }
        self.set_buffering_time(expected_ping_time_ms);
        self.target_next_segment_id = target;
        if let Some(next) = next_to_process {
            self.next_segment_to_be_concatenated = next;
        }
        let started = match self.representation.as_mut() {
            Some(representation) => representation
                .segments_mut()
                .start_download_from_segment(target, next_to_process),
            None => return Err(DashError::NoRepresentation(self.id)),
        };
        for supporting in &self.supporting_sets {
            let mut set = supporting.set.lock();
            if !set.is_active() {
                debug!(
                    target: "omaf.dash.extractor",
                    extractor = self.id,
                    set = supporting.id,
                    target_segment = target,
                    "Start downloading supporting set"
                );
                set.start_download_from_segment(target, next_to_process);
            }
        }
        Ok(started)
    }

    /// Stop all downloads. Supporting sets also drop their cached segments
    /// and reset their download counters, so a resume never starts with a
    /// gap left by a representation cached over the pause.
    pub fn stop_download(&mut self) {
        for supporting in &self.supporting_sets {
            let mut set = supporting.set.lock();
            set.stop_download();
            set.clean_up_old_segments(None);
        }
        if let Some(representation) = self.representation.as_mut() {
            representation.segments_mut().stop_download();
        }
        self.download_start_time_ms = None;
    }

    /// Stop without waiting for downloads in progress. Supporting sets the
    /// `new_extractor` also depends on keep downloading.
    pub fn stop_download_async(
        &mut self,
        reset: bool,
        new_extractor: Option<&DashAdaptationSetExtractorMr>,
    ) {
        debug!(target: "omaf.dash.extractor", extractor = self.id, reset, "Stop download async");
        for supporting in &self.supporting_sets {
            if new_extractor.is_some_and(|new| new.has_supporting_set(supporting.id)) {
                continue;
            }
            trace!(target: "omaf.dash.extractor", extractor = self.id, set = supporting.id, "Stop supporting set");
            // Never aborted, an aborted segment breaks segment alignment.
            supporting.set.lock().stop_download_async(false, reset);
        }
        if let Some(representation) = self.representation.as_mut() {
            representation.segments_mut().stop_download_async(false, false);
            if reset {
                representation.clear_downloaded_content();
            }
        }
        self.download_start_time_ms = None;
    }

    pub fn clear_downloaded_content(&mut self) {
        if let Some(representation) = self.representation.as_mut() {
            representation.clear_downloaded_content();
        }
        for supporting in &self.supporting_sets {
            supporting.set.lock().clear_downloaded_content();
        }
    }

    /// Whether the extractor or any supporting set is still waiting for
    /// its first data.
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        let own = self.representation.as_ref().is_some_and(|representation| {
            !representation.is_done() && !representation.segments().is_initialized()
        });
        if own {
            trace!(target: "omaf.dash.extractor", extractor = self.id, "Extractor is buffering");
            return true;
        }
        self.supporting_sets.iter().any(|supporting| {
            let set = supporting.set.lock();
            let buffering = set.is_buffering();
            if buffering {
                trace!(
                    target: "omaf.dash.extractor",
                    representation = set.current_representation_id(),
                    "Supporting set is buffering"
                );
            }
            buffering
        })
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.representation
            .as_ref()
            .is_some_and(|representation| representation.segments().is_error())
            || self
                .supporting_sets
                .iter()
                .any(|supporting| supporting.set.lock().is_error())
    }

    /// End of stream follows the extractor representation alone.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.representation
            .as_ref()
            .is_some_and(|representation| representation.segments().is_end_of_stream())
    }

    /// Without a representation there is nothing left to finish.
    #[must_use]
    pub fn is_done(&self) -> bool {
        match self.representation.as_ref() {
            Some(representation) => representation.is_done(),
            None => true,
        }
    }

    /// Bandwidth of the extractor plus every supporting set's current
    /// representation, in bits per second.
    #[must_use]
    pub fn current_bandwidth(&self) -> u64 {
        let own = self
            .representation
            .as_ref()
            .map_or(0, |representation| u64::from(representation.segments().bandwidth()));
        self.supporting_sets
            .iter()
            .map(|supporting| u64::from(supporting.set.lock().bandwidth()))
            .sum::<u64>()
            + own
    }

    /// Whether the extractor and every supporting set can continue from
    /// `next_needed` right now.
    pub fn ready_to_switch(&mut self, next_needed: SegmentId) -> bool {
        if next_needed < self.target_next_segment_id {
            // Leftovers from an earlier preparation may end just before the
            // target; they are cleaned up only once switched to.
            return false;
        }
        let last = self.last_segment_id().unwrap_or_default();
        if last >= next_needed {
            for supporting in &self.supporting_sets {
                let set = supporting.set.lock();
                if set.last_segment_id(false) < next_needed {
                    trace!(
                        target: "omaf.dash.extractor",
                        segment = next_needed,
                        representation = set.current_representation_id(),
                        "Not ready to switch"
                    );
                    return false;
                }
            }
            let own_ready = self.representation.as_mut().is_some_and(|representation| {
                representation.segments_mut().ready_to_switch(next_needed)
            });
            if own_ready {
                return self.supporting_sets.iter().all(|supporting| {
                    supporting
                        .set
                        .lock()
                        .current_mut()
                        .ready_to_switch(next_needed)
                });
            }
        }
        trace!(
            target: "omaf.dash.extractor",
            extractor = self.id,
            segment = next_needed,
            "Extractor not ready to switch"
        );
        false
    }

    /// Keep caches from filling with old segments while a switch to this
    /// extractor is pending.
    pub fn update_progress_during_switch(&mut self, next_to_be_processed: SegmentId) {
        if let Some(representation) = self.representation.as_mut() {
            representation
                .segments_mut()
                .clean_up_old_segments(Some(next_to_be_processed));
        }
        for supporting in &self.supporting_sets {
            supporting
                .set
                .lock()
                .clean_up_old_segments(Some(next_to_be_processed));
        }
    }

    /// Whether this extractor can still deliver `segment_id` while a switch
    /// to `new_extractor` is pending. Sets shared with the new extractor are
    /// not checked; a download in progress counts as available.
    #[must_use]
    pub fn segment_available(
        &self,
        segment_id: SegmentId,
        new_extractor: &DashAdaptationSetExtractorMr,
    ) -> bool {
        let Some(representation) = self.representation.as_ref() else {
            return false;
        };
        if representation.segments().last_segment_id(true) < segment_id {
            return false;
        }
        self.supporting_sets
            .iter()
            .filter(|supporting| !new_extractor.has_supporting_set(supporting.id))
            .all(|supporting| supporting.set.lock().last_segment_id(true) >= segment_id)
    }

    /// Point every supporting set at the tile representations the extractor
    /// representation depends on. Returns `true` if any set started a switch.
    pub fn select_supporting_representations(
        &self,
        dependencies: &[&str],
        next_processed_segment: SegmentId,
    ) -> bool {
        let mut switched = false;
        for supporting in &self.supporting_sets {
            let mut set = supporting.set.lock();
            for dependency in dependencies {
                if set.select_representation(dependency, next_processed_segment) {
                    switched = true;
                    break;
                }
            }
        }
        switched
    }
}
