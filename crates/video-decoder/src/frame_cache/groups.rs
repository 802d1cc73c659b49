//! Per-stream frame lists: the free list and the decoded queue.

use crate::config::{DecoderConfig, PixelFormat};
use crate::frame::DecoderFrame;
use common::types::StreamId;
use std::collections::VecDeque;

/// Frames a stream's decoder may fill.
///
/// The group only hands out frames between `activate` and `deactivate`.
#[derive(Debug)]
pub(crate) struct FreeFrameGroup {
    stream: StreamId,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    active: bool,
    frames: VecDeque<DecoderFrame>,
}

impl FreeFrameGroup {
    pub(crate) fn new(stream: StreamId, config: &DecoderConfig) -> Self {
        Self {
            stream,
            width: config.width,
            height: config.height,
            pixel_format: config.pixel_format,
            active: false,
            frames: VecDeque::new(),
        }
    }

    pub(crate) fn width(&self) -> u32 {
        self.width
    }

    pub(crate) fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn activate(&mut self, frames: Vec<DecoderFrame>) {
        self.frames.extend(frames);
        self.active = true;
    }

    /// Hand back every free frame; an inactive group returns nothing.
    pub(crate) fn deactivate(&mut self) -> Vec<DecoderFrame> {
        if !self.active {
            return Vec::new();
        }
        self.active = false;
        self.frames.drain(..).collect()
    }

    pub(crate) fn acquire(&mut self) -> Option<DecoderFrame> {
        let mut frame = self.frames.pop_front()?;
        frame.reset_for(self.stream);
        Some(frame)
    }

    /// Return a frame to the free list, or give it back when the group is
    /// not active or the frame was sized for another configuration, so the
    /// caller can recycle it elsewhere.
    pub(crate) fn give_back(&mut self, frame: DecoderFrame) -> Result<(), DecoderFrame> {
        if !self.active || !frame.matches(self.width, self.height, self.pixel_format) {
            return Err(frame);
        }
        self.frames.push_back(frame);
        Ok(())
    }
}

/// Decoded frames of one stream in ascending PTS order, plus the frames
/// waiting to be recycled and an optional pre-staged frame.
#[derive(Debug, Default)]
pub(crate) struct DecodedFrameGroup {
    frames: VecDeque<DecoderFrame>,
    discarded: Vec<DecoderFrame>,
    staged: Option<DecoderFrame>,
}

impl DecodedFrameGroup {
    /// Insert in PTS order. A frame whose PTS is already queued is handed back.
    pub(crate) fn add(&mut self, frame: DecoderFrame) -> Result<(), DecoderFrame> {
        if self.frames.back().map_or(true, |last| frame.pts > last.pts) {
            self.frames.push_back(frame);
            return Ok(());
        }
        match self.frames.binary_search_by_key(&frame.pts, |queued| queued.pts) {
            Ok(_) => Err(frame),
            Err(position) => {
                self.frames.insert(position, frame);
                Ok(())
            }
        }
    }

    /// Newest frame at or before `target_pts`, skipped if it is older than
    /// `too_old_threshold`.
    pub(crate) fn find_with_pts(
        &self,
        target_pts: u64,
        too_old_threshold: u64,
    ) -> Option<&DecoderFrame> {
        let candidate = self.frames.iter().rev().find(|frame| frame.pts <= target_pts)?;
        (target_pts - candidate.pts < too_old_threshold).then_some(candidate)
    }

    pub(crate) fn remove(&mut self, pts: u64) -> Option<DecoderFrame> {
        let position = self.frames.iter().position(|frame| frame.pts == pts)?;
        self.frames.remove(position)
    }

    /// Move every frame with a PTS below `target_pts` to the discarded list.
    pub(crate) fn discard_below(&mut self, target_pts: u64) -> usize {
        let count = self
            .frames
            .iter()
            .take_while(|frame| frame.pts < target_pts)
            .count();
        self.discarded.extend(self.frames.drain(..count));
        count
    }

    pub(crate) fn take_discarded(&mut self) -> Vec<DecoderFrame> {
        std::mem::take(&mut self.discarded)
    }

    /// Empty the queue; returns every frame that must be recycled.
    pub(crate) fn flush(&mut self) -> Vec<DecoderFrame> {
        self.discard_below(u64::MAX);
        let mut released = self.take_discarded();
        released.extend(self.staged.take());
        released
    }

    /// Drain everything, queued frames included.
    pub(crate) fn drain_all(&mut self) -> Vec<DecoderFrame> {
        let mut released = self.flush();
        released.extend(self.frames.drain(..));
        released
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn oldest_pts(&self) -> Option<u64> {
        self.frames.front().map(|frame| frame.pts)
    }

    pub(crate) fn discarded_len(&self) -> usize {
        self.discarded.len()
    }

    /// Move a queued frame into the staged slot. Returns the previously
    /// staged frame for recycling, or `Err(())` if the PTS is not queued.
    pub(crate) fn stage(&mut self, pts: u64) -> Result<Option<DecoderFrame>, ()> {
        let mut frame = self.remove(pts).ok_or(())?;
        frame.staged = true;
        Ok(self.staged.replace(frame))
    }

    pub(crate) fn fetch_staged(&mut self) -> Option<DecoderFrame> {
        let mut frame = self.staged.take()?;
        frame.staged = false;
        Some(frame)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::VideoCodec;

    fn config() -> DecoderConfig {
        DecoderConfig::new(VideoCodec::Avc, 4, 4, PixelFormat::Nv12)
    }

    fn frame_at(pts: u64) -> DecoderFrame {
        let mut frame = DecoderFrame::for_config(StreamId(0), &config());
        frame.pts = pts;
        frame
    }

    fn queued_pts(group: &DecodedFrameGroup) -> Vec<u64> {
        group.frames.iter().map(|f| f.pts).collect()
    }

    #[test]
    fn test_add_keeps_pts_order() {
        let mut group = DecodedFrameGroup::default();
        for pts in [40, 10, 30, 20, 50] {
            group.add(frame_at(pts)).unwrap();
        }
        assert_eq!(queued_pts(&group), vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_add_rejects_duplicate_pts() {
        let mut group = DecodedFrameGroup::default();
        group.add(frame_at(10)).unwrap();
        group.add(frame_at(20)).unwrap();
        let rejected = group.add(frame_at(10)).unwrap_err();
        assert_eq!(rejected.pts, 10);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_find_picks_newest_at_or_before_target() {
        let mut group = DecodedFrameGroup::default();
        for pts in [0, 33_000, 66_000] {
            group.add(frame_at(pts)).unwrap();
        }
        assert_eq!(group.find_with_pts(50_000, 99_000).unwrap().pts, 33_000);
        assert_eq!(group.find_with_pts(66_000, 99_000).unwrap().pts, 66_000);
        assert!(group.find_with_pts(200_000, 99_000).is_none());
    }

    #[test]
    fn test_discard_below_moves_to_discarded() {
        let mut group = DecodedFrameGroup::default();
        for pts in [10, 20, 30] {
            group.add(frame_at(pts)).unwrap();
        }
        assert_eq!(group.discard_below(25), 2);
        assert_eq!(queued_pts(&group), vec![30]);
        assert_eq!(group.discarded_len(), 2);
        assert_eq!(group.take_discarded().len(), 2);
        assert_eq!(group.discarded_len(), 0);
    }

    #[test]
    fn test_stage_replaces_previous() {
        let mut group = DecodedFrameGroup::default();
        group.add(frame_at(10)).unwrap();
        group.add(frame_at(20)).unwrap();

        assert!(group.stage(10).unwrap().is_none());
        let previous = group.stage(20).unwrap().unwrap();
        assert_eq!(previous.pts, 10);
        assert!(group.stage(99).is_err());

        let staged = group.fetch_staged().unwrap();
        assert_eq!(staged.pts, 20);
        assert!(!staged.staged);
        assert!(group.fetch_staged().is_none());
    }

    #[test]
    fn test_flush_releases_everything() {
        let mut group = DecodedFrameGroup::default();
        for pts in [10, 20, 30] {
            group.add(frame_at(pts)).unwrap();
        }
        group.stage(30).unwrap();
        group.discard_below(15);
        let released = group.flush();
        assert_eq!(released.len(), 3);
        assert_eq!(group.len(), 0);
        assert!(group.fetch_staged().is_none());
    }

    #[test]
    fn test_free_group_inactive_hands_frames_back() {
        let mut group = FreeFrameGroup::new(StreamId(2), &config());
        assert!(group.give_back(frame_at(0)).is_err());
        assert!(group.acquire().is_none());

        group.activate(vec![frame_at(0), frame_at(0)]);
        let frame = group.acquire().unwrap();
        assert_eq!(frame.stream, StreamId(2));
        assert_eq!(group.len(), 1);
        group.give_back(frame).unwrap();

        assert_eq!(group.deactivate().len(), 2);
        assert!(!group.is_active());
        assert!(group.deactivate().is_empty());
    }

    #[test]
    fn test_free_group_refuses_frames_of_another_size() {
        let mut group = FreeFrameGroup::new(StreamId(2), &config());
        group.activate(Vec::new());

        let larger = DecoderConfig::new(VideoCodec::Avc, 8, 8, PixelFormat::Nv12);
        let stranger = DecoderFrame::for_config(StreamId(2), &larger);
        let refused = group.give_back(stranger).unwrap_err();
        assert_eq!((refused.width, refused.height), (8, 8));
        assert_eq!(group.len(), 0);

        group.give_back(frame_at(0)).unwrap();
        assert_eq!(group.len(), 1);
    }
}
