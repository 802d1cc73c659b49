//! Synthetic DASH content for headless playback.
//!
//! `SyntheticSegmentStream` stands in for the HTTP segment downloader: each
//! poll completes the next segment, so the provider loop controls the
//! download pace. `SampleParser` stands in for the MP4 parser of the merged
//! extractor track and splits every concatenated segment into one packet per
//! frame.

use bytes::{BufMut, BytesMut};
use common::types::SegmentId;
use dash_provider::{DashError, DashSegment, DownloadStart, SegmentParser, SegmentStream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};
use video_decoder::MediaPacket;

/// Shape of the generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticContent {
    pub segment_count: u32,
    pub segment_duration_ms: u64,
    pub payload_len: usize,
}

/// Segment downloads that complete on every poll.
#[derive(Debug)]
pub struct SyntheticSegmentStream {
    name: String,
    content: SyntheticContent,
    next_segment: SegmentId,
    downloading: bool,
}

impl SyntheticSegmentStream {
    pub fn new(name: impl Into<String>, content: SyntheticContent) -> Self {
        Self {
            name: name.into(),
            content,
            next_segment: 1,
            downloading: false,
        }
    }

    fn segment(&self, segment_id: SegmentId) -> DashSegment {
        let mut data = BytesMut::with_capacity(self.content.payload_len.max(4));
        data.put_u32(segment_id);
        data.resize(self.content.payload_len.max(4), 0);
        DashSegment::new(segment_id, 1, data.freeze())
    }
}

impl SegmentStream for SyntheticSegmentStream {
    fn start(&mut self, start: DownloadStart) {
        self.next_segment = match start {
            DownloadStart::AtTime(start_ms) => {
                let index = start_ms / self.content.segment_duration_ms.max(1);
                SegmentId::try_from(index)
                    .unwrap_or(SegmentId::MAX)
                    .saturating_add(1)
            }
            DownloadStart::FromSegment(segment_id) => segment_id.max(1),
        };
        debug!(
            target: "omaf.player.content",
            stream = %self.name,
            segment = self.next_segment,
            "Synthetic download started"
        );
        self.downloading = true;
    }

    fn stop(&mut self, _abort: bool) {
        self.downloading = false;
    }

    fn poll_completed(&mut self) -> Vec<DashSegment> {
        if !self.downloading || self.next_segment > self.content.segment_count {
            return Vec::new();
        }
        let segment = self.segment(self.next_segment);
        trace!(target: "omaf.player.content", stream = %self.name, segment = self.next_segment, "Segment complete");
        self.next_segment = self.next_segment.saturating_add(1);
        vec![segment]
    }

    fn is_completing_download(&self) -> bool {
        self.downloading && self.next_segment <= self.content.segment_count
    }

    fn is_buffering(&self) -> bool {
        false
    }

    fn is_error(&self) -> bool {
        false
    }

    fn is_end_of_stream(&self) -> bool {
        self.next_segment > self.content.segment_count
    }

    fn clear_downloaded_segments(&mut self) {}
}

/// Packets parsed from concatenated segments, shared by the parser and the
/// provider loop.
#[derive(Debug, Clone, Default)]
pub struct PacketQueue(Arc<Mutex<VecDeque<MediaPacket>>>);

impl PacketQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, packet: MediaPacket) {
        self.0.lock().push_back(packet);
    }

    /// Put a packet the decoder could not take back at the head.
    pub fn push_front(&self, packet: MediaPacket) {
        self.0.lock().push_front(packet);
    }

    #[must_use]
    pub fn pop(&self) -> Option<MediaPacket> {
        self.0.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Splits each concatenated segment into per-frame packets.
#[derive(Debug)]
pub struct SampleParser {
    packets: PacketQueue,
    frame_duration_us: u64,
    frames_per_segment: u64,
    last_segment: Option<SegmentId>,
}

impl SampleParser {
    #[must_use]
    pub fn new(packets: PacketQueue, frame_duration_us: u64, frames_per_segment: u64) -> Self {
        Self {
            packets,
            frame_duration_us,
            frames_per_segment,
            last_segment: None,
        }
    }
}

impl SegmentParser for SampleParser {
    fn add_segment(&mut self, segment: DashSegment) -> Result<(), DashError> {
        if segment.segment_id == 0 || segment.data.len() < 4 {
            return Err(DashError::ParserRejected {
                segment: segment.segment_id,
                reason: format!("truncated segment of {} bytes", segment.data.len()),
            });
        }
        let segment_start_us = u64::from(segment.segment_id.saturating_sub(1))
            .saturating_mul(self.frames_per_segment)
            .saturating_mul(self.frame_duration_us);
        for frame in 0..self.frames_per_segment {
            let pts = segment_start_us.saturating_add(frame.saturating_mul(self.frame_duration_us));
            let mut packet = MediaPacket::new(pts, self.frame_duration_us, segment.data.clone());
            if frame == 0 {
                packet = packet.keyframe();
            }
            self.packets.push(packet);
        }
        trace!(
            target: "omaf.player.content",
            segment = segment.segment_id,
            sources = ?segment.sources,
            "Segment parsed"
        );
        self.last_segment = Some(segment.segment_id);
        Ok(())
    }

    fn ready_for_segment(&self, _segment_id: SegmentId) -> bool {
        // Keep at most two segments of samples ahead of the decoder.
        let queued = u64::try_from(self.packets.len()).unwrap_or(u64::MAX);
        queued < self.frames_per_segment.saturating_mul(2)
    }

    fn is_initialized(&self) -> bool {
        self.last_segment.is_some()
    }

    fn is_done(&self) -> bool {
        self.packets.is_empty()
    }

    fn release_all_segments(&mut self) {
        self.packets.clear();
    }
}
