//! Encoded packets and decoded frames.

use crate::config::{DecoderConfig, PixelFormat};
use bytes::Bytes;
use common::types::StreamId;
use std::sync::atomic::{AtomicU64, Ordering};

/// One encoded access unit handed to a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub pts_us: u64,
    pub dts_us: u64,
    pub duration_us: u64,
    pub is_keyframe: bool,
    pub data: Bytes,
}

impl MediaPacket {
    #[must_use]
    pub fn new(pts_us: u64, duration_us: u64, data: Bytes) -> Self {
        Self {
            pts_us,
            dts_us: pts_us,
            duration_us,
            is_keyframe: false,
            data,
        }
    }

    #[must_use]
    pub fn keyframe(mut self) -> Self {
        self.is_keyframe = true;
        self
    }
}

/// A decoded picture plus its presentation metadata.
///
/// Frames are owned values that move between the free list of their stream,
/// the decoder, the decoded queue, the staged slot and the active (on screen)
/// slot. A frame is never in two places at once. Within one stream the
/// presentation timestamp identifies a frame.
#[derive(Debug)]
pub struct DecoderFrame {
    id: u64,
    pub stream: StreamId,
    pub pts: u64,
    pub dts: u64,
    pub duration: u64,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Playback time at which the frame was uploaded, `None` until then.
    pub upload_time: Option<u64>,
    pub consumed: bool,
    pub staged: bool,
    pub flushed: bool,
    data: Vec<u8>,
}

impl DecoderFrame {
    /// Allocate a frame for pictures of the given size.
    #[must_use]
    pub fn new(stream: StreamId, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: FRAME_COUNTER.fetch_add(1, Ordering::Relaxed),
            stream,
            pts: 0,
            dts: 0,
            duration: 0,
            width,
            height,
            pixel_format,
            upload_time: None,
            consumed: false,
            staged: false,
            flushed: false,
            data: Vec::new(),
        }
    }

    /// Allocate a frame matching a stream configuration.
    #[must_use]
    pub fn for_config(stream: StreamId, config: &DecoderConfig) -> Self {
        Self::new(stream, config.width, config.height, config.pixel_format)
    }

    /// Process-unique frame buffer id; stable across reuse.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reset per-use state when the frame is handed to a decoder.
    pub fn reset_for(&mut self, stream: StreamId) {
        self.stream = stream;
        self.pts = 0;
        self.dts = 0;
        self.duration = 0;
        self.upload_time = None;
        self.consumed = false;
        self.staged = false;
        self.flushed = false;
    }

    /// Whether the frame buffer can hold pictures of the given configuration.
    #[must_use]
    pub fn matches(&self, width: u32, height: u32, pixel_format: PixelFormat) -> bool {
        self.width == width && self.height == height && self.pixel_format == pixel_format
    }

    /// Fill the frame from a decoded packet, reusing the existing allocation.
    pub fn copy_from(&mut self, packet: &MediaPacket) {
        let capacity = self
            .pixel_format
            .buffer_size(self.width, self.height)
            .min(packet.data.len());
        self.data.clear();
        self.data
            .extend_from_slice(packet.data.get(..capacity).unwrap_or_default());
        self.pts = packet.pts_us;
        self.dts = packet.dts_us;
        self.duration = packet.duration_us;
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Metadata view used by synchronization results.
    #[must_use]
    pub fn info(&self, is_active: bool) -> SyncedFrame {
        SyncedFrame {
            stream: self.stream,
            pts: self.pts,
            dts: self.dts,
            duration: self.duration,
            width: self.width,
            height: self.height,
            is_active,
        }
    }
}

/// A frame picked for presentation by the frame cache.
///
/// The frame itself stays inside the cache; `is_active` tells whether it is
/// already the frame on screen for its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncedFrame {
    pub stream: StreamId,
    pub pts: u64,
    pub dts: u64,
    pub duration: u64,
    pub width: u32,
    pub height: u32,
    pub is_active: bool,
}
