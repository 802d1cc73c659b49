//! Pass-through decoder engine.
//!
//! `NullDecoder` treats every packet payload as an already decoded picture.
//! It holds up to `output_delay` pictures before delivering them, like a
//! hardware engine with a reorder queue, which makes it a realistic stand-in
//! for the headless player and for tests.

use crate::config::{DecoderConfig, VideoCodec};
use crate::decoder::{DecoderPool, FlushOrder, VideoDecoderHw};
use crate::errors::DecodeResult;
use crate::frame::{DecoderFrame, MediaPacket};
use crate::frame_cache::FrameCache;
use common::types::StreamId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of engines a pool can hand out at once.
pub const DEFAULT_DECODER_CAPACITY: usize = 8;

/// Null decoder pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullDecoderConfig {
    /// Engines that may be reserved at the same time.
    pub capacity: usize,
    /// Pictures held inside an engine before delivery.
    pub output_delay: usize,
    /// Whether engines hold cache frames between calls.
    pub holds_frames: bool,
}

impl Default for NullDecoderConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DECODER_CAPACITY,
            output_delay: 1,
            holds_frames: true,
        }
    }
}

pub struct NullDecoder {
    frame_cache: Arc<dyn FrameCache>,
    output_delay: usize,
    in_flight: VecDeque<DecoderFrame>,
    input_eos: bool,
}

impl NullDecoder {
    #[must_use]
    pub fn new(frame_cache: Arc<dyn FrameCache>, output_delay: usize) -> Self {
        Self {
            frame_cache,
            output_delay,
            in_flight: VecDeque::new(),
            input_eos: false,
        }
    }

    /// Pictures decoded but not yet delivered to the frame cache.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.in_flight.len()
    }

    fn deliver(&mut self, keep: usize) {
        while self.in_flight.len() > keep {
            if let Some(frame) = self.in_flight.pop_front() {
                self.frame_cache.add_decoded_frame(frame);
            }
        }
    }
}

impl VideoDecoderHw for NullDecoder {
    fn decode_frame(
        &mut self,
        stream: StreamId,
        packet: &MediaPacket,
        seeking: bool,
    ) -> DecodeResult {
        if self.input_eos {
            warn!(
                target: "omaf.decoder.null",
                stream = %stream,
                pts = packet.pts_us,
                "Packet after input end of stream"
            );
            return DecodeResult::DecoderError;
        }
        let Some(mut frame) = self.frame_cache.acquire_free_frame(stream) else {
            return DecodeResult::DecoderFull;
        };
        frame.copy_from(packet);
        self.in_flight.push_back(frame);

        let keep = if seeking { 0 } else { self.output_delay };
        self.deliver(keep);
        DecodeResult::PacketAccepted
    }

    fn flush(&mut self) {
        for frame in self.in_flight.drain(..) {
            self.frame_cache.release_frame(frame);
        }
        self.input_eos = false;
    }

    fn is_eos(&self) -> bool {
        self.input_eos && self.in_flight.is_empty()
    }

    fn set_input_eos(&mut self) {
        self.input_eos = true;
        self.deliver(0);
    }

    fn is_input_eos(&self) -> bool {
        self.input_eos
    }
}

impl Drop for NullDecoder {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Bounded pool of [`NullDecoder`] engines.
pub struct NullDecoderPool {
    frame_cache: Arc<dyn FrameCache>,
    config: NullDecoderConfig,
    capacity: AtomicUsize,
    reserved: AtomicUsize,
}

impl NullDecoderPool {
    #[must_use]
    pub fn new(frame_cache: Arc<dyn FrameCache>, config: NullDecoderConfig) -> Self {
        let capacity = AtomicUsize::new(config.capacity);
        Self {
            frame_cache,
            config,
            capacity,
            reserved: AtomicUsize::new(0),
        }
    }

    /// Engines currently handed out.
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }
}

impl DecoderPool for NullDecoderPool {
    fn reserve(&self, config: &DecoderConfig) -> Option<Box<dyn VideoDecoderHw>> {
        let capacity = self.capacity();
        let reserved = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < capacity).then_some(current + 1)
            });
        if reserved.is_err() {
            debug!(
                target: "omaf.decoder.null",
                capacity,
                codec = ?config.codec,
                "Decoder pool exhausted"
            );
            return None;
        }
        Some(Box::new(NullDecoder::new(
            Arc::clone(&self.frame_cache),
            self.config.output_delay,
        )))
    }

    fn release(&self, decoder: Box<dyn VideoDecoderHw>) {
        drop(decoder);
        let released = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });
        if released.is_err() {
            warn!(
                target: "omaf.decoder.null",
                "Decoder released without a matching reservation"
            );
        }
    }

    fn flush_order(&self) -> FlushOrder {
        if self.config.holds_frames {
            FlushOrder::DecoderFirst
        } else {
            FlushOrder::CacheFirst
        }
    }

    fn create_video_decoders(&self, codec: VideoCodec, count: usize) {
        let previous = self.capacity.fetch_max(count, Ordering::SeqCst);
        debug!(
            target: "omaf.decoder.null",
            codec = ?codec,
            count,
            capacity = previous.max(count),
            "Pre-created decoders"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{FrameCacheConfig, PixelFormat};
    use crate::frame_cache::PooledFrameCache;
    use crate::texture::HeadlessTextureBackend;
    use bytes::Bytes;

    fn setup() -> (Arc<PooledFrameCache>, StreamId) {
        let cache = Arc::new(
            PooledFrameCache::new(
                FrameCacheConfig::default(),
                Arc::new(HeadlessTextureBackend::new()),
            )
            .unwrap(),
        );
        let stream = StreamId(0);
        let config = DecoderConfig::new(VideoCodec::Avc, 8, 8, PixelFormat::Nv12);
        cache.initialize_stream(stream, &config).unwrap();
        cache.activate_stream(stream).unwrap();
        (cache, stream)
    }

    fn packet(pts: u64) -> MediaPacket {
        MediaPacket::new(pts, 33_333, Bytes::from_static(b"picture"))
    }

    #[test]
    fn test_output_delay_holds_frames() {
        let (cache, stream) = setup();
        let mut decoder = NullDecoder::new(cache.clone(), 1);

        assert_eq!(
            decoder.decode_frame(stream, &packet(0), false),
            DecodeResult::PacketAccepted
        );
        assert_eq!(cache.decoded_frame_count(stream), 0);
        assert_eq!(decoder.pending_frames(), 1);

        decoder.decode_frame(stream, &packet(33_333), false);
        assert_eq!(cache.decoded_frame_count(stream), 1);
    }

    #[test]
    fn test_seeking_drains_output() {
        let (cache, stream) = setup();
        let mut decoder = NullDecoder::new(cache.clone(), 2);
        decoder.decode_frame(stream, &packet(0), true);
        assert_eq!(cache.decoded_frame_count(stream), 1);
        assert_eq!(decoder.pending_frames(), 0);
    }

    #[test]
    fn test_full_when_no_free_frames() {
        let (cache, stream) = setup();
        let mut decoder = NullDecoder::new(cache.clone(), 0);
        for index in 0..3 {
            assert_eq!(
                decoder.decode_frame(stream, &packet(index * 33_333), false),
                DecodeResult::PacketAccepted
            );
        }
        assert_eq!(
            decoder.decode_frame(stream, &packet(100_000), false),
            DecodeResult::DecoderFull
        );
    }

    #[test]
    fn test_input_eos_delivers_pending_frames() {
        let (cache, stream) = setup();
        let mut decoder = NullDecoder::new(cache.clone(), 2);
        decoder.decode_frame(stream, &packet(0), false);
        assert!(!decoder.is_eos());

        decoder.set_input_eos();
        assert!(decoder.is_input_eos());
        assert!(decoder.is_eos());
        assert_eq!(cache.decoded_frame_count(stream), 1);
        assert_eq!(
            decoder.decode_frame(stream, &packet(33_333), false),
            DecodeResult::DecoderError
        );
    }

    #[test]
    fn test_flush_returns_held_frames() {
        let (cache, stream) = setup();
        let mut decoder = NullDecoder::new(cache.clone(), 2);
        decoder.decode_frame(stream, &packet(0), false);
        decoder.decode_frame(stream, &packet(33_333), false);
        assert_eq!(cache.free_frame_count(stream), 1);

        decoder.flush();
        assert_eq!(cache.free_frame_count(stream), 3);
        assert!(!decoder.is_input_eos());
    }

    #[test]
    fn test_pool_capacity() {
        let (cache, _) = setup();
        let pool = NullDecoderPool::new(
            cache,
            NullDecoderConfig {
                capacity: 1,
                ..NullDecoderConfig::default()
            },
        );
        let config = DecoderConfig::new(VideoCodec::Hevc, 8, 8, PixelFormat::Nv12);

        let first = pool.reserve(&config).unwrap();
        assert!(pool.reserve(&config).is_none());
        pool.release(first);
        assert_eq!(pool.reserved(), 0);
        assert!(pool.reserve(&config).is_some());
    }

    #[test]
    fn test_unmatched_release_keeps_reservation_count() {
        let (cache, _) = setup();
        let pool = NullDecoderPool::new(
            cache.clone(),
            NullDecoderConfig {
                capacity: 1,
                ..NullDecoderConfig::default()
            },
        );
        let config = DecoderConfig::new(VideoCodec::Avc, 8, 8, PixelFormat::Nv12);

        let reserved = pool.reserve(&config).unwrap();
        pool.release(reserved);
        pool.release(Box::new(NullDecoder::new(cache, 0)));
        assert_eq!(pool.reserved(), 0);

        let first = pool.reserve(&config).unwrap();
        assert!(pool.reserve(&config).is_none());
        pool.release(first);
        assert_eq!(pool.reserved(), 0);
    }

    #[test]
    fn test_create_video_decoders_grows_capacity() {
        let (cache, _) = setup();
        let pool = NullDecoderPool::new(
            cache,
            NullDecoderConfig {
                capacity: 1,
                ..NullDecoderConfig::default()
            },
        );
        pool.create_video_decoders(VideoCodec::Hevc, 4);
        assert_eq!(pool.capacity(), 4);
        pool.create_video_decoders(VideoCodec::Hevc, 2);
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn test_flush_order_follows_config() {
        let (cache, _) = setup();
        let pool = NullDecoderPool::new(
            cache,
            NullDecoderConfig {
                holds_frames: false,
                ..NullDecoderConfig::default()
            },
        );
        assert_eq!(pool.flush_order(), FlushOrder::CacheFirst);
    }
}
