//! Decoder engine and decoder pool contracts.
//!
//! Platform codec wrappers implement [`VideoDecoderHw`]; a [`DecoderPool`]
//! hands them out per stream. The manager only ever talks to these traits,
//! so every platform pool is injected at construction.

use crate::config::{DecoderConfig, VideoCodec};
use crate::errors::DecodeResult;
use crate::frame::MediaPacket;
use common::types::StreamId;

/// A decoder engine bound to one stream at a time.
///
/// Decoded pictures are delivered asynchronously into the frame cache the
/// engine was created with.
pub trait VideoDecoderHw: Send {
    /// Feed one packet. `seeking` asks the engine to drain output eagerly.
    fn decode_frame(&mut self, stream: StreamId, packet: &MediaPacket, seeking: bool)
        -> DecodeResult;

    /// Drop all queued input and output.
    fn flush(&mut self);

    /// Whether the last input has been decoded and delivered.
    fn is_eos(&self) -> bool;

    /// Signal that no more packets follow.
    fn set_input_eos(&mut self);

    fn is_input_eos(&self) -> bool;
}

/// Order of flushing when a stream with active frame buffers is deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOrder {
    /// Engines that keep frame-cache buffers between decode calls must give
    /// them back before the cache reclaims the stream's frames.
    DecoderFirst,
    /// Engines that never hold cache buffers between calls.
    CacheFirst,
}

/// Source of decoder engines for one platform.
pub trait DecoderPool: Send + Sync {
    /// Reserve an engine for a stream configuration; `None` if exhausted.
    fn reserve(&self, config: &DecoderConfig) -> Option<Box<dyn VideoDecoderHw>>;

    /// Return an engine to the pool.
    fn release(&self, decoder: Box<dyn VideoDecoderHw>);

    fn flush_order(&self) -> FlushOrder;

    /// Hint to pre-create engines before playback starts.
    fn create_video_decoders(&self, _codec: VideoCodec, _count: usize) {}
}
