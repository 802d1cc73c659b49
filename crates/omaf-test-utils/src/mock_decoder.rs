//! Mock decoder pool and engine.
//!
//! `MockDecoderPool` hands out `MockDecoder` engines that decode a packet
//! into a free frame of the frame cache right away (no reorder delay). Every
//! reservation, release, decode and flush is counted, and flushes are
//! appended to a shared [`EventLog`] so tests can check call ordering across
//! the decoder and the frame cache.
//!
//! # Example
//!
//! ```rust,ignore
//! use omaf_test_utils::{EventLog, MockDecoderPool};
//!
//! let events = EventLog::new();
//! let pool = MockDecoderPool::new(frame_cache.clone())
//!     .with_capacity(1)
//!     .with_events(events.clone());
//!
//! // ... run the manager ...
//! assert_eq!(pool.reserve_calls(), 2);
//! assert_eq!(pool.failed_reservations(), 1);
//! ```

use common::types::StreamId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use video_decoder::{
    DecodeResult, DecoderConfig, DecoderPool, FlushOrder, FrameCache, MediaPacket, VideoDecoderHw,
};

/// A collaborator call worth ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DecoderFlushed(StreamId),
    CacheDeactivated(StreamId),
    CacheFlushed(StreamId),
}

/// Shared, ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

#[derive(Debug, Default)]
struct Counters {
    reserve_calls: AtomicUsize,
    failed_reservations: AtomicUsize,
    releases: AtomicUsize,
    decode_calls: AtomicUsize,
    flushes: AtomicUsize,
    reserved: AtomicUsize,
    pre_warmed: AtomicUsize,
}

/// Engine returned by [`MockDecoderPool`].
pub struct MockDecoder {
    stream: Option<StreamId>,
    frame_cache: Arc<dyn FrameCache>,
    counters: Arc<Counters>,
    events: EventLog,
    input_eos: bool,
    full: Arc<AtomicBool>,
}

impl VideoDecoderHw for MockDecoder {
    fn decode_frame(&mut self, stream: StreamId, packet: &MediaPacket, _seeking: bool) -> DecodeResult {
        self.counters.decode_calls.fetch_add(1, Ordering::SeqCst);
        self.stream = Some(stream);
        if self.full.load(Ordering::SeqCst) {
            return DecodeResult::DecoderFull;
        }
        let Some(mut frame) = self.frame_cache.acquire_free_frame(stream) else {
            return DecodeResult::DecoderFull;
        };
        frame.copy_from(packet);
        self.frame_cache.add_decoded_frame(frame);
        DecodeResult::PacketAccepted
    }

    fn flush(&mut self) {
        self.counters.flushes.fetch_add(1, Ordering::SeqCst);
        if let Some(stream) = self.stream {
            self.events.push(Event::DecoderFlushed(stream));
        }
        self.input_eos = false;
    }

    fn is_eos(&self) -> bool {
        self.input_eos
    }

    fn set_input_eos(&mut self) {
        self.input_eos = true;
    }

    fn is_input_eos(&self) -> bool {
        self.input_eos
    }
}

/// Decoder pool with a fixed capacity and call counters.
pub struct MockDecoderPool {
    frame_cache: Arc<dyn FrameCache>,
    capacity: usize,
    flush_order: FlushOrder,
    counters: Arc<Counters>,
    events: EventLog,
    full: Arc<AtomicBool>,
}

impl MockDecoderPool {
    pub fn new(frame_cache: Arc<dyn FrameCache>) -> Self {
        Self {
            frame_cache,
            capacity: usize::MAX,
            flush_order: FlushOrder::DecoderFirst,
            counters: Arc::new(Counters::default()),
            events: EventLog::new(),
            full: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Limit the number of engines reserved at the same time.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_flush_order(mut self, flush_order: FlushOrder) -> Self {
        self.flush_order = flush_order;
        self
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Make every engine report `DecoderFull` until cleared.
    pub fn set_full(&self, full: bool) {
        self.full.store(full, Ordering::SeqCst);
    }

    pub fn reserve_calls(&self) -> usize {
        self.counters.reserve_calls.load(Ordering::SeqCst)
    }

    pub fn failed_reservations(&self) -> usize {
        self.counters.failed_reservations.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    /// Packets that reached an engine.
    pub fn decode_calls(&self) -> usize {
        self.counters.decode_calls.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.counters.flushes.load(Ordering::SeqCst)
    }

    /// Engines currently handed out.
    pub fn reserved(&self) -> usize {
        self.counters.reserved.load(Ordering::SeqCst)
    }

    pub fn pre_warmed(&self) -> usize {
        self.counters.pre_warmed.load(Ordering::SeqCst)
    }
}

impl DecoderPool for MockDecoderPool {
    fn reserve(&self, _config: &DecoderConfig) -> Option<Box<dyn VideoDecoderHw>> {
        self.counters.reserve_calls.fetch_add(1, Ordering::SeqCst);
        let capacity = self.capacity;
        let reserved = self
            .counters
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < capacity).then_some(current + 1)
            });
        if reserved.is_err() {
            self.counters.failed_reservations.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        Some(Box::new(MockDecoder {
            stream: None,
            frame_cache: Arc::clone(&self.frame_cache),
            counters: Arc::clone(&self.counters),
            events: self.events.clone(),
            input_eos: false,
            full: Arc::clone(&self.full),
        }))
    }

    fn release(&self, decoder: Box<dyn VideoDecoderHw>) {
        drop(decoder);
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        let _ = self
            .counters
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });
    }

    fn flush_order(&self) -> FlushOrder {
        self.flush_order
    }

    fn create_video_decoders(&self, _codec: video_decoder::VideoCodec, count: usize) {
        self.counters.pre_warmed.fetch_add(count, Ordering::SeqCst);
    }
}
