//! Video decoder manager.
//!
//! Maps logical streams to decoder engines and frame-cache queues and
//! enforces the buffering and synchronization policy for one playback
//! session. The manager is shared by `Arc` between the provider side, which
//! performs the structural transitions (initialize, activate, deactivate,
//! shutdown, decode), and the render side, which activates frame buffers
//! and textures and uploads frames.
//!
//! # Slot lifecycle
//!
//! ```text
//! FREE ──initialize_stream──► CONFIGURED ──activate_stream──► ACTIVE
//!   ▲                              ▲                            │
//!   │                              └──deactivate_stream─────────┤
//!   └──────────────────shutdown_stream──────────────────────────┘
//!
//! ACTIVE ──activate_decoder──► frame cache active ──► texture active
//! ```
//!
//! Each lifecycle flag has a single writer side, so flags are plain atomics.
//! The engine itself is exclusively owned by its slot.

use crate::config::{DecoderConfig, ManagerConfig, VideoCodec};
use crate::decoder::{DecoderPool, FlushOrder, VideoDecoderHw};
use crate::errors::{DecodeResult, DecoderError, InitializeOutcome, SyncError};
use crate::frame::MediaPacket;
use crate::frame_cache::FrameCache;
use crate::metrics;
use crate::texture::VideoFrame;
use common::types::{StreamId, Streams};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument, trace, warn};

/// Result of one render-tick upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureLoadOutput {
    /// Streams whose frame belongs to the presented set this tick.
    pub updated_streams: Streams,
    /// Presentation timestamp of the selected frames.
    pub pts: u64,
    pub frame_duration: u64,
}

struct DecoderSlot {
    free: AtomicBool,
    decoder_active: AtomicBool,
    frame_cache_active: AtomicBool,
    texture_active: AtomicBool,
    initial_buffering_done: AtomicBool,
    decoder: Mutex<Option<Box<dyn VideoDecoderHw>>>,
    config: Mutex<Option<DecoderConfig>>,
}

impl DecoderSlot {
    fn new() -> Self {
        Self {
            free: AtomicBool::new(true),
            decoder_active: AtomicBool::new(false),
            frame_cache_active: AtomicBool::new(false),
            texture_active: AtomicBool::new(false),
            initial_buffering_done: AtomicBool::new(false),
            decoder: Mutex::new(None),
            config: Mutex::new(None),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SharedStreamIds {
    current: Option<StreamId>,
    previous: Option<StreamId>,
}

impl SharedStreamIds {
    fn contains(self, stream: StreamId) -> bool {
        self.current == Some(stream) || self.previous == Some(stream)
    }
}

/// Orchestrates decoder engines and frame buffers for a bounded set of streams.
pub struct VideoDecoderManager {
    config: ManagerConfig,
    slots: Vec<DecoderSlot>,
    frame_cache: Arc<dyn FrameCache>,
    decoder_pool: Arc<dyn DecoderPool>,
    shared: Mutex<SharedStreamIds>,
    latest_pts: AtomicU64,
}

impl VideoDecoderManager {
    /// Create a manager with `config.max_stream_count` free slots.
    ///
    /// # Errors
    ///
    /// Returns `DecoderError::InvalidConfig` if the configuration is out of range.
    pub fn new(
        config: ManagerConfig,
        frame_cache: Arc<dyn FrameCache>,
        decoder_pool: Arc<dyn DecoderPool>,
    ) -> Result<Self, DecoderError> {
        config.validate()?;
        let slots = (0..config.max_stream_count)
            .map(|_| DecoderSlot::new())
            .collect();
        Ok(Self {
            config,
            slots,
            frame_cache,
            decoder_pool,
            shared: Mutex::new(SharedStreamIds::default()),
            latest_pts: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn frame_cache(&self) -> &Arc<dyn FrameCache> {
        &self.frame_cache
    }

    #[must_use]
    pub fn is_byte_stream_headers_mode(&self) -> bool {
        self.config.byte_stream_headers_mode
    }

    fn slot(&self, stream: StreamId) -> Result<&DecoderSlot, DecoderError> {
        self.slots
            .get(stream.index())
            .ok_or(DecoderError::InvalidStream(stream))
    }

    /// Whether the slot is free for `generate_unique_stream_id`.
    #[must_use]
    pub fn is_free(&self, stream: StreamId) -> bool {
        self.slot(stream)
            .is_ok_and(|slot| slot.free.load(Ordering::SeqCst))
    }

    /// Whether the slot currently owns a decoder engine.
    #[must_use]
    pub fn has_decoder(&self, stream: StreamId) -> bool {
        self.slot(stream)
            .is_ok_and(|slot| slot.decoder.lock().is_some())
    }

    fn active_decoder_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.decoder_active.load(Ordering::SeqCst))
            .count()
    }

    /// Store the configuration of a stream and create its frame lists.
    ///
    /// A shared stream that still owns a decoder is left untouched.
    ///
    /// # Errors
    ///
    /// `InvalidState` if a non-shared stream already owns a decoder,
    /// `InvalidStream` for an out-of-range id.
    pub fn initialize_stream(
        &self,
        stream: StreamId,
        config: DecoderConfig,
    ) -> Result<InitializeOutcome, DecoderError> {
        let slot = self.slot(stream)?;
        let is_shared = self.shared.lock().contains(stream);
        let has_decoder = slot.decoder.lock().is_some();

        if has_decoder {
            if is_shared {
                return Ok(InitializeOutcome::Skipped);
            }
            error!(
                target: "omaf.decoder.manager",
                stream = %stream,
                "Decoder for stream already created"
            );
            return Err(DecoderError::InvalidState {
                stream,
                reason: "decoder for stream already created",
            });
        }

        self.frame_cache.initialize_stream(stream, &config)?;
        *slot.config.lock() = Some(config);
        slot.initial_buffering_done.store(false, Ordering::SeqCst);
        slot.free.store(false, Ordering::SeqCst);
        Ok(InitializeOutcome::Configured)
    }

    /// Tear the stream down and free its slot.
    ///
    /// # Errors
    ///
    /// `InvalidStream` for an out-of-range id.
    pub fn shutdown_stream(&self, stream: StreamId) -> Result<(), DecoderError> {
        let slot = self.slot(stream)?;
        if slot.decoder_active.load(Ordering::SeqCst) {
            self.deactivate_stream(stream)?;
        }
        self.frame_cache.shutdown_stream(stream);
        self.frame_cache.destroy_texture(stream);
        slot.texture_active.store(false, Ordering::SeqCst);
        slot.initial_buffering_done.store(false, Ordering::SeqCst);
        *slot.config.lock() = None;
        slot.free.store(true, Ordering::SeqCst);
        debug!(target: "omaf.decoder.manager", stream = %stream, "Stream shut down");
        Ok(())
    }

    /// Reserve a decoder engine for a configured stream.
    ///
    /// Frames older than `current_pts` that are still queued or arrive later
    /// are discarded. Activating an active stream is a no-op.
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the pool has no engine left (nothing is
    /// reserved), `InvalidState` if the stream is not configured.
    #[instrument(skip(self), fields(stream = %stream))]
    pub fn activate_stream(&self, stream: StreamId, current_pts: u64) -> Result<(), DecoderError> {
        let slot = self.slot(stream)?;
        if slot.decoder_active.load(Ordering::SeqCst) {
            return Ok(());
        }
        let config = slot
            .config
            .lock()
            .clone()
            .ok_or(DecoderError::InvalidState {
                stream,
                reason: "stream not configured",
            })?;

        let start = Instant::now();
        let Some(decoder) = self.decoder_pool.reserve(&config) else {
            error!(
                target: "omaf.decoder.manager",
                stream = %stream,
                codec = ?config.codec,
                "Video decoder reserve failed"
            );
            metrics::record_decoder_reservation(false);
            return Err(DecoderError::OperationFailed(format!(
                "video decoder reserve failed for stream {stream}"
            )));
        };
        *slot.decoder.lock() = Some(decoder);
        slot.decoder_active.store(true, Ordering::SeqCst);
        metrics::record_decoder_reservation(true);
        metrics::set_active_decoders(self.active_decoder_count());

        // Older than current frames must not be rendered.
        self.frame_cache.set_discard_target(stream, current_pts);

        debug!(
            target: "omaf.decoder.manager",
            stream = %stream,
            current_pts,
            elapsed_us = start.elapsed().as_micros(),
            "Stream activated"
        );
        Ok(())
    }

    /// Flush the stream and hand its decoder back to the pool.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the stream has no decoder.
    pub fn deactivate_stream(&self, stream: StreamId) -> Result<(), DecoderError> {
        let slot = self.slot(stream)?;
        let Some(mut decoder) = slot.decoder.lock().take() else {
            error!(target: "omaf.decoder.manager", stream = %stream, "No decoder for stream");
            return Err(DecoderError::InvalidState {
                stream,
                reason: "no decoder for stream",
            });
        };
        slot.decoder_active.store(false, Ordering::SeqCst);

        // Without active frame buffers the decoder was never fed.
        if slot.frame_cache_active.swap(false, Ordering::SeqCst) {
            match self.decoder_pool.flush_order() {
                FlushOrder::DecoderFirst => {
                    decoder.flush();
                    self.frame_cache.deactivate_stream(stream);
                }
                FlushOrder::CacheFirst => {
                    self.frame_cache.deactivate_stream(stream);
                    decoder.flush();
                }
            }
        }
        self.decoder_pool.release(decoder);
        metrics::set_active_decoders(self.active_decoder_count());
        debug!(target: "omaf.decoder.manager", stream = %stream, "Stream deactivated");
        Ok(())
    }

    /// Activate frame buffers and the texture of an active stream.
    ///
    /// Called from the render side; both steps are idempotent.
    pub fn activate_decoder(&self, stream: StreamId) {
        let Ok(slot) = self.slot(stream) else {
            return;
        };
        if !slot.decoder_active.load(Ordering::SeqCst) {
            return;
        }
        if !slot.frame_cache_active.load(Ordering::SeqCst) {
            if let Err(e) = self.frame_cache.activate_stream(stream) {
                warn!(
                    target: "omaf.decoder.manager",
                    stream = %stream,
                    error = %e,
                    "Frame cache activation failed"
                );
                return;
            }
            slot.frame_cache_active.store(true, Ordering::SeqCst);
        }
        if !slot.texture_active.load(Ordering::SeqCst) {
            let config = slot.config.lock().clone();
            if let Some(config) = config {
                self.frame_cache.create_texture(stream, &config);
                slot.texture_active.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Whether every stream has frame buffers and a texture.
    #[must_use]
    pub fn is_active(&self, streams: &Streams) -> bool {
        streams.iter().all(|stream| {
            self.slot(stream).is_ok_and(|slot| {
                slot.frame_cache_active.load(Ordering::SeqCst)
                    && slot.texture_active.load(Ordering::SeqCst)
            })
        })
    }

    /// Feed one packet to the stream's decoder.
    ///
    /// Returns `NotReady` without touching the decoder until the render side
    /// has activated the stream's frame buffers.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the stream has no decoder.
    pub fn decode_media_packet(
        &self,
        stream: StreamId,
        packet: &MediaPacket,
        seeking: bool,
    ) -> Result<DecodeResult, DecoderError> {
        let slot = self.slot(stream)?;
        if !slot.frame_cache_active.load(Ordering::SeqCst) {
            return Ok(DecodeResult::NotReady);
        }
        let mut decoder = slot.decoder.lock();
        let decoder = decoder.as_mut().ok_or(DecoderError::InvalidState {
            stream,
            reason: "no decoder for stream",
        })?;
        Ok(decoder.decode_frame(stream, packet, seeking))
    }

    /// Drop everything queued for the streams and skip to `seek_target_pts`.
    pub fn seek_to_pts(&self, streams: &Streams, seek_target_pts: u64) {
        for stream in streams {
            self.frame_cache.set_discard_target(stream, seek_target_pts);
            if let Err(e) = self.flush_stream(stream) {
                warn!(target: "omaf.decoder.manager", stream = %stream, error = %e, "Seek flush failed");
            }
        }
    }

    /// Whether any stream is still filling its initial buffer.
    ///
    /// Once a stream reaches the threshold it never reports buffering again
    /// until it is shut down or reconfigured. A stream at decoder end of
    /// stream never buffers.
    ///
    /// # Errors
    ///
    /// `InvalidState` if a stream has no decoder.
    pub fn is_buffering(&self, streams: &Streams) -> Result<bool, DecoderError> {
        for stream in streams {
            let slot = self.slot(stream)?;
            let eos = slot
                .decoder
                .lock()
                .as_ref()
                .map(|decoder| decoder.is_eos())
                .ok_or(DecoderError::InvalidState {
                    stream,
                    reason: "no decoder for stream",
                })?;
            if eos || slot.initial_buffering_done.load(Ordering::SeqCst) {
                continue;
            }
            if self.frame_cache.decoded_frame_count(stream) < self.config.initial_buffering_threshold
            {
                return Ok(true);
            }
            slot.initial_buffering_done.store(true, Ordering::SeqCst);
            debug!(target: "omaf.decoder.manager", stream = %stream, "Initial buffering done");
        }
        Ok(false)
    }

    /// Flush the stream's decoder, if any, and its queued frames.
    ///
    /// # Errors
    ///
    /// `InvalidStream` for an out-of-range id.
    pub fn flush_stream(&self, stream: StreamId) -> Result<(), DecoderError> {
        let slot = self.slot(stream)?;
        if let Some(decoder) = slot.decoder.lock().as_mut() {
            decoder.flush();
        }
        self.frame_cache.flush_frames(stream);
        Ok(())
    }

    /// Decoder reached end of stream and every decoded frame was consumed.
    #[must_use]
    pub fn is_eos(&self, stream: StreamId) -> bool {
        let Ok(slot) = self.slot(stream) else {
            return false;
        };
        let decoder_eos = slot
            .decoder
            .lock()
            .as_ref()
            .is_some_and(|decoder| decoder.is_eos());
        decoder_eos && self.frame_cache.decoded_frame_count(stream) == 0
    }

    /// # Errors
    ///
    /// `InvalidState` if the stream has no decoder.
    pub fn set_input_eos(&self, stream: StreamId) -> Result<(), DecoderError> {
        let slot = self.slot(stream)?;
        let mut decoder = slot.decoder.lock();
        decoder
            .as_mut()
            .ok_or(DecoderError::InvalidState {
                stream,
                reason: "no decoder for stream",
            })?
            .set_input_eos();
        Ok(())
    }

    /// # Errors
    ///
    /// `InvalidState` if the stream has no decoder.
    pub fn is_input_eos(&self, stream: StreamId) -> Result<bool, DecoderError> {
        let slot = self.slot(stream)?;
        let decoder = slot.decoder.lock();
        decoder
            .as_ref()
            .map(|decoder| decoder.is_input_eos())
            .ok_or(DecoderError::InvalidState {
                stream,
                reason: "no decoder for stream",
            })
    }

    /// Return discarded frames of all given streams to their free lists so
    /// decoders can refill them before the next upload.
    pub fn preload_textures_for_pts(
        &self,
        base_streams: &Streams,
        additional_streams: &Streams,
        skipped_streams: &Streams,
        target_pts_us: u64,
    ) {
        let all_streams =
            Streams::union_of(&[base_streams, additional_streams, skipped_streams]);
        trace!(
            target: "omaf.decoder.manager",
            target_pts_us,
            streams = all_streams.len(),
            "Preloading textures"
        );
        self.frame_cache.clear_discarded_frames(&all_streams);
    }

    /// Upload one synchronized frame per stream for presentation at (or
    /// before) `target_pts_us`.
    ///
    /// Old frames of every involved stream are cleaned up whether or not a
    /// frame set was found.
    ///
    /// # Errors
    ///
    /// `DecoderError::Sync` when no consistent frame set exists; retry on the
    /// next tick.
    pub fn upload_textures_for_pts(
        &self,
        base_streams: &Streams,
        additional_streams: &Streams,
        target_pts_us: u64,
    ) -> Result<TextureLoadOutput, DecoderError> {
        for stream in base_streams.iter().chain(additional_streams.iter()) {
            self.activate_decoder(stream);
        }
        let all_streams = Streams::union_of(&[base_streams, additional_streams]);

        let synced = self
            .frame_cache
            .synched_frames_for_pts(base_streams, additional_streams, target_pts_us)
            .and_then(|frames| {
                if frames.is_empty() {
                    Err(SyncError::ItemNotFound)
                } else {
                    Ok(frames)
                }
            });
        let frames = match synced {
            Ok(frames) => frames,
            Err(e) => {
                metrics::record_sync_miss();
                trace!(target: "omaf.decoder.manager", target_pts_us, "No synchronized frames");
                self.frame_cache.clean_up_old_frames(&all_streams, target_pts_us);
                return Err(e.into());
            }
        };

        let mut output = TextureLoadOutput::default();
        for frame in &frames {
            trace!(
                target: "omaf.decoder.manager",
                stream = %frame.stream,
                width = frame.width,
                height = frame.height,
                pts = frame.pts,
                dts = frame.dts,
                duration = frame.duration,
                is_active = frame.is_active,
                "Synched frame"
            );
            if self
                .frame_cache
                .upload_frame(frame.stream, frame.pts, target_pts_us)
            {
                output.updated_streams.add(frame.stream);
            } else {
                debug!(
                    target: "omaf.decoder.manager",
                    stream = %frame.stream,
                    pts = frame.pts,
                    "Synched frame left the queue before upload"
                );
            }
        }

        let mut reference = frames.iter().map(|frame| (frame.pts, frame.duration));
        if let Some((pts, duration)) = reference.next() {
            if reference.any(|(other_pts, _)| other_pts != pts) {
                debug!(
                    target: "omaf.decoder.manager",
                    pts,
                    "Synched frames differ in PTS, reporting the first"
                );
            }
            self.latest_pts.store(pts, Ordering::SeqCst);
            output.pts = pts;
            output.frame_duration = duration;
        }

        self.frame_cache.clean_up_old_frames(&all_streams, target_pts_us);
        Ok(output)
    }

    #[must_use]
    pub fn current_video_frame(&self, stream: StreamId) -> Option<VideoFrame> {
        self.frame_cache.current_video_frame(stream)
    }

    /// Claim the first free slot.
    ///
    /// With `make_shared` the id becomes the current shared id and the
    /// previous shared id is remembered for the duration of a viewpoint
    /// switch.
    ///
    /// # Errors
    ///
    /// `NoFreeStreamSlot` when every slot is taken.
    pub fn generate_unique_stream_id(&self, make_shared: bool) -> Result<StreamId, DecoderError> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot
                .free
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }
            let stream = StreamId::from_index(index).ok_or(DecoderError::NoFreeStreamSlot)?;
            if make_shared {
                let mut shared = self.shared.lock();
                shared.previous = shared.current;
                shared.current = Some(stream);
                debug!(
                    target: "omaf.decoder.manager",
                    stream = %stream,
                    previous = ?shared.previous,
                    "Generated a new shared stream id"
                );
            } else {
                trace!(target: "omaf.decoder.manager", stream = %stream, "Generated a new unique stream id");
            }
            return Ok(stream);
        }
        warn!(target: "omaf.decoder.manager", "No free stream slot");
        Err(DecoderError::NoFreeStreamSlot)
    }

    /// The current shared stream id, allocated on first use.
    ///
    /// Streams sharing the id must share one decoder configuration.
    ///
    /// # Errors
    ///
    /// `NoFreeStreamSlot` if the id has to be allocated and no slot is free.
    pub fn shared_stream_id(&self) -> Result<StreamId, DecoderError> {
        let mut shared = self.shared.lock();
        if let Some(stream) = shared.current {
            return Ok(stream);
        }
        let stream = self.generate_unique_stream_id(false)?;
        shared.current = Some(stream);
        debug!(target: "omaf.decoder.manager", stream = %stream, "Generated a shared stream id");
        Ok(stream)
    }

    /// Shared id kept alive from before the last shared allocation.
    #[must_use]
    pub fn previous_shared_stream_id(&self) -> Option<StreamId> {
        self.shared.lock().previous
    }

    /// Forget a shared id. Unknown ids are ignored, since a release may race
    /// with a newer allocation.
    pub fn release_shared_stream_id(&self, stream: StreamId) {
        let mut shared = self.shared.lock();
        if shared.previous == Some(stream) {
            shared.previous = None;
        } else if shared.current == Some(stream) {
            shared.current = None;
        }
        trace!(target: "omaf.decoder.manager", stream = %stream, "Released shared stream id");
    }

    #[must_use]
    pub fn sync_streams(&self, anchor_stream: StreamId, stream: StreamId) -> bool {
        self.frame_cache.sync_streams(anchor_stream, stream)
    }

    /// PTS reported by the last successful upload.
    #[must_use]
    pub fn latest_pts(&self) -> u64 {
        self.latest_pts.load(Ordering::SeqCst)
    }

    /// Ask the pool to pre-create engines before playback.
    pub fn create_video_decoders(&self, codec: VideoCodec, count: usize) {
        self.decoder_pool.create_video_decoders(codec, count);
    }
}

impl Drop for VideoDecoderManager {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if let Some(decoder) = slot.decoder.get_mut().take() {
                self.decoder_pool.release(decoder);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{FrameCacheConfig, PixelFormat};
    use crate::frame_cache::PooledFrameCache;
    use crate::null_decoder::{NullDecoderConfig, NullDecoderPool};
    use crate::texture::HeadlessTextureBackend;
    use bytes::Bytes;

    const FRAME_US: u64 = 33_333;

    struct Harness {
        manager: VideoDecoderManager,
        cache: Arc<PooledFrameCache>,
        pool: Arc<NullDecoderPool>,
    }

    fn harness(decoder_capacity: usize) -> Harness {
        let cache = Arc::new(
            PooledFrameCache::new(
                FrameCacheConfig {
                    max_stream_count: 4,
                    ..FrameCacheConfig::default()
                },
                Arc::new(HeadlessTextureBackend::new()),
            )
            .unwrap(),
        );
        let pool = Arc::new(NullDecoderPool::new(
            cache.clone(),
            NullDecoderConfig {
                capacity: decoder_capacity,
                output_delay: 0,
                holds_frames: true,
            },
        ));
        let manager = VideoDecoderManager::new(
            ManagerConfig {
                max_stream_count: 4,
                ..ManagerConfig::default()
            },
            cache.clone(),
            pool.clone(),
        )
        .unwrap();
        Harness {
            manager,
            cache,
            pool,
        }
    }

    fn decoder_config() -> DecoderConfig {
        DecoderConfig::new(VideoCodec::Avc, 16, 16, PixelFormat::Nv12)
    }

    fn packet(pts: u64) -> MediaPacket {
        MediaPacket::new(pts, FRAME_US, Bytes::from_static(b"frame"))
    }

    fn running_stream(h: &Harness) -> StreamId {
        let stream = h.manager.generate_unique_stream_id(false).unwrap();
        h.manager.initialize_stream(stream, decoder_config()).unwrap();
        h.manager.activate_stream(stream, 0).unwrap();
        h.manager.activate_decoder(stream);
        stream
    }

    #[test]
    fn test_activate_without_decoders_fails_cleanly() {
        let h = harness(0);
        let stream = h.manager.generate_unique_stream_id(false).unwrap();
        h.manager.initialize_stream(stream, decoder_config()).unwrap();

        let err = h.manager.activate_stream(stream, 0).unwrap_err();
        assert!(matches!(err, DecoderError::OperationFailed(_)));
        assert!(err.is_recoverable());
        assert!(!h.manager.has_decoder(stream));
        assert_eq!(h.pool.reserved(), 0);
    }

    #[test]
    fn test_activate_is_idempotent() {
        let h = harness(4);
        let stream = running_stream(&h);
        h.manager.activate_stream(stream, 0).unwrap();
        assert_eq!(h.pool.reserved(), 1);
    }

    #[test]
    fn test_activate_unconfigured_stream() {
        let h = harness(4);
        assert!(matches!(
            h.manager.activate_stream(StreamId(0), 0),
            Err(DecoderError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_double_initialize_rejected() {
        let h = harness(4);
        let stream = running_stream(&h);
        assert!(matches!(
            h.manager.initialize_stream(stream, decoder_config()),
            Err(DecoderError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_shared_stream_initialize_is_skipped() {
        let h = harness(4);
        let stream = h.manager.shared_stream_id().unwrap();
        assert_eq!(
            h.manager.initialize_stream(stream, decoder_config()).unwrap(),
            InitializeOutcome::Configured
        );
        h.manager.activate_stream(stream, 0).unwrap();
        assert_eq!(
            h.manager.initialize_stream(stream, decoder_config()).unwrap(),
            InitializeOutcome::Skipped
        );
    }

    #[test]
    fn test_out_of_range_stream() {
        let h = harness(4);
        assert_eq!(
            h.manager.shutdown_stream(StreamId(10)),
            Err(DecoderError::InvalidStream(StreamId(10)))
        );
        assert!(!h.manager.is_eos(StreamId(10)));
    }

    #[test]
    fn test_decode_without_decoder() {
        let h = harness(4);
        let stream = h.manager.generate_unique_stream_id(false).unwrap();
        h.manager.initialize_stream(stream, decoder_config()).unwrap();
        // Frame buffers are not active, so the call never reaches a decoder.
        assert_eq!(
            h.manager.decode_media_packet(stream, &packet(0), false),
            Ok(DecodeResult::NotReady)
        );
        assert!(h.manager.set_input_eos(stream).is_err());
        assert!(h.manager.is_input_eos(stream).is_err());
        assert!(h.manager.is_buffering(&Streams::from(&[stream.0][..])).is_err());
    }

    #[test]
    fn test_upload_reports_pts_and_duration() {
        let h = harness(4);
        let stream = running_stream(&h);
        let streams = Streams::from(&[stream.0][..]);
        h.manager.decode_media_packet(stream, &packet(0), false).unwrap();
        h.manager.decode_media_packet(stream, &packet(FRAME_US), false).unwrap();

        let output = h
            .manager
            .upload_textures_for_pts(&streams, &Streams::new(), 40_000)
            .unwrap();
        assert_eq!(output.pts, FRAME_US);
        assert_eq!(output.frame_duration, FRAME_US);
        assert!(output.updated_streams.contains(stream));
        assert_eq!(h.manager.latest_pts(), FRAME_US);
        assert_eq!(h.cache.active_frame_pts(stream), Some(FRAME_US));
        assert_eq!(
            h.manager.current_video_frame(stream).unwrap().pts,
            Some(FRAME_US)
        );
    }

    #[test]
    fn test_already_current_stream_is_still_reported() {
        let h = harness(4);
        let stream = running_stream(&h);
        let streams = Streams::from(&[stream.0][..]);
        h.manager.decode_media_packet(stream, &packet(0), false).unwrap();

        h.manager
            .upload_textures_for_pts(&streams, &Streams::new(), 1_000)
            .unwrap();
        let output = h
            .manager
            .upload_textures_for_pts(&streams, &Streams::new(), 2_000)
            .unwrap();
        assert!(output.updated_streams.contains(stream));
        assert_eq!(output.pts, 0);
    }

    #[test]
    fn test_sync_miss_is_recoverable() {
        let h = harness(4);
        let stream = running_stream(&h);
        let err = h
            .manager
            .upload_textures_for_pts(&Streams::from(&[stream.0][..]), &Streams::new(), 0)
            .unwrap_err();
        assert_eq!(err, DecoderError::Sync(SyncError::ItemNotFound));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_seek_discards_until_target() {
        let h = harness(4);
        let stream = running_stream(&h);
        let streams = Streams::from(&[stream.0][..]);
        h.manager.decode_media_packet(stream, &packet(0), false).unwrap();

        h.manager.seek_to_pts(&streams, 3 * FRAME_US);
        assert_eq!(h.cache.decoded_frame_count(stream), 0);

        // Flushing clears the target, so frames after the seek are kept.
        h.manager
            .decode_media_packet(stream, &packet(FRAME_US), true)
            .unwrap();
        assert_eq!(h.cache.decoded_frame_count(stream), 1);
    }

    #[test]
    fn test_eos_requires_drained_queue() {
        let h = harness(4);
        let stream = running_stream(&h);
        h.manager.decode_media_packet(stream, &packet(0), false).unwrap();
        h.manager.set_input_eos(stream).unwrap();
        assert!(h.manager.is_input_eos(stream).unwrap());
        assert!(!h.manager.is_eos(stream));

        h.manager.flush_stream(stream).unwrap();
        h.manager.set_input_eos(stream).unwrap();
        assert!(h.manager.is_eos(stream));
        // End of stream never buffers.
        assert!(!h
            .manager
            .is_buffering(&Streams::from(&[stream.0][..]))
            .unwrap());
    }

    #[test]
    fn test_preload_recycles_discarded_frames() {
        let h = harness(4);
        let stream = running_stream(&h);
        let streams = Streams::from(&[stream.0][..]);
        h.manager.decode_media_packet(stream, &packet(0), false).unwrap();
        h.manager.decode_media_packet(stream, &packet(FRAME_US), false).unwrap();

        h.cache.set_discard_target(stream, FRAME_US);
        assert_eq!(h.cache.discarded_frame_count(stream), 1);

        h.manager
            .preload_textures_for_pts(&Streams::new(), &Streams::new(), &streams, FRAME_US);
        assert_eq!(h.cache.discarded_frame_count(stream), 0);
        assert_eq!(h.cache.free_frame_count(stream), 2);
    }

    #[test]
    fn test_deactivate_returns_frames_and_decoder() {
        let h = harness(4);
        let stream = running_stream(&h);
        h.manager.decode_media_packet(stream, &packet(0), false).unwrap();

        h.manager.deactivate_stream(stream).unwrap();
        assert_eq!(h.pool.reserved(), 0);
        assert_eq!(h.cache.pool_size(), 3);
        assert!(!h.manager.is_active(&Streams::from(&[stream.0][..])));
        assert_eq!(
            h.manager.decode_media_packet(stream, &packet(FRAME_US), false),
            Ok(DecodeResult::NotReady)
        );
        assert!(h.manager.deactivate_stream(stream).is_err());
    }

    #[test]
    fn test_cache_first_flush_order_loses_no_frames() {
        let cache = Arc::new(
            PooledFrameCache::new(
                FrameCacheConfig::default(),
                Arc::new(HeadlessTextureBackend::new()),
            )
            .unwrap(),
        );
        let pool = Arc::new(NullDecoderPool::new(
            cache.clone(),
            NullDecoderConfig {
                capacity: 1,
                output_delay: 2,
                holds_frames: false,
            },
        ));
        let manager =
            VideoDecoderManager::new(ManagerConfig::default(), cache.clone(), pool).unwrap();
        let stream = manager.generate_unique_stream_id(false).unwrap();
        manager.initialize_stream(stream, decoder_config()).unwrap();
        manager.activate_stream(stream, 0).unwrap();
        manager.activate_decoder(stream);
        manager.decode_media_packet(stream, &packet(0), false).unwrap();

        manager.deactivate_stream(stream).unwrap();
        assert_eq!(cache.pool_size(), 3);
    }

    #[test]
    fn test_drop_releases_decoders() {
        let h = harness(4);
        running_stream(&h);
        running_stream(&h);
        assert_eq!(h.pool.reserved(), 2);
        let pool = h.pool.clone();
        drop(h);
        assert_eq!(pool.reserved(), 0);
    }

    #[test]
    fn test_create_video_decoders_delegates_to_pool() {
        let h = harness(1);
        h.manager.create_video_decoders(VideoCodec::Hevc, 3);
        assert_eq!(h.pool.capacity(), 3);
        assert!(h.manager.is_byte_stream_headers_mode());
    }

    #[test]
    fn test_manager_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VideoDecoderManager>();
    }
}
