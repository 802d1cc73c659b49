//! Frame cache spy.
//!
//! Wraps a real [`PooledFrameCache`] and counts the calls the decoder
//! manager makes, so tests can check collaborator contracts (cleanup after
//! a failed upload, flush ordering on deactivation) while frames still move
//! through the real implementation.

use crate::mock_decoder::{Event, EventLog};
use common::types::{StreamId, Streams};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use video_decoder::texture::VideoFrame;
use video_decoder::{
    DecoderConfig, DecoderError, DecoderFrame, FrameCache, PooledFrameCache, SyncError,
    SyncedFrame,
};

/// Frame cache wrapper recording manager calls.
pub struct SpyFrameCache {
    inner: PooledFrameCache,
    events: EventLog,
    clean_up_calls: AtomicUsize,
    cleaned_streams: Mutex<Vec<Streams>>,
    sync_calls: AtomicUsize,
    uploads: AtomicUsize,
    empty_sync: AtomicBool,
}

impl SpyFrameCache {
    pub fn new(inner: PooledFrameCache) -> Self {
        Self {
            inner,
            events: EventLog::new(),
            clean_up_calls: AtomicUsize::new(0),
            cleaned_streams: Mutex::new(Vec::new()),
            sync_calls: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            empty_sync: AtomicBool::new(false),
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Answer every sync request with an empty frame set instead of
    /// asking the wrapped cache.
    pub fn report_empty_sync(&self, enabled: bool) {
        self.empty_sync.store(enabled, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &PooledFrameCache {
        &self.inner
    }

    pub fn clean_up_calls(&self) -> usize {
        self.clean_up_calls.load(Ordering::SeqCst)
    }

    /// Stream sets passed to `clean_up_old_frames`, in call order.
    pub fn cleaned_streams(&self) -> Vec<Streams> {
        self.cleaned_streams.lock().clone()
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

impl FrameCache for SpyFrameCache {
    fn initialize_stream(&self, stream: StreamId, config: &DecoderConfig) -> Result<(), DecoderError> {
        self.inner.initialize_stream(stream, config)
    }

    fn shutdown_stream(&self, stream: StreamId) {
        self.inner.shutdown_stream(stream);
    }

    fn activate_stream(&self, stream: StreamId) -> Result<(), DecoderError> {
        self.inner.activate_stream(stream)
    }

    fn deactivate_stream(&self, stream: StreamId) {
        self.events.push(Event::CacheDeactivated(stream));
        self.inner.deactivate_stream(stream);
    }

    fn create_texture(&self, stream: StreamId, config: &DecoderConfig) {
        self.inner.create_texture(stream, config);
    }

    fn destroy_texture(&self, stream: StreamId) {
        self.inner.destroy_texture(stream);
    }

    fn set_discard_target(&self, stream: StreamId, target_pts_us: u64) {
        self.inner.set_discard_target(stream, target_pts_us);
    }

    fn decoded_frame_count(&self, stream: StreamId) -> usize {
        self.inner.decoded_frame_count(stream)
    }

    fn synched_frames_for_pts(
        &self,
        base_streams: &Streams,
        enhancement_streams: &Streams,
        target_pts_us: u64,
    ) -> Result<Vec<SyncedFrame>, SyncError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        if self.empty_sync.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner
            .synched_frames_for_pts(base_streams, enhancement_streams, target_pts_us)
    }

    fn upload_frame(&self, stream: StreamId, pts: u64, upload_time_us: u64) -> bool {
        let uploaded = self.inner.upload_frame(stream, pts, upload_time_us);
        if uploaded {
            self.uploads.fetch_add(1, Ordering::SeqCst);
        }
        uploaded
    }

    fn clean_up_old_frames(&self, streams: &Streams, current_pts_us: u64) {
        self.clean_up_calls.fetch_add(1, Ordering::SeqCst);
        self.cleaned_streams.lock().push(streams.clone());
        self.inner.clean_up_old_frames(streams, current_pts_us);
    }

    fn clear_discarded_frames(&self, streams: &Streams) {
        self.inner.clear_discarded_frames(streams);
    }

    fn flush_frames(&self, stream: StreamId) {
        self.events.push(Event::CacheFlushed(stream));
        self.inner.flush_frames(stream);
    }

    fn current_video_frame(&self, stream: StreamId) -> Option<VideoFrame> {
        self.inner.current_video_frame(stream)
    }

    fn sync_streams(&self, anchor_stream: StreamId, stream: StreamId) -> bool {
        self.inner.sync_streams(anchor_stream, stream)
    }

    fn acquire_free_frame(&self, stream: StreamId) -> Option<DecoderFrame> {
        self.inner.acquire_free_frame(stream)
    }

    fn free_frame_count(&self, stream: StreamId) -> usize {
        self.inner.free_frame_count(stream)
    }

    fn add_decoded_frame(&self, frame: DecoderFrame) {
        self.inner.add_decoded_frame(frame);
    }

    fn release_frame(&self, frame: DecoderFrame) {
        self.inner.release_frame(frame);
    }

    fn stage_frame(&self, stream: StreamId, pts: u64) -> bool {
        self.inner.stage_frame(stream, pts)
    }

    fn fetch_staged_frame(&self, stream: StreamId) -> Option<DecoderFrame> {
        self.inner.fetch_staged_frame(stream)
    }
}
