//! Frame cache backed by per-stream queues and a shared frame pool.

use super::groups::{DecodedFrameGroup, FreeFrameGroup};
use super::FrameCache;
use crate::config::{DecoderConfig, FrameCacheConfig};
use crate::errors::{DecoderError, SyncError};
use crate::frame::{DecoderFrame, SyncedFrame};
use crate::metrics::{self, DiscardReason};
use crate::texture::{TextureBackend, VideoFrame};
use common::types::{StreamId, Streams};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
struct StreamFrames {
    free: Option<FreeFrameGroup>,
    decoded: DecodedFrameGroup,
    active_frame: Option<DecoderFrame>,
    discard_target: Option<u64>,
    texture: Option<VideoFrame>,
}

/// [`FrameCache`] with one mutex per stream and a resolution-matched pool.
///
/// Lock order is stream before pool; the pool lock is never held while a
/// stream lock is taken.
pub struct PooledFrameCache {
    config: FrameCacheConfig,
    streams: Vec<Mutex<StreamFrames>>,
    pool: Mutex<Vec<DecoderFrame>>,
    textures: Arc<dyn TextureBackend>,
    frames_allocated: AtomicUsize,
}

impl PooledFrameCache {
    /// Create a cache with a slot per stream id.
    ///
    /// # Errors
    ///
    /// Returns `DecoderError::InvalidConfig` if the configuration is out of range.
    pub fn new(
        config: FrameCacheConfig,
        textures: Arc<dyn TextureBackend>,
    ) -> Result<Self, DecoderError> {
        config.validate()?;
        let streams = (0..config.max_stream_count)
            .map(|_| Mutex::new(StreamFrames::default()))
            .collect();
        Ok(Self {
            config,
            streams,
            pool: Mutex::new(Vec::new()),
            textures,
            frames_allocated: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn config(&self) -> &FrameCacheConfig {
        &self.config
    }

    /// Frames waiting in the shared pool.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool.lock().len()
    }

    /// Frame buffers allocated since creation.
    #[must_use]
    pub fn frames_allocated(&self) -> usize {
        self.frames_allocated.load(Ordering::SeqCst)
    }

    /// PTS of the frame currently on screen for a stream.
    #[must_use]
    pub fn active_frame_pts(&self, stream: StreamId) -> Option<u64> {
        self.slot(stream)?
            .lock()
            .active_frame
            .as_ref()
            .map(|frame| frame.pts)
    }

    /// Frames discarded but not yet returned to the free list.
    #[must_use]
    pub fn discarded_frame_count(&self, stream: StreamId) -> usize {
        self.slot(stream)
            .map_or(0, |slot| slot.lock().decoded.discarded_len())
    }

    fn slot(&self, stream: StreamId) -> Option<&Mutex<StreamFrames>> {
        let slot = self.streams.get(stream.index());
        if slot.is_none() {
            warn!(target: "omaf.decoder.frame_cache", stream = %stream, "Stream id out of range");
        }
        slot
    }

    fn recycle(&self, state: &mut StreamFrames, frames: Vec<DecoderFrame>) {
        let mut orphans = Vec::new();
        for frame in frames {
            match state.free.as_mut() {
                Some(group) => {
                    if let Err(frame) = group.give_back(frame) {
                        orphans.push(frame);
                    }
                }
                None => orphans.push(frame),
            }
        }
        if !orphans.is_empty() {
            self.pool.lock().extend(orphans);
        }
    }

    fn find_frame(&self, stream: StreamId, target_pts: u64, now: u64) -> Option<SyncedFrame> {
        let state = self.slot(stream)?.lock();
        let selected = state
            .decoded
            .find_with_pts(target_pts, self.config.too_old_frame_threshold_us);
        let active = state.active_frame.as_ref().filter(|frame| !frame.flushed);

        match (active, selected) {
            (None, selected) => selected.map(|frame| frame.info(false)),
            (Some(active), None) => Some(active.info(true)),
            (Some(active), Some(selected)) => {
                let required_on_screen =
                    active.duration / 100 * self.config.required_frame_duration_percentage;
                let still_showing = active.duration != 0
                    && active
                        .upload_time
                        .and_then(|uploaded| now.checked_sub(uploaded))
                        .is_some_and(|shown| shown < required_on_screen);
                if still_showing || selected.pts < active.pts {
                    Some(active.info(true))
                } else {
                    Some(selected.info(false))
                }
            }
        }
    }

    fn collect_frames(
        &self,
        streams: &Streams,
        pts: u64,
        now: u64,
    ) -> Option<Vec<SyncedFrame>> {
        streams
            .iter()
            .map(|stream| {
                let frame = self
                    .find_frame(stream, pts, now)
                    .filter(|frame| frame.pts == pts);
                if frame.is_none() {
                    debug!(
                        target: "omaf.decoder.frame_cache",
                        stream = %stream,
                        pts,
                        "No frame found from the base stream"
                    );
                }
                frame
            })
            .collect()
    }

    fn discard(state: &mut StreamFrames, target_pts: u64, reason: DiscardReason) {
        let count = state.decoded.discard_below(target_pts);
        if count > 0 {
            trace!(
                target: "omaf.decoder.frame_cache",
                count,
                target_pts,
                "Discarding frames"
            );
            metrics::record_frames_discarded(reason, count);
        }
    }

    fn flush_locked(&self, state: &mut StreamFrames) {
        if let Some(active) = state.active_frame.as_mut() {
            active.flushed = true;
        }
        state.discard_target = None;
        let released = state.decoded.flush();
        self.recycle(state, released);
    }
}

impl FrameCache for PooledFrameCache {
    fn initialize_stream(
        &self,
        stream: StreamId,
        config: &DecoderConfig,
    ) -> Result<(), DecoderError> {
        let slot = self
            .slot(stream)
            .ok_or(DecoderError::InvalidStream(stream))?;
        let mut state = slot.lock();
        if state.free.as_ref().is_some_and(FreeFrameGroup::is_active) {
            return Err(DecoderError::InvalidState {
                stream,
                reason: "frame cache stream already active",
            });
        }
        // A frame left on screen from an earlier configuration of another
        // size can never be refilled for this one.
        let stale = if state
            .active_frame
            .as_ref()
            .is_some_and(|frame| !frame.matches(config.width, config.height, config.pixel_format))
        {
            state.active_frame.take()
        } else {
            None
        };
        state.free = Some(FreeFrameGroup::new(stream, config));
        drop(state);
        if let Some(stale) = stale {
            debug!(
                target: "omaf.decoder.frame_cache",
                stream = %stream,
                width = stale.width,
                height = stale.height,
                "Returning previous active frame to the pool"
            );
            self.pool.lock().push(stale);
        }
        debug!(
            target: "omaf.decoder.frame_cache",
            stream = %stream,
            width = config.width,
            height = config.height,
            "Stream initialized"
        );
        Ok(())
    }

    fn shutdown_stream(&self, stream: StreamId) {
        let Some(slot) = self.slot(stream) else {
            return;
        };
        let mut state = slot.lock();
        let mut released = state.decoded.drain_all();
        if let Some(mut group) = state.free.take() {
            released.extend(group.deactivate());
        }
        released.extend(state.active_frame.take());
        state.discard_target = None;
        drop(state);

        if !released.is_empty() {
            self.pool.lock().extend(released);
        }
    }

    fn activate_stream(&self, stream: StreamId) -> Result<(), DecoderError> {
        let slot = self
            .slot(stream)
            .ok_or(DecoderError::InvalidStream(stream))?;
        let mut state = slot.lock();
        let has_active_frame = state.active_frame.is_some();
        let group = state.free.as_mut().ok_or(DecoderError::InvalidState {
            stream,
            reason: "frame cache stream not initialized",
        })?;
        if group.is_active() {
            return Err(DecoderError::InvalidState {
                stream,
                reason: "frame cache stream already active",
            });
        }

        // The active frame counts towards the stream's budget.
        let frame_count = if has_active_frame {
            self.config.frames_per_stream.saturating_sub(1)
        } else {
            self.config.frames_per_stream
        };
        let (width, height, pixel_format) = (group.width(), group.height(), group.pixel_format());

        let mut frames = Vec::with_capacity(frame_count);
        {
            let mut pool = self.pool.lock();
            let mut index = 0;
            while index < pool.len() && frames.len() < frame_count {
                if pool
                    .get(index)
                    .is_some_and(|frame| frame.matches(width, height, pixel_format))
                {
                    frames.push(pool.swap_remove(index));
                } else {
                    index += 1;
                }
            }
        }
        let reused = frames.len();
        while frames.len() < frame_count {
            frames.push(DecoderFrame::new(stream, width, height, pixel_format));
            self.frames_allocated.fetch_add(1, Ordering::SeqCst);
        }
        group.activate(frames);

        debug!(
            target: "omaf.decoder.frame_cache",
            stream = %stream,
            frame_count,
            reused,
            "Stream activated"
        );
        Ok(())
    }

    fn deactivate_stream(&self, stream: StreamId) {
        let Some(slot) = self.slot(stream) else {
            return;
        };
        let mut state = slot.lock();
        self.flush_locked(&mut state);
        let frames = state
            .free
            .as_mut()
            .map(FreeFrameGroup::deactivate)
            .unwrap_or_default();
        drop(state);

        if frames.is_empty() {
            // Never activated from the render side.
            return;
        }
        debug!(
            target: "omaf.decoder.frame_cache",
            stream = %stream,
            returned = frames.len(),
            "Stream deactivated"
        );
        self.pool.lock().extend(frames);
    }

    fn create_texture(&self, stream: StreamId, config: &DecoderConfig) {
        let Some(slot) = self.slot(stream) else {
            return;
        };
        let video_frame = self.textures.create_texture(stream, config);
        let previous = slot.lock().texture.replace(video_frame);
        if let Some(previous) = previous {
            self.textures.destroy_texture(previous);
        }
    }

    fn destroy_texture(&self, stream: StreamId) {
        let Some(slot) = self.slot(stream) else {
            return;
        };
        let texture = slot.lock().texture.take();
        if let Some(texture) = texture {
            self.textures.destroy_texture(texture);
        }
    }

    fn set_discard_target(&self, stream: StreamId, target_pts_us: u64) {
        let Some(slot) = self.slot(stream) else {
            return;
        };
        let mut state = slot.lock();
        state.discard_target = Some(target_pts_us);
        Self::discard(&mut state, target_pts_us, DiscardReason::DiscardTarget);
    }

    fn decoded_frame_count(&self, stream: StreamId) -> usize {
        self.slot(stream).map_or(0, |slot| slot.lock().decoded.len())
    }

    fn synched_frames_for_pts(
        &self,
        base_streams: &Streams,
        enhancement_streams: &Streams,
        target_pts_us: u64,
    ) -> Result<Vec<SyncedFrame>, SyncError> {
        if base_streams.is_empty() {
            return Err(SyncError::ItemNotFound);
        }

        // Smallest PTS the base streams can all offer.
        let mut smallest_pts = u64::MAX;
        for stream in base_streams {
            let frame = self
                .find_frame(stream, target_pts_us, target_pts_us)
                .ok_or(SyncError::ItemNotFound)?;
            smallest_pts = smallest_pts.min(frame.pts);
        }
        if smallest_pts == u64::MAX {
            return Err(SyncError::ItemNotFound);
        }

        // An enhancement layer may pull the set back to an older PTS, within limits.
        let mut smallest_enhancement_pts = smallest_pts;
        for stream in enhancement_streams {
            if let Some(frame) = self.find_frame(stream, target_pts_us, target_pts_us) {
                let young_enough = target_pts_us
                    .checked_sub(frame.pts)
                    .is_some_and(|age| age < self.config.max_enhancement_frame_age_us);
                if frame.pts < smallest_enhancement_pts && young_enough {
                    smallest_enhancement_pts = frame.pts;
                }
            }
        }

        let (mut frames, selected_pts) =
            match self.collect_frames(base_streams, smallest_enhancement_pts, target_pts_us) {
                Some(frames) => (frames, smallest_enhancement_pts),
                None if smallest_pts == smallest_enhancement_pts => {
                    return Err(SyncError::ItemNotFound)
                }
                None => {
                    // The base streams no longer hold the older frame.
                    let frames = self
                        .collect_frames(base_streams, smallest_pts, target_pts_us)
                        .ok_or(SyncError::ItemNotFound)?;
                    (frames, smallest_pts)
                }
            };

        // Enhancement frames are optional.
        frames.extend(enhancement_streams.iter().filter_map(|stream| {
            self.find_frame(stream, selected_pts, target_pts_us)
                .filter(|frame| frame.pts == selected_pts)
        }));

        trace!(
            target: "omaf.decoder.frame_cache",
            target_pts_us,
            selected_pts,
            frames = frames.len(),
            "Synchronized frames"
        );
        Ok(frames)
    }

    fn upload_frame(&self, stream: StreamId, pts: u64, upload_time_us: u64) -> bool {
        let Some(slot) = self.slot(stream) else {
            return false;
        };
        let mut state = slot.lock();

        if state
            .active_frame
            .as_ref()
            .is_some_and(|active| !active.flushed && active.pts == pts)
        {
            // Already on screen.
            return true;
        }

        let Some(mut frame) = state.decoded.remove(pts) else {
            return false;
        };
        frame.upload_time = Some(upload_time_us);
        frame.consumed = true;
        let StreamFrames {
            texture,
            active_frame,
            ..
        } = &mut *state;
        if let Some(texture) = texture.as_mut() {
            self.textures.upload(texture, &frame);
        }
        let previous = active_frame.replace(frame);
        if let Some(previous) = previous {
            self.recycle(&mut state, vec![previous]);
        }
        metrics::record_frame_uploaded();
        true
    }

    fn clean_up_old_frames(&self, streams: &Streams, current_pts_us: u64) {
        let too_old_pts = current_pts_us.saturating_sub(self.config.too_old_frame_threshold_us);
        for stream in streams {
            if let Some(slot) = self.slot(stream) {
                Self::discard(&mut slot.lock(), too_old_pts, DiscardReason::TooOld);
            }
        }
    }

    fn clear_discarded_frames(&self, streams: &Streams) {
        for stream in streams {
            if let Some(slot) = self.slot(stream) {
                let mut state = slot.lock();
                let discarded = state.decoded.take_discarded();
                self.recycle(&mut state, discarded);
            }
        }
    }

    fn flush_frames(&self, stream: StreamId) {
        if let Some(slot) = self.slot(stream) {
            self.flush_locked(&mut slot.lock());
        }
    }

    fn current_video_frame(&self, stream: StreamId) -> Option<VideoFrame> {
        self.slot(stream)?.lock().texture.clone()
    }

    fn sync_streams(&self, anchor_stream: StreamId, stream: StreamId) -> bool {
        let Some(anchor_pts) = self
            .slot(anchor_stream)
            .and_then(|slot| slot.lock().decoded.oldest_pts())
        else {
            return false;
        };
        let Some(slot) = self.slot(stream) else {
            return false;
        };
        let mut state = slot.lock();
        Self::discard(&mut state, anchor_pts, DiscardReason::DiscardTarget);
        let synced = state
            .decoded
            .find_with_pts(anchor_pts, self.config.too_old_frame_threshold_us)
            .is_some_and(|frame| frame.pts == anchor_pts);
        if synced {
            debug!(
                target: "omaf.decoder.frame_cache",
                stream = %stream,
                anchor = %anchor_stream,
                anchor_pts,
                "Synced stream"
            );
        }
        synced
    }

    fn acquire_free_frame(&self, stream: StreamId) -> Option<DecoderFrame> {
        self.slot(stream)?
            .lock()
            .free
            .as_mut()
            .and_then(FreeFrameGroup::acquire)
    }

    fn free_frame_count(&self, stream: StreamId) -> usize {
        self.slot(stream).map_or(0, |slot| {
            slot.lock().free.as_ref().map_or(0, FreeFrameGroup::len)
        })
    }

    fn add_decoded_frame(&self, frame: DecoderFrame) {
        let Some(slot) = self.slot(frame.stream) else {
            self.pool.lock().push(frame);
            return;
        };
        let mut state = slot.lock();

        if let Some(target) = state.discard_target {
            if frame.pts < target {
                trace!(
                    target: "omaf.decoder.frame_cache",
                    stream = %frame.stream,
                    pts = frame.pts,
                    discard_target = target,
                    "Releasing frame below discard target"
                );
                metrics::record_frames_discarded(DiscardReason::DiscardTarget, 1);
                self.recycle(&mut state, vec![frame]);
                return;
            }
            if frame.pts == target {
                state.discard_target = None;
            }
        }

        // Older than the frame on screen, e.g. B-frames right after a seek.
        let older_than_active = state
            .active_frame
            .as_ref()
            .is_some_and(|active| !active.flushed && frame.pts < active.pts);
        if older_than_active {
            metrics::record_frames_discarded(DiscardReason::OlderThanActive, 1);
            self.recycle(&mut state, vec![frame]);
            return;
        }

        if let Err(frame) = state.decoded.add(frame) {
            debug!(
                target: "omaf.decoder.frame_cache",
                stream = %frame.stream,
                pts = frame.pts,
                "Trying to add a frame with a duplicate PTS"
            );
            metrics::record_frames_discarded(DiscardReason::DuplicatePts, 1);
            self.recycle(&mut state, vec![frame]);
        }
    }

    fn release_frame(&self, frame: DecoderFrame) {
        match self.slot(frame.stream) {
            Some(slot) => {
                let mut state = slot.lock();
                self.recycle(&mut state, vec![frame]);
            }
            None => self.pool.lock().push(frame),
        }
    }

    fn stage_frame(&self, stream: StreamId, pts: u64) -> bool {
        let Some(slot) = self.slot(stream) else {
            return false;
        };
        let mut state = slot.lock();
        match state.decoded.stage(pts) {
            Ok(previous) => {
                if let Some(previous) = previous {
                    self.recycle(&mut state, vec![previous]);
                }
                true
            }
            Err(()) => false,
        }
    }

    fn fetch_staged_frame(&self, stream: StreamId) -> Option<DecoderFrame> {
        self.slot(stream)?.lock().decoded.fetch_staged()
    }
}

impl Drop for PooledFrameCache {
    fn drop(&mut self) {
        for slot in &self.streams {
            if let Some(texture) = slot.lock().texture.take() {
                self.textures.destroy_texture(texture);
            }
        }
    }
}
