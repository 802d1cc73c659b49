//! Decoded-frame buffering and cross-stream synchronization.
//!
//! The frame cache sits between the decoder engines and the renderer:
//!
//! ```text
//! ┌──────────┐  acquire/add   ┌────────────┐  synched/upload  ┌──────────┐
//! │ Decoder  │───────────────►│ FrameCache │◄────────────────►│ Renderer │
//! │ engines  │◄───────────────│            │                  │ thread   │
//! └──────────┘    release     └─────┬──────┘                  └──────────┘
//!                                   │
//!                             ┌─────┴─────┐
//!                             │ FramePool │
//!                             │ (reuse)   │
//!                             └───────────┘
//! ```
//!
//! Each stream owns a free list sized `frames_per_stream`, a decoded queue in
//! PTS order and at most one active (on screen) frame. Frames of deactivated
//! streams are recycled through a pool shared by all streams.

mod groups;
mod pooled;

pub use pooled::PooledFrameCache;

use crate::config::DecoderConfig;
use crate::errors::{DecoderError, SyncError};
use crate::frame::{DecoderFrame, SyncedFrame};
use crate::texture::VideoFrame;
use common::types::{StreamId, Streams};

/// Decoded-frame cache shared by the decoder engines (provider side) and
/// the renderer.
///
/// Implementations synchronize internally; every method takes `&self`.
pub trait FrameCache: Send + Sync {
    /// Create the free list for a stream with the given picture size.
    ///
    /// # Errors
    ///
    /// `InvalidStream` for an out-of-range id, `InvalidState` if the stream
    /// is initialized and active.
    fn initialize_stream(&self, stream: StreamId, config: &DecoderConfig)
        -> Result<(), DecoderError>;

    /// Drop the stream's lists and recycle every frame it holds.
    fn shutdown_stream(&self, stream: StreamId);

    /// Fill the stream's free list from the pool, allocating what is missing.
    ///
    /// # Errors
    ///
    /// `InvalidStream` for an out-of-range id, `InvalidState` if the stream
    /// is not initialized or already active.
    fn activate_stream(&self, stream: StreamId) -> Result<(), DecoderError>;

    /// Flush the stream and return its free frames to the pool.
    fn deactivate_stream(&self, stream: StreamId);

    fn create_texture(&self, stream: StreamId, config: &DecoderConfig);

    fn destroy_texture(&self, stream: StreamId);

    /// Drop frames below `target_pts_us` now and on arrival, until a frame
    /// exactly at the target arrives.
    fn set_discard_target(&self, stream: StreamId, target_pts_us: u64);

    fn decoded_frame_count(&self, stream: StreamId) -> usize;

    /// One frame per base stream, all at the same PTS, plus the enhancement
    /// frames available at that PTS.
    ///
    /// # Errors
    ///
    /// `SyncError::ItemNotFound` if any base stream has no eligible frame.
    fn synched_frames_for_pts(
        &self,
        base_streams: &Streams,
        enhancement_streams: &Streams,
        target_pts_us: u64,
    ) -> Result<Vec<SyncedFrame>, SyncError>;

    /// Make the frame at `pts` the active frame of the stream and upload it.
    ///
    /// Returns false if the frame is no longer queued.
    fn upload_frame(&self, stream: StreamId, pts: u64, upload_time_us: u64) -> bool;

    /// Discard frames that fell too far behind `current_pts_us`.
    fn clean_up_old_frames(&self, streams: &Streams, current_pts_us: u64);

    /// Return discarded frames to their free lists.
    fn clear_discarded_frames(&self, streams: &Streams);

    /// Drop every queued frame and mark the active frame as flushed.
    fn flush_frames(&self, stream: StreamId);

    fn current_video_frame(&self, stream: StreamId) -> Option<VideoFrame>;

    /// Align `stream` with the oldest queued frame of `anchor_stream`.
    ///
    /// Returns true once `stream` has a frame at exactly that PTS.
    fn sync_streams(&self, anchor_stream: StreamId, stream: StreamId) -> bool;

    /// Take a free frame for decoding into.
    fn acquire_free_frame(&self, stream: StreamId) -> Option<DecoderFrame>;

    fn free_frame_count(&self, stream: StreamId) -> usize;

    /// Queue a decoded frame; frames that can never be shown are recycled.
    fn add_decoded_frame(&self, frame: DecoderFrame);

    /// Recycle a frame that will not be queued.
    fn release_frame(&self, frame: DecoderFrame);

    /// Move a queued frame into the stream's staged slot.
    fn stage_frame(&self, stream: StreamId, pts: u64) -> bool;

    fn fetch_staged_frame(&self, stream: StreamId) -> Option<DecoderFrame>;
}
