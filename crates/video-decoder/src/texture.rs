//! Texture upload contract between the frame cache and a render backend.
//!
//! The cache only needs to create a texture set per stream, upload a decoded
//! frame into it, and destroy it again. [`HeadlessTextureBackend`] implements
//! the contract without a GPU for the player binary and tests.

use crate::config::{DecoderConfig, PixelFormat};
use crate::frame::DecoderFrame;
use common::types::StreamId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Backend texture handle, tagged by texture kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureHandle {
    Texture2D(u32),
    Texture3D(u32),
    TextureCube(u32),
}

/// Textures currently holding the picture of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub textures: Vec<TextureHandle>,
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// PTS of the uploaded picture, `None` before the first upload.
    pub pts: Option<u64>,
}

/// Render backend operations used by the frame cache.
pub trait TextureBackend: Send + Sync {
    /// Allocate the texture set for a stream.
    fn create_texture(&self, stream: StreamId, config: &DecoderConfig) -> VideoFrame;

    /// Copy a decoded picture into the stream's textures.
    fn upload(&self, target: &mut VideoFrame, frame: &DecoderFrame);

    /// Release the texture set.
    fn destroy_texture(&self, video_frame: VideoFrame);
}

/// In-memory backend that hands out texture ids and records uploads.
#[derive(Debug, Default)]
pub struct HeadlessTextureBackend {
    next_id: AtomicU32,
    live_textures: AtomicUsize,
    upload_count: AtomicUsize,
    last_upload: Mutex<Option<(StreamId, u64)>>,
}

impl HeadlessTextureBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of texture handles currently allocated.
    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.live_textures.load(Ordering::SeqCst)
    }

    /// Total uploads since creation.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.upload_count.load(Ordering::SeqCst)
    }

    /// Stream and PTS of the most recent upload.
    #[must_use]
    pub fn last_upload(&self) -> Option<(StreamId, u64)> {
        *self.last_upload.lock()
    }
}

impl TextureBackend for HeadlessTextureBackend {
    fn create_texture(&self, _stream: StreamId, config: &DecoderConfig) -> VideoFrame {
        let planes = config.pixel_format.plane_count();
        let textures = (0..planes)
            .map(|_| TextureHandle::Texture2D(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
            .collect();
        self.live_textures.fetch_add(planes, Ordering::SeqCst);
        VideoFrame {
            textures,
            pixel_format: config.pixel_format,
            width: config.width,
            height: config.height,
            pts: None,
        }
    }

    fn upload(&self, target: &mut VideoFrame, frame: &DecoderFrame) {
        target.pts = Some(frame.pts);
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        *self.last_upload.lock() = Some((frame.stream, frame.pts));
    }

    fn destroy_texture(&self, video_frame: VideoFrame) {
        self.live_textures
            .fetch_sub(video_frame.textures.len(), Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::VideoCodec;

    #[test]
    fn test_headless_texture_lifecycle() {
        let backend = HeadlessTextureBackend::new();
        let config = DecoderConfig::new(VideoCodec::Avc, 64, 32, PixelFormat::Nv12);

        let mut video_frame = backend.create_texture(StreamId(2), &config);
        assert_eq!(video_frame.textures.len(), 2);
        assert_eq!(backend.live_textures(), 2);
        assert_eq!(video_frame.pts, None);

        let mut frame = DecoderFrame::for_config(StreamId(2), &config);
        frame.pts = 1_000;
        backend.upload(&mut video_frame, &frame);
        assert_eq!(video_frame.pts, Some(1_000));
        assert_eq!(backend.last_upload(), Some((StreamId(2), 1_000)));

        backend.destroy_texture(video_frame);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_texture_ids_are_distinct() {
        let backend = HeadlessTextureBackend::new();
        let config = DecoderConfig::new(VideoCodec::Avc, 8, 8, PixelFormat::Yuv420p);
        let a = backend.create_texture(StreamId(0), &config);
        let b = backend.create_texture(StreamId(1), &config);
        for handle in &a.textures {
            assert!(!b.textures.contains(handle));
        }
    }
}
