//! Decoder, manager and frame cache configuration.

use crate::errors::DecoderError;
use serde::{Deserialize, Serialize};

/// Default number of stream slots.
pub const DEFAULT_MAX_STREAM_COUNT: usize = 32;

/// Default decoded-frame count a stream must reach before playback starts.
pub const DEFAULT_INITIAL_BUFFERING_THRESHOLD: usize = 2;

/// Default decoded-frame buffers per active stream.
pub const DEFAULT_FRAMES_PER_STREAM: usize = 3;

/// Default maximum age of an enhancement-layer frame (50ms).
pub const DEFAULT_MAX_ENHANCEMENT_FRAME_AGE_US: u64 = 50_000;

/// Default age after which a decoded frame is never presented (99ms).
pub const DEFAULT_TOO_OLD_FRAME_THRESHOLD_US: u64 = 99_000;

/// Default share of a frame's duration it must stay on screen.
pub const DEFAULT_REQUIRED_FRAME_DURATION_PERCENTAGE: u64 = 90;

/// Compressed video format of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Avc,
    Hevc,
}

/// Decoded picture layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Nv12,
    Yuv420p,
    Rgba32,
}

impl PixelFormat {
    /// Byte size of one decoded picture.
    #[must_use]
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        let pixels = (width as usize).saturating_mul(height as usize);
        match self {
            PixelFormat::Nv12 | PixelFormat::Yuv420p => pixels.saturating_mul(3) / 2,
            PixelFormat::Rgba32 => pixels.saturating_mul(4),
        }
    }

    /// Number of texture planes used to present the format.
    #[must_use]
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Nv12 => 2,
            PixelFormat::Yuv420p => 3,
            PixelFormat::Rgba32 => 1,
        }
    }
}

/// Immutable description of one stream, set at `initialize_stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl DecoderConfig {
    #[must_use]
    pub fn new(codec: VideoCodec, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            codec,
            width,
            height,
            pixel_format,
        }
    }
}

/// Video decoder manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Size of the stream slot table.
    pub max_stream_count: usize,
    /// Decoded frames required before a stream stops buffering.
    pub initial_buffering_threshold: usize,
    /// Whether packets carry Annex B start codes instead of length prefixes.
    pub byte_stream_headers_mode: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_stream_count: DEFAULT_MAX_STREAM_COUNT,
            initial_buffering_threshold: DEFAULT_INITIAL_BUFFERING_THRESHOLD,
            byte_stream_headers_mode: true,
        }
    }
}

impl ManagerConfig {
    /// Validate value ranges.
    ///
    /// # Errors
    ///
    /// Returns `DecoderError::InvalidConfig` when the slot table would be
    /// empty or larger than a stream id can address.
    pub fn validate(&self) -> Result<(), DecoderError> {
        if self.max_stream_count == 0 {
            return Err(DecoderError::InvalidConfig(
                "max_stream_count must be greater than zero".to_string(),
            ));
        }
        if u32::try_from(self.max_stream_count).is_err() {
            return Err(DecoderError::InvalidConfig(format!(
                "max_stream_count {} exceeds the stream id range",
                self.max_stream_count
            )));
        }
        Ok(())
    }
}

/// Frame cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameCacheConfig {
    pub max_stream_count: usize,
    pub frames_per_stream: usize,
    pub max_enhancement_frame_age_us: u64,
    pub too_old_frame_threshold_us: u64,
    pub required_frame_duration_percentage: u64,
}

impl Default for FrameCacheConfig {
    fn default() -> Self {
        Self {
            max_stream_count: DEFAULT_MAX_STREAM_COUNT,
            frames_per_stream: DEFAULT_FRAMES_PER_STREAM,
            max_enhancement_frame_age_us: DEFAULT_MAX_ENHANCEMENT_FRAME_AGE_US,
            too_old_frame_threshold_us: DEFAULT_TOO_OLD_FRAME_THRESHOLD_US,
            required_frame_duration_percentage: DEFAULT_REQUIRED_FRAME_DURATION_PERCENTAGE,
        }
    }
}

impl FrameCacheConfig {
    /// Validate value ranges.
    ///
    /// # Errors
    ///
    /// Returns `DecoderError::InvalidConfig` for an empty slot table, zero
    /// frames per stream, or a duration percentage above 100.
    pub fn validate(&self) -> Result<(), DecoderError> {
        if self.max_stream_count == 0 {
            return Err(DecoderError::InvalidConfig(
                "max_stream_count must be greater than zero".to_string(),
            ));
        }
        if self.frames_per_stream == 0 {
            return Err(DecoderError::InvalidConfig(
                "frames_per_stream must be greater than zero".to_string(),
            ));
        }
        if self.required_frame_duration_percentage > 100 {
            return Err(DecoderError::InvalidConfig(format!(
                "required_frame_duration_percentage {} is above 100",
                self.required_frame_duration_percentage
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ManagerConfig::default().validate().is_ok());
        assert!(FrameCacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_frames_per_stream_rejected() {
        let config = FrameCacheConfig {
            frames_per_stream: 0,
            ..FrameCacheConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DecoderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_stream_slots_rejected() {
        let config = ManagerConfig {
            max_stream_count: 0,
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FrameCacheConfig =
            serde_json::from_str(r#"{"frames_per_stream": 5}"#).unwrap();
        assert_eq!(config.frames_per_stream, 5);
        assert_eq!(config.too_old_frame_threshold_us, 99_000);
        assert_eq!(config.max_enhancement_frame_age_us, 50_000);
    }

    #[test]
    fn test_nv12_buffer_size() {
        assert_eq!(PixelFormat::Nv12.buffer_size(1280, 720), 1_382_400);
        assert_eq!(PixelFormat::Rgba32.buffer_size(2, 2), 16);
        assert_eq!(PixelFormat::Nv12.plane_count(), 2);
    }

    #[test]
    fn test_decoder_config_serde() {
        let config = DecoderConfig::new(VideoCodec::Hevc, 1280, 720, PixelFormat::Nv12);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"hevc\""));
        let back: DecoderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
