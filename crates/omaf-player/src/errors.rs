//! Player error types.

use crate::config::ConfigError;
use common::types::StreamId;
use dash_provider::DashError;
use thiserror::Error;
use video_decoder::DecoderError;

/// Player error type.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),

    #[error("DASH error: {0}")]
    Dash(#[from] DashError),

    /// The decoder engine gave up on a packet.
    #[error("Decoding failed on stream {stream} at {pts_us} us")]
    DecodeFailed { stream: StreamId, pts_us: u64 },
}

impl PlayerError {
    /// Whether playback can continue with the next tick.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Config(_) | PlayerError::DecodeFailed { .. } => false,
            PlayerError::Decoder(e) => e.is_recoverable(),
            PlayerError::Dash(e) => e.is_recoverable(),
        }
    }

    /// Returns a bounded label string for the error variant (for metrics).
    #[must_use]
    pub fn error_type_label(&self) -> &'static str {
        match self {
            PlayerError::Config(_) => "config",
            PlayerError::Decoder(e) => e.error_type_label(),
            PlayerError::Dash(e) => e.error_type_label(),
            PlayerError::DecodeFailed { .. } => "decode_failed",
        }
    }
}
