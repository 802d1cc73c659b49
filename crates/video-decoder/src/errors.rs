//! Video decoder error and outcome types.
//!
//! Contract violations (double initialization, decoding without a decoder,
//! out-of-range stream ids) are reported as [`DecoderError`] values and logged
//! at `error!` level by the caller side. Expected runtime conditions such as a
//! full decoder or a synchronization miss have their own vocabulary so callers
//! can retry on the next tick without treating them as failures.

use common::types::StreamId;
use thiserror::Error;

/// Video decoder error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecoderError {
    /// Stream id is outside the configured slot table.
    #[error("Invalid stream: {0}")]
    InvalidStream(StreamId),

    /// Operation is not allowed in the stream's current lifecycle state.
    #[error("Invalid state for stream {stream}: {reason}")]
    InvalidState {
        stream: StreamId,
        reason: &'static str,
    },

    /// A resource could not be obtained (no free hardware decoder).
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// All stream slots are in use.
    #[error("No free stream slot")]
    NoFreeStreamSlot,

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No consistent frame set exists for the requested presentation time.
    #[error("Frame synchronization failed: {0}")]
    Sync(#[from] SyncError),
}

impl DecoderError {
    /// Whether the caller may retry the operation later.
    ///
    /// Synchronization misses are retried on the next render tick; decoder
    /// reservation failures may clear once another stream releases its
    /// decoder. Everything else is a programming error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DecoderError::Sync(_) | DecoderError::OperationFailed(_)
        )
    }

    /// Returns a bounded label string for the error variant (for metrics).
    #[must_use]
    pub fn error_type_label(&self) -> &'static str {
        match self {
            DecoderError::InvalidStream(_) => "invalid_stream",
            DecoderError::InvalidState { .. } => "invalid_state",
            DecoderError::OperationFailed(_) => "operation_failed",
            DecoderError::NoFreeStreamSlot => "no_free_stream_slot",
            DecoderError::InvalidConfig(_) => "invalid_config",
            DecoderError::Sync(_) => "sync",
        }
    }
}

/// Frame synchronization failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// A required stream has no eligible frame.
    #[error("No eligible frame found")]
    ItemNotFound,
}

/// Outcome of a successful `initialize_stream` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeOutcome {
    /// The slot was configured.
    Configured,
    /// The stream is a shared stream that already owns a decoder; nothing changed.
    Skipped,
}

/// Result of feeding one packet to a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeResult {
    /// The packet was copied into the decoder and can be dropped by the caller.
    PacketAccepted,
    /// The decoder has no room for the packet; retry with the same packet.
    DecoderFull,
    /// The stream cannot take packets yet; retry with the same packet.
    NotReady,
    /// The decoder failed and will not recover without a reset.
    DecoderError,
}

impl DecodeResult {
    /// Whether the caller should keep the packet and offer it again later.
    #[must_use]
    pub fn should_retry(self) -> bool {
        matches!(self, DecodeResult::DecoderFull | DecodeResult::NotReady)
    }
}
