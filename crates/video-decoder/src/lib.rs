//! OMAF Player Video Decoder Library
//!
//! Decoding side of the 360° video player:
//!
//! - Stream slot lifecycle and decoder engine reservation
//! - Decoded-frame buffering with a shared, resolution-matched frame pool
//! - Cross-stream frame synchronization for tiled (multi-resolution) video
//! - Texture upload through a pluggable render backend
//!
//! # Architecture
//!
//! ```text
//! VideoDecoderManager (one per playback session)
//! ├── DecoderPool ──► VideoDecoderHw (one per active stream)
//! │                        │ decoded frames
//! │                        ▼
//! └── FrameCache ◄──── upload_textures_for_pts (render thread)
//!     └── TextureBackend
//! ```
//!
//! # Modules
//!
//! - [`manager`] - Stream lifecycle, buffering and upload policy
//! - [`frame_cache`] - Per-stream frame queues and synchronization
//! - [`decoder`] - Decoder engine and pool contracts
//! - [`null_decoder`] - Pass-through engine for headless playback
//! - [`texture`] - Texture backend contract
//! - [`config`] - Decoder, manager and cache configuration
//! - [`errors`] - Error and outcome types

#![warn(clippy::pedantic)]

pub mod config;
pub mod decoder;
pub mod errors;
pub mod frame;
pub mod frame_cache;
pub mod manager;
pub mod metrics;
pub mod null_decoder;
pub mod texture;

pub use config::{DecoderConfig, FrameCacheConfig, ManagerConfig, PixelFormat, VideoCodec};
pub use decoder::{DecoderPool, FlushOrder, VideoDecoderHw};
pub use errors::{DecodeResult, DecoderError, InitializeOutcome, SyncError};
pub use frame::{DecoderFrame, MediaPacket, SyncedFrame};
pub use frame_cache::{FrameCache, PooledFrameCache};
pub use manager::{TextureLoadOutput, VideoDecoderManager};
pub use texture::{HeadlessTextureBackend, TextureBackend, VideoFrame};
