//! OMAF Player
//!
//! Headless playback driver for tiled 360° video. A session merges the
//! tiles of one multi-resolution extractor, decodes the merged track into a
//! single stream and presents frames against a playback clock.
//!
//! # Architecture
//!
//! ```text
//! provider task                       render task
//!     │                                    │
//!     ▼                                    ▼
//! DashAdaptationSetExtractorMr      upload_textures_for_pts
//! ├── extractor segments                   │
//! └── TileAdaptationSet × N                │
//!     │ concatenated segment               │
//!     ▼                                    │
//! SampleParser ─► PacketQueue ─► VideoDecoderManager ─► FrameCache
//! ```
//!
//! # Modules
//!
//! - [`session`] - One stream, one extractor, provider and render steps
//! - [`tasks`] - Interval loops driving the session
//! - [`content`] - Synthetic segment downloads and sample parsing
//! - [`config`] - Environment configuration
//! - [`errors`] - Player error type

#![warn(clippy::pedantic)]

pub mod config;
pub mod content;
pub mod errors;
pub mod session;
pub mod tasks;

pub use config::{ConfigError, PlayerConfig};
pub use errors::PlayerError;
pub use session::{PlaybackSession, ProviderStatus, RenderStatus, StatsSnapshot};
pub use tasks::{run_provider_task, run_render_task};
