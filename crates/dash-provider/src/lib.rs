//! OMAF Player DASH Provider Library
//!
//! Segment side of tiled 360° playback with multi-resolution extractors:
//!
//! - Tile representations queue downloaded segments per quality variant
//! - Tile adaptation sets switch quality on segment boundaries
//! - Extractor adaptation sets merge tile segments into parsable segments
//! - OMAF quality-ranking metadata orders representations
//!
//! # Architecture
//!
//! ```text
//! DashAdaptationSetExtractorMr (one per viewing direction)
//! ├── ExtractorRepresentation ──► SegmentParser
//! │   └── TileRepresentation ──► SegmentStream
//! └── SharedTileSet (shared between extractors)
//!     └── TileAdaptationSet
//!         └── TileRepresentation (one per quality) ──► SegmentStream
//! ```
//!
//! # Modules
//!
//! - [`extractor`] - Concatenation gate, switching and download lifecycle
//! - [`tile_set`] - Quality switching within one tile
//! - [`representation`] - Segment queues of tile and extractor tracks
//! - [`segment`] - Segments plus download and parser contracts
//! - [`quality`] - Quality-ranking descriptors
//! - [`errors`] - Error types

#![warn(clippy::pedantic)]

pub mod errors;
pub mod extractor;
pub mod metrics;
pub mod quality;
pub mod representation;
pub mod segment;
pub mod tile_set;

#[cfg(test)]
mod test_support;

pub use errors::DashError;
pub use extractor::DashAdaptationSetExtractorMr;
pub use quality::{parse_video_quality, QualityDescriptor, QualityLevel, QualityScheme};
pub use representation::{ExtractorRepresentation, TileRepresentation};
pub use segment::{DashSegment, DownloadStart, SegmentParser, SegmentStream};
pub use tile_set::{SharedTileSet, TileAdaptationSet};
