//! # OMAF Test Utilities
//!
//! Shared test utilities for the video decoder and DASH provider crates.
//!
//! This crate provides mock implementations and test fixtures for testing
//! the decoder manager and the extractor without hardware decoders, a GPU or
//! a network.
//!
//! ## Modules
//!
//! - `mock_decoder` - Decoder pool and engine that record every call
//! - `spy_cache` - Frame cache wrapper counting collaborator calls
//! - `mock_segments` - Scripted segment downloads and a recording parser
//! - `fixtures` - Stream configurations, packets and ready-made harnesses
//!
//! ## Usage
//!
//! ```rust,ignore
//! use omaf_test_utils::*;
//!
//! #[test]
//! fn test_example() {
//!     let harness = ManagerHarness::new();
//!     let stream = harness.manager.generate_unique_stream_id(false).unwrap();
//!     harness.manager.initialize_stream(stream, hd_nv12_config()).unwrap();
//!     harness.manager.activate_stream(stream, 0).unwrap();
//!
//!     assert_eq!(harness.pool.reserve_calls(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_decoder;
pub mod mock_segments;
pub mod spy_cache;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_decoder::*;
pub use mock_segments::*;
pub use spy_cache::*;
