//! Common utilities and types shared across the OMAF player components.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for common data types (stream ids, stream sets, segment ids)
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for tracing bootstrap
pub mod observability;
