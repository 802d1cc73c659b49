//! Player configuration.
//!
//! Configuration is loaded from environment variables. Unparsable values
//! fall back to their defaults; combinations the decoder side cannot run
//! with are rejected.

use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;
use video_decoder::{FrameCacheConfig, ManagerConfig};

/// Default number of decoder engines the pool can hand out.
pub const DEFAULT_DECODER_COUNT: usize = 4;

/// Default number of tiles each extractor merges.
pub const DEFAULT_TILE_COUNT: u32 = 2;

/// Default frame rate of the synthetic content.
pub const DEFAULT_FRAME_RATE: u32 = 25;

/// Default segment duration in milliseconds.
pub const DEFAULT_SEGMENT_DURATION_MS: u64 = 1000;

/// Default number of segments in the synthetic content.
pub const DEFAULT_SEGMENT_COUNT: u32 = 10;

/// Default decoded picture size.
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 960;

/// Default expected round-trip time to the segment server.
pub const DEFAULT_EXPECTED_PING_MS: u32 = 100;

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Stream slots of the decoder manager (and frame cache).
    pub max_stream_count: usize,
    /// Frames each active stream may hold.
    pub frames_per_stream: usize,
    /// Decoded frames needed before playback starts.
    pub initial_buffering_threshold: usize,
    /// Decoder engines available at the same time.
    pub decoder_count: usize,
    /// Supporting tile sets of the extractor.
    pub tile_count: u32,
    pub frame_rate: u32,
    pub segment_duration_ms: u64,
    pub segment_count: u32,
    pub width: u32,
    pub height: u32,
    pub expected_ping_ms: u32,
    /// Stop after this long even if the content has not ended.
    pub max_playback_secs: Option<u64>,
    pub observability: ObservabilityConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_stream_count: video_decoder::config::DEFAULT_MAX_STREAM_COUNT,
            frames_per_stream: video_decoder::config::DEFAULT_FRAMES_PER_STREAM,
            initial_buffering_threshold:
                video_decoder::config::DEFAULT_INITIAL_BUFFERING_THRESHOLD,
            decoder_count: DEFAULT_DECODER_COUNT,
            tile_count: DEFAULT_TILE_COUNT,
            frame_rate: DEFAULT_FRAME_RATE,
            segment_duration_ms: DEFAULT_SEGMENT_DURATION_MS,
            segment_count: DEFAULT_SEGMENT_COUNT,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            expected_ping_ms: DEFAULT_EXPECTED_PING_MS,
            max_playback_secs: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parsed<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str, default: T) -> T {
    vars.get(key)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PlayerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`PlayerConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidValue` if a value is zero where the player needs
    /// at least one, or if the segment duration is shorter than one frame.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let observability = ObservabilityConfig {
            log_level: vars
                .get("OMAF_LOG_LEVEL")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            json_logs: parsed(vars, "OMAF_JSON_LOGS", false),
        };

        let config = PlayerConfig {
            max_stream_count: parsed(vars, "OMAF_MAX_STREAM_COUNT", defaults.max_stream_count),
            frames_per_stream: parsed(vars, "OMAF_FRAMES_PER_STREAM", defaults.frames_per_stream),
            initial_buffering_threshold: parsed(
                vars,
                "OMAF_BUFFERING_THRESHOLD",
                defaults.initial_buffering_threshold,
            ),
            decoder_count: parsed(vars, "OMAF_DECODER_COUNT", defaults.decoder_count),
            tile_count: parsed(vars, "OMAF_TILE_COUNT", defaults.tile_count),
            frame_rate: parsed(vars, "OMAF_FRAME_RATE", defaults.frame_rate),
            segment_duration_ms: parsed(
                vars,
                "OMAF_SEGMENT_DURATION_MS",
                defaults.segment_duration_ms,
            ),
            segment_count: parsed(vars, "OMAF_SEGMENT_COUNT", defaults.segment_count),
            width: parsed(vars, "OMAF_WIDTH", defaults.width),
            height: parsed(vars, "OMAF_HEIGHT", defaults.height),
            expected_ping_ms: parsed(vars, "OMAF_EXPECTED_PING_MS", defaults.expected_ping_ms),
            max_playback_secs: vars
                .get("OMAF_MAX_PLAYBACK_SECS")
                .and_then(|s| s.parse().ok()),
            observability,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `ConfigError::InvalidValue` for settings playback cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("OMAF_MAX_STREAM_COUNT", self.max_stream_count == 0),
            ("OMAF_FRAMES_PER_STREAM", self.frames_per_stream == 0),
            ("OMAF_DECODER_COUNT", self.decoder_count == 0),
            ("OMAF_FRAME_RATE", self.frame_rate == 0),
            ("OMAF_SEGMENT_COUNT", self.segment_count == 0),
            ("OMAF_WIDTH", self.width == 0),
            ("OMAF_HEIGHT", self.height == 0),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::InvalidValue(format!(
                "{name} must be greater than zero"
            )));
        }
        if self.frames_per_segment() == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "OMAF_SEGMENT_DURATION_MS {} is shorter than one frame",
                self.segment_duration_ms
            )));
        }
        Ok(())
    }

    /// Duration of one frame in microseconds.
    #[must_use]
    pub fn frame_duration_us(&self) -> u64 {
        1_000_000 / u64::from(self.frame_rate.max(1))
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(self.frame_duration_us())
    }

    #[must_use]
    pub fn frames_per_segment(&self) -> u64 {
        self.segment_duration_ms.saturating_mul(1000) / self.frame_duration_us().max(1)
    }

    #[must_use]
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_stream_count: self.max_stream_count,
            initial_buffering_threshold: self.initial_buffering_threshold,
            ..ManagerConfig::default()
        }
    }

    #[must_use]
    pub fn frame_cache_config(&self) -> FrameCacheConfig {
        FrameCacheConfig {
            max_stream_count: self.max_stream_count,
            frames_per_stream: self.frames_per_stream,
            ..FrameCacheConfig::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = PlayerConfig::from_vars(&HashMap::new()).expect("defaults are valid");
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.frame_duration_us(), 40_000);
        assert_eq!(config.frames_per_segment(), 25);
        assert_eq!(config.observability.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.max_playback_secs.is_none());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("OMAF_MAX_STREAM_COUNT".to_string(), "8".to_string()),
            ("OMAF_FRAMES_PER_STREAM".to_string(), "5".to_string()),
            ("OMAF_TILE_COUNT".to_string(), "6".to_string()),
            ("OMAF_FRAME_RATE".to_string(), "50".to_string()),
            ("OMAF_SEGMENT_DURATION_MS".to_string(), "500".to_string()),
            ("OMAF_MAX_PLAYBACK_SECS".to_string(), "3".to_string()),
            ("OMAF_JSON_LOGS".to_string(), "true".to_string()),
            ("OMAF_LOG_LEVEL".to_string(), "omaf=trace".to_string()),
        ]);

        let config = PlayerConfig::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.max_stream_count, 8);
        assert_eq!(config.manager_config().max_stream_count, 8);
        assert_eq!(config.frame_cache_config().frames_per_stream, 5);
        assert_eq!(config.tile_count, 6);
        assert_eq!(config.frames_per_segment(), 25);
        assert_eq!(config.max_playback_secs, Some(3));
        assert!(config.observability.json_logs);
        assert_eq!(config.observability.log_level, "omaf=trace");
    }

    #[test]
    fn test_unparsable_value_uses_default() {
        let vars = HashMap::from([("OMAF_DECODER_COUNT".to_string(), "many".to_string())]);
        let config = PlayerConfig::from_vars(&vars).unwrap();
        assert_eq!(config.decoder_count, DEFAULT_DECODER_COUNT);
    }

    #[test]
    fn test_zero_stream_slots_rejected() {
        let vars = HashMap::from([("OMAF_MAX_STREAM_COUNT".to_string(), "0".to_string())]);
        let err = PlayerConfig::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref msg) if msg.contains("OMAF_MAX_STREAM_COUNT")));
    }

    #[test]
    fn test_zero_frames_per_stream_rejected() {
        let vars = HashMap::from([("OMAF_FRAMES_PER_STREAM".to_string(), "0".to_string())]);
        assert!(PlayerConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn test_segment_shorter_than_frame_rejected() {
        let vars = HashMap::from([("OMAF_SEGMENT_DURATION_MS".to_string(), "10".to_string())]);
        let err = PlayerConfig::from_vars(&vars).unwrap_err();
        assert!(err.to_string().contains("shorter than one frame"));
    }

    #[test]
    fn test_json_round_trip_fills_defaults() {
        let config: PlayerConfig = serde_json::from_str(r#"{"tile_count": 4}"#).unwrap();
        assert_eq!(config.tile_count, 4);
        assert_eq!(config.frame_rate, DEFAULT_FRAME_RATE);
    }
}
