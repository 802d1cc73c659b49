//! Common error types for the OMAF player components.

use thiserror::Error;

/// Errors shared by the player crates.
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tracing subscriber could not be installed
    #[error("Observability error: {0}")]
    Observability(String),
}

/// Result type alias using `CommonError`
pub type Result<T> = std::result::Result<T, CommonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_failing_area() {
        let configuration = CommonError::Configuration("invalid log filter: ???".to_string());
        assert_eq!(
            configuration.to_string(),
            "Configuration error: invalid log filter: ???"
        );
        let observability = CommonError::Observability("already set".to_string());
        assert_eq!(observability.to_string(), "Observability error: already set");
    }
}
