//! Configuration validation
//!
//! Shared range checks used by every protocol configuration.

/// Configuration validation result type
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Invalid window size: {0}")]
    InvalidWindow(String),

    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(String),

    #[error("Invalid timeout value: {0}")]
    InvalidTimeout(String),

    #[error("Invalid configuration parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing TLS material: {0}")]
    MissingTls(String),

    #[error("Protocol {0} is not compiled into this build")]
    UnsupportedVersion(String),
}

/// Configuration validation trait
pub trait Validator {
    /// Validates the configuration settings
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigurationError` found.
    fn validate(&self) -> ConfigResult<()>;
}

/// Common configuration validation utilities
pub struct ConfigValidator;

impl ConfigValidator {
    /// Largest flow-control window either HTTP/2 or QUIC can express.
    pub const MAX_WINDOW: u64 = (1 << 31) - 1;

    /// Validate an HTTP/2 or QUIC flow-control window.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidWindow` if the window exceeds 2^31-1.
    pub fn validate_window(window: u64, name: &str) -> ConfigResult<()> {
        if window > Self::MAX_WINDOW {
            return Err(ConfigurationError::InvalidWindow(format!(
                "{name} must not exceed {}",
                Self::MAX_WINDOW
            )));
        }
        Ok(())
    }

    /// Validate a buffer or limit that must be non-zero.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidBufferSize` if `size` is zero or above `max`.
    pub fn validate_size(size: u64, max: u64, name: &str) -> ConfigResult<()> {
        if size == 0 {
            return Err(ConfigurationError::InvalidBufferSize(format!(
                "{name} cannot be zero"
            )));
        }
        if size > max {
            return Err(ConfigurationError::InvalidBufferSize(format!(
                "{name} must not exceed {max}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds() {
        assert!(ConfigValidator::validate_window(65_535, "initial_window_size").is_ok());
        assert!(ConfigValidator::validate_window(1 << 31, "initial_window_size").is_err());
    }

    #[test]
    fn size_bounds() {
        assert!(ConfigValidator::validate_size(0, 10, "max_headers").is_err());
        assert!(ConfigValidator::validate_size(11, 10, "max_headers").is_err());
        assert!(ConfigValidator::validate_size(10, 10, "max_headers").is_ok());
    }
}
