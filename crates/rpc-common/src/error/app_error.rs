//! Application error types
//!
//! Top-level errors surfaced by the daemon. Component crates keep their own
//! error enums and are folded into these at the wiring layer.

use std::fmt;

use crate::config::ConfigError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Startup errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    // Fatal gateway errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    // Detection errors
    #[error("Game detection error: {0}")]
    Detection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Authentication(_) => 3,
            Self::Gateway(_) | Self::Detection(_) | Self::Io(_) | Self::Internal(_) => 1,
        }
    }

    /// Stable error code for structured logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_FAILED",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::Detection(_) => "DETECTION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a gateway error
    #[must_use]
    pub fn gateway(msg: impl fmt::Display) -> Self {
        Self::Gateway(msg.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(AppError::Config(ConfigError::MissingVar("RPC_TOKEN")).exit_code(), 2);
        assert_eq!(AppError::Authentication("4004".to_string()).exit_code(), 3);
        assert_eq!(AppError::gateway("closed").exit_code(), 1);
        assert_eq!(AppError::internal(anyhow::anyhow!("boom")).exit_code(), 1);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Authentication(String::new()).error_code(), "AUTHENTICATION_FAILED");
        assert_eq!(AppError::Detection("x".to_string()).error_code(), "DETECTION_ERROR");
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(AppError::from(io).error_code(), "IO_ERROR");
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = AppError::from(ConfigError::MissingVar("RPC_TOKEN"));
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: RPC_TOKEN"
        );
    }
}
