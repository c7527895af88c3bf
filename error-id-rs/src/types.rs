//! # Library Error Types
//!
//! Errors raised by the library surface itself: global configuration,
//! settings loading and logging setup. Wrapping a failure never produces one
//! of these; the wrap path is infallible by contract.

use thiserror::Error as ThisError;

/// A type alias for Result with the error type defaulting to our Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by the configuration and setup APIs
#[derive(Debug, ThisError)]
pub enum Error {
    /// The process-wide handler was configured more than once
    #[error("error_id: configure() called multiple times; call it only once at program startup")]
    AlreadyConfigured,

    /// Settings could not be read or deserialized
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The global tracing subscriber could not be installed
    #[error("failed to initialize logging: {0}")]
    Logging(String),

    /// Underlying I/O failure (log directories, listeners)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error signals a repeated global configuration
    pub fn is_already_configured(&self) -> bool {
        matches!(self, Error::AlreadyConfigured)
    }
}
