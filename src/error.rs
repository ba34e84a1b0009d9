//! Error types for the spotfind library

use thiserror::Error;

/// Main error type for feature localization
#[derive(Error, Debug)]
pub enum LocateError {
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("the {engine} engine does not support {reason}")]
    UnsupportedEngine { engine: &'static str, reason: String },
}

impl LocateError {
    /// Create a new invalid-parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a new unsupported-engine error
    pub fn unsupported_engine(engine: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedEngine {
            engine,
            reason: reason.into(),
        }
    }
}

/// Result type alias for convenience
pub type LocateResult<T> = Result<T, LocateError>;
