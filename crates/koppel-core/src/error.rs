//! Error types shared across the sync bridge.
//!
//! Covers the configuration-level failures that are detected before any
//! network traffic happens: bad settings, missing credentials, malformed
//! input. Transport-level errors live in the sync crate.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by configuration and credential handling.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Configuration is structurally invalid or inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration problem
        message: String,
    },

    /// No credential could be resolved for an object type.
    #[error("no credential available for {object_type}: general key is missing or empty")]
    MissingCredential {
        /// Object type the credential lookup was for
        object_type: String,
    },

    /// Caller-supplied input failed validation.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the invalid input
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Creates a missing credential error for an object type.
    pub fn missing_credential(object_type: impl Into<String>) -> Self {
        Self::MissingCredential { object_type: object_type.into() }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }
}
