//! Error types for sync operations.
//!
//! Distinguishes transient transport failures, which the resilient client
//! retries, from permanent failures that callers must handle directly.

use koppel_core::CoreError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while syncing data between the two platforms.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request timed out.
    #[error("request timed out after {timeout_seconds}s")]
    Timeout {
        /// Timeout duration that was exceeded.
        timeout_seconds: u64,
    },

    /// Network-level failure reaching the remote host.
    #[error("network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// All retry attempts failed with transient errors.
    #[error("retries exhausted after {attempts} attempts: {cause}")]
    RetriesExhausted {
        /// Total number of attempts made, including the first.
        attempts: u32,
        /// Final transient error that ended the sequence.
        cause: String,
    },

    /// Membership platform returned a non-success response.
    #[error("source API rejected request with status {status}: {body}")]
    SourceRejected {
        /// HTTP status code returned.
        status: u16,
        /// Response body snippet for diagnostics.
        body: String,
    },

    /// CRM returned a non-success response.
    #[error("destination API rejected request with status {status}: {body}")]
    DestinationRejected {
        /// HTTP status code returned.
        status: u16,
        /// Response body snippet for diagnostics.
        body: String,
    },

    /// Response arrived but could not be interpreted.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// What was malformed or missing.
        message: String,
    },

    /// Client or run configuration is unusable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the invalid setting.
        message: String,
    },

    /// No API key could be resolved for an object type.
    #[error("no credential available for object type '{object_type}'")]
    MissingCredential {
        /// Object type the lookup was for.
        object_type: String,
    },
}

impl SyncError {
    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a retries-exhausted error.
    pub fn retries_exhausted(attempts: u32, cause: impl Into<String>) -> Self {
        Self::RetriesExhausted { attempts, cause: cause.into() }
    }

    /// Creates a source rejection error.
    pub fn source_rejected(status: u16, body: impl Into<String>) -> Self {
        Self::SourceRejected { status, body: body.into() }
    }

    /// Creates a destination rejection error.
    pub fn destination_rejected(status: u16, body: impl Into<String>) -> Self {
        Self::DestinationRejected { status, body: body.into() }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a missing-credential error.
    pub fn missing_credential(object_type: impl Into<String>) -> Self {
        Self::MissingCredential { object_type: object_type.into() }
    }

    /// Whether another attempt could succeed.
    ///
    /// Only transport-level failures are retryable. Rejections carry a
    /// response the server meant to send, so repeating the request would
    /// repeat the answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network { .. })
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidConfig { message } => Self::Configuration { message },
            CoreError::MissingCredential { object_type } => Self::MissingCredential { object_type },
            CoreError::InvalidInput { message } => Self::Configuration { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(SyncError::timeout(30).is_retryable());
        assert!(SyncError::network("connection refused").is_retryable());

        assert!(!SyncError::retries_exhausted(5, "timed out").is_retryable());
        assert!(!SyncError::source_rejected(500, "oops").is_retryable());
        assert!(!SyncError::destination_rejected(429, "slow down").is_retryable());
        assert!(!SyncError::invalid_response("empty body").is_retryable());
        assert!(!SyncError::configuration("bad timeout").is_retryable());
        assert!(!SyncError::missing_credential("orders").is_retryable());
    }

    #[test]
    fn error_messages_include_context() {
        let err = SyncError::retries_exhausted(5, "request timed out after 30s");
        assert_eq!(err.to_string(), "retries exhausted after 5 attempts: request timed out after 30s");

        let err = SyncError::destination_rejected(403, "forbidden");
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn core_errors_convert() {
        let err: SyncError = CoreError::missing_credential("events").into();
        assert!(matches!(err, SyncError::MissingCredential { ref object_type } if object_type == "events"));

        let err: SyncError = CoreError::invalid_config("frequency must be positive").into();
        assert!(matches!(err, SyncError::Configuration { .. }));
    }
}
