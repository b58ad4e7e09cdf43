/// Unified error handling for flowstat
///
/// Most raciness in flow accounting is absorbed locally and never becomes an
/// error. What remains here is configuration trouble, registry unavailability
/// during startup or shutdown, and integration bugs such as duplicate ids.
use crate::core::{ConnectionId, RegistryLifecycle};
use std::fmt;
use thiserror::Error;

pub use crate::config::ConfigError;

/// Main error type for flowstat operations
#[derive(Debug, Error)]
pub enum FlowError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A connection id was registered twice; the pool generated a non-unique id
    #[error("Connection {id} is already registered")]
    DuplicateConnection { id: ConnectionId },

    /// The registry is not answering queries
    #[error("Flow registry unavailable ({lifecycle})")]
    Unavailable { lifecycle: RegistryLifecycle },

    /// Response envelope serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for flowstat operations
pub type FlowResult<T> = Result<T, FlowError>;

impl FlowError {
    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        FlowError::Internal {
            message: message.into(),
        }
    }

    /// Errors a diagnostic query reports as an indicator instead of a failure
    pub fn is_benign(&self) -> bool {
        matches!(self, FlowError::Unavailable { .. })
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            FlowError::Config(_) => ErrorSeverity::Critical,
            FlowError::Internal { .. } => ErrorSeverity::Critical,
            FlowError::DuplicateConnection { .. } => ErrorSeverity::Critical,
            FlowError::Serialization(_) => ErrorSeverity::Error,
            FlowError::Unavailable { .. } => ErrorSeverity::Info,
        }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Serialization(err.to_string())
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Informational messages about recoverable issues
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = FlowError::DuplicateConnection { id: ConnectionId(9) };
        assert_eq!(error.to_string(), "Connection conn-9 is already registered");

        let error = FlowError::Unavailable {
            lifecycle: RegistryLifecycle::ShuttingDown,
        };
        assert_eq!(error.to_string(), "Flow registry unavailable (shutting down)");
    }

    #[test]
    fn test_error_severity() {
        let config_error = FlowError::Config(ConfigError::ValidationError("test".to_string()));
        assert_eq!(config_error.severity(), ErrorSeverity::Critical);
        assert_eq!(config_error.severity().to_string(), "CRITICAL");

        let unavailable = FlowError::Unavailable {
            lifecycle: RegistryLifecycle::Starting,
        };
        assert_eq!(unavailable.severity(), ErrorSeverity::Info);

        let serialization = FlowError::Serialization("bad".to_string());
        assert_eq!(serialization.severity(), ErrorSeverity::Error);
        assert_eq!(serialization.severity().to_string(), "ERROR");
    }

    #[test]
    fn test_benign_errors() {
        let unavailable = FlowError::Unavailable {
            lifecycle: RegistryLifecycle::Starting,
        };
        assert!(unavailable.is_benign());
        assert!(!FlowError::internal("boom").is_benign());
        assert!(!FlowError::DuplicateConnection { id: ConnectionId(1) }.is_benign());
    }

    #[test]
    fn test_serde_json_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let flow_error: FlowError = err.into();
        assert!(matches!(flow_error, FlowError::Serialization(_)));
    }
}
