//! Error types for the monitoring engine
//!
//! Each concern owns its error enum; [`EngineError`] wraps them for callers
//! that cross concerns.

use thiserror::Error;

use crate::commands::CommandError;
use crate::config::ConfigError;
use crate::delegate::{DelegateError, ProtocolError};
use crate::engine::NotificationError;
use crate::registry::RegistryError;
use crate::telemetry::TelemetryError;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Duplicate or dangling entity definitions
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Engine or object configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// External command rejected
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Notification commit rejected
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// Check execution failure
    #[error("Delegate error: {0}")]
    Delegate(#[from] DelegateError),

    /// Malformed connector frame
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Metrics registration failure
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// The engine task is gone
    #[error("Engine stopped: {0}")]
    Stopped(String),
}

impl EngineError {
    /// Create a stopped error
    pub fn stopped(msg: impl Into<String>) -> Self {
        EngineError::Stopped(msg.into())
    }

    /// Configuration-time errors abort startup; everything else is recoverable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Registry(_)
                | EngineError::Config(_)
                | EngineError::Telemetry(_)
                | EngineError::Stopped(_)
        )
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::from(CommandError::UnknownVerb("FOO".to_string()));
        assert_eq!(err.to_string(), "Command error: Unknown verb: FOO");
    }

    #[test]
    fn test_is_fatal() {
        let duplicate = RegistryError::DuplicateEntity {
            kind: "host",
            name: "web01".to_string(),
        };
        assert!(EngineError::from(duplicate).is_fatal());
        assert!(EngineError::stopped("closed").is_fatal());
        assert!(!EngineError::from(CommandError::Malformed("x".to_string())).is_fatal());
    }
}
