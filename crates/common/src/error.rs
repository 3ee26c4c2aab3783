//! Common error types for TaskBridge
//!
//! This module defines all error types used across the TaskBridge node.
//! Request-scoped errors are rendered into the JSON error body by the
//! service front; liveness errors are logged and swallowed by the reporter.

use std::net::AddrParseError;
use thiserror::Error;

/// Main error type for TaskBridge
#[derive(Error, Debug)]
pub enum TaskBridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request was made before the node was ready to serve it.
    /// The message is surfaced verbatim to HTTP clients.
    #[error("{0}")]
    Precondition(String),

    /// Failure reported by the inference backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// Token subscription errors
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Remote registry rejected or failed a call
    #[error("Registry error: {0}")]
    Registry(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<AddrParseError> for TaskBridgeError {
    fn from(err: AddrParseError) -> Self {
        TaskBridgeError::Parse(err.to_string())
    }
}

impl TaskBridgeError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        TaskBridgeError::Config(msg.into())
    }

    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        TaskBridgeError::Precondition(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        TaskBridgeError::Backend(msg.into())
    }

    /// Create a subscription error
    pub fn subscription(msg: impl Into<String>) -> Self {
        TaskBridgeError::Subscription(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        TaskBridgeError::Timeout(msg.into())
    }

    /// Create a registry error
    pub fn registry(msg: impl Into<String>) -> Self {
        TaskBridgeError::Registry(msg.into())
    }

    /// Whether this error came from an elapsed deadline
    pub fn is_timeout(&self) -> bool {
        match self {
            TaskBridgeError::Timeout(_) => true,
            TaskBridgeError::Http(err) => err.is_timeout(),
            _ => false,
        }
    }
}

/// Result type alias for TaskBridge operations
pub type Result<T> = std::result::Result<T, TaskBridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_message_is_verbatim() {
        let err = TaskBridgeError::precondition("Node has no model loaded.");
        assert_eq!(err.to_string(), "Node has no model loaded.");
    }

    #[test]
    fn test_timeout_classification() {
        assert!(TaskBridgeError::timeout("no response").is_timeout());
        assert!(!TaskBridgeError::backend("boom").is_timeout());
        assert!(TaskBridgeError::timeout("x").to_string().contains("timed out"));
    }

    #[test]
    fn test_addr_parse_error_converts() {
        let err: TaskBridgeError = "not-an-addr".parse::<std::net::SocketAddr>().unwrap_err().into();
        assert!(matches!(err, TaskBridgeError::Parse(_)));
    }
}
