/// Unified error handling for the rumbo router
///
/// Every failure surfaced by a router operation is a `RouterError`. Errors are
/// never swallowed or retried internally; they travel back to the caller of the
/// operation that triggered them.

use crate::config::ConfigError;
use crate::redis::resp::RespParseError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for router operations
#[derive(Debug, Error)]
pub enum RouterError {
    /// No discovery node could answer for the service group
    #[error("Discovery unavailable for group '{group}': {message}")]
    DiscoveryUnavailable { group: String, message: String },

    /// A node connection could not be established or authenticated
    #[error("Connection to {endpoint} failed: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    /// A role name that is neither master nor replica
    #[error("Invalid role: {0} (must be master or replica)")]
    InvalidRole(String),

    /// The node rejected or failed the operation
    #[error("Node error: {command} - {message}")]
    Node { command: String, message: String },

    /// I/O failure on an established connection
    #[error("Network error: {0}")]
    Network(#[from] io::Error),

    /// Malformed reply from a node
    #[error("Protocol error: {0}")]
    Protocol(#[from] RespParseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Operation arguments that cannot be encoded
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },
}

/// Result type alias for router operations
pub type RouterResult<T> = Result<T, RouterError>;

impl RouterError {
    pub fn discovery_unavailable<G: Into<String>, M: Into<String>>(group: G, message: M) -> Self {
        RouterError::DiscoveryUnavailable {
            group: group.into(),
            message: message.into(),
        }
    }

    pub fn connection_failed<E: Into<String>, M: Into<String>>(endpoint: E, message: M) -> Self {
        RouterError::ConnectionFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn node<C: Into<String>, M: Into<String>>(command: C, message: M) -> Self {
        RouterError::Node {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        RouterError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        RouterError::Timeout {
            operation: operation.into(),
        }
    }

    /// Whether the error means the underlying connection is no longer usable
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RouterError::ConnectionFailed { .. }
                | RouterError::Network(_)
                | RouterError::Protocol(_)
                | RouterError::Timeout { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RouterError::Config(_) => ErrorSeverity::Critical,
            RouterError::InvalidRole(_) => ErrorSeverity::Critical,
            RouterError::DiscoveryUnavailable { .. } => ErrorSeverity::Error,
            RouterError::ConnectionFailed { .. } => ErrorSeverity::Warning,
            RouterError::Network(_) => ErrorSeverity::Warning,
            RouterError::Protocol(_) => ErrorSeverity::Warning,
            RouterError::Timeout { .. } => ErrorSeverity::Warning,
            RouterError::Node { .. } => ErrorSeverity::Info,
            RouterError::InvalidArgument { .. } => ErrorSeverity::Info,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Misconfiguration or broken internal invariant
    Critical,
    /// The operation could not reach any node
    Error,
    /// Connection-level trouble with a specific node
    Warning,
    /// The node answered, but with an error
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
