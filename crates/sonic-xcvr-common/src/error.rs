//! Error types for the transceiver daemons.
//!
//! Only initialization-fatal errors reach the supervisor; every other kind is
//! logged and recovered where it happens.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for transceiver daemon operations.
pub type Result<T> = std::result::Result<T, XcvrError>;

/// Errors that can occur in xcvrd / ycabled.
#[derive(Debug, Error)]
pub enum XcvrError {
    /// Redis/database operation failed.
    #[error("Database operation failed: {operation}: {message}")]
    Database {
        /// The operation that failed (e.g., "hset", "hgetall", "psubscribe").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Daemon configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The port configuration file is missing or malformed.
    #[error("Port configuration {}: {message}", path.display())]
    PortConfig {
        /// File that failed to load.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// The platform driver could not be loaded.
    #[error("Platform load failed: {0}")]
    Platform(String),

    /// A platform capability the daemon cannot run without is missing.
    #[error("Not implemented by platform: {0}")]
    NotImplemented(String),

    /// Peer RPC failure.
    #[error("Peer RPC failed: {0}")]
    Rpc(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl XcvrError {
    /// Creates a database error.
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a port configuration error.
    pub fn port_config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PortConfig {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a peer RPC error.
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display() {
        let err = XcvrError::database("hset", "Connection refused");
        assert_eq!(
            err.to_string(),
            "Database operation failed: hset: Connection refused"
        );
    }

    #[test]
    fn test_port_config_error_display() {
        let err = XcvrError::port_config("/tmp/port_config.ini", "missing index column");
        assert_eq!(
            err.to_string(),
            "Port configuration /tmp/port_config.ini: missing index column"
        );
    }
}
