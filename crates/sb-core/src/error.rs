//! Core error types for serverbot

use sb_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the serverbot ecosystem
#[derive(Error, Debug)]
pub enum SbError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Process error
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed command
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// IPC connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Shared secret did not match
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Peer did not follow the handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Handshake did not finish in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Connection refused
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// End of stream, reset or broken pipe
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// No connection is currently established
    #[error("Not connected")]
    NotConnected,

    /// The message cannot be framed; the connection is unaffected
    #[error("Message rejected: {0}")]
    MessageRejected(String),
}

/// Child process errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// A live process already exists
    #[error("Process is already running")]
    AlreadyRunning,

    /// No live process exists
    #[error("Process is not running")]
    NotRunning,

    /// Read or write against an absent or exited process
    #[error("Process is dead")]
    ProcessDead,

    /// Ready pattern not seen within the startup window
    #[error("Process did not become ready within {0:?}")]
    StartupTimeout(std::time::Duration),

    /// Spawning the child failed
    #[error("Failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Shutdown was requested while waiting on the process
    #[error("Cancelled by shutdown")]
    Cancelled,

    /// Empty argv or otherwise unusable backend description
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Malformed command arguments
#[derive(Error, Debug)]
#[error("Usage: {hint}")]
pub struct UsageError {
    pub hint: String,
}

impl UsageError {
    pub fn new(hint: impl Into<String>) -> Self {
        Self { hint: hint.into() }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_display() {
        let err = UsageError::new("!mc whitelist <add|remove|list> [player]");
        assert_eq!(err.to_string(), "Usage: !mc whitelist <add|remove|list> [player]");
    }

    #[test]
    fn test_error_conversion() {
        let err: SbError = ProcessError::AlreadyRunning.into();
        assert!(matches!(err, SbError::Process(ProcessError::AlreadyRunning)));

        let err: SbError = ConnectionError::NotConnected.into();
        assert_eq!(err.to_string(), "Connection error: Not connected");
    }
}
