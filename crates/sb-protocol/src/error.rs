//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Line exceeds the configured maximum length
    #[error("Line too long: {size} bytes exceeds maximum of {max} bytes")]
    LineTooLong { size: usize, max: usize },

    /// Line is not valid UTF-8
    #[error("Invalid UTF-8 in line")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Unknown escape sequence in an encoded line
    #[error("Invalid escape sequence: \\{0}")]
    InvalidEscape(char),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
