//! Error types for RelayKV
//!
//! Provides a unified error type for all client operations.

use thiserror::Error;

use crate::protocol::{CommandError, ErrorKind};

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for RelayKV operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // Engine-Reported Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Transaction aborted: {0}")]
    ExecAbort(String),

    #[error("Client closing: {0}")]
    Closing(String),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    // -------------------------------------------------------------------------
    // Correlation Errors
    // -------------------------------------------------------------------------
    #[error("Unknown or stale call reference: {0:#x}")]
    UnknownCall(u64),

    // -------------------------------------------------------------------------
    // Engine Setup Errors
    // -------------------------------------------------------------------------
    #[error("Engine error: {0}")]
    Engine(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// The engine error category this error belongs to, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RelayError::Connection(_) => Some(ErrorKind::Connection),
            RelayError::Request(_) => Some(ErrorKind::Request),
            RelayError::Timeout(_) => Some(ErrorKind::Timeout),
            RelayError::ExecAbort(_) => Some(ErrorKind::ExecAbort),
            RelayError::Closing(_) => Some(ErrorKind::Closing),
            _ => None,
        }
    }
}

impl From<CommandError> for RelayError {
    fn from(err: CommandError) -> Self {
        match err.kind {
            ErrorKind::Closing => RelayError::Closing(err.message),
            ErrorKind::Request => RelayError::Request(err.message),
            ErrorKind::Timeout => RelayError::Timeout(err.message),
            ErrorKind::ExecAbort => RelayError::ExecAbort(err.message),
            ErrorKind::Connection => RelayError::Connection(err.message),
        }
    }
}
