//! Response definitions
//!
//! Results flowing back from the execution core: per-command results
//! delivered through callbacks, and the connect response returned by
//! session establishment.

use std::fmt;

use crate::engine::ClientHandle;
use crate::error::{RelayError, Result};

/// Engine error categories
///
/// The discriminants are the ABI tags carried by the failure callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    Closing = 0,
    Request = 1,
    Timeout = 2,
    ExecAbort = 3,
    Connection = 4,
}

impl ErrorKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(ErrorKind::Closing),
            1 => Some(ErrorKind::Request),
            2 => Some(ErrorKind::Timeout),
            3 => Some(ErrorKind::ExecAbort),
            4 => Some(ErrorKind::Connection),
            _ => None,
        }
    }
}

/// A failed command as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CommandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome of a single dispatched command: a value or an error, never both
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Reply text (empty for a nil reply)
    Value(String),

    Error(CommandError),
}

impl CommandResult {
    pub fn value(text: impl Into<String>) -> Self {
        CommandResult::Value(text.into())
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        CommandResult::Error(CommandError::new(kind, message))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, CommandResult::Value(_))
    }

    /// Error category, if this is an error
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CommandResult::Value(_) => None,
            CommandResult::Error(err) => Some(err.kind),
        }
    }

    pub fn into_result(self) -> Result<String> {
        match self {
            CommandResult::Value(text) => Ok(text),
            CommandResult::Error(err) => Err(err.into()),
        }
    }
}

/// Decoded result of session establishment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectResponse {
    Connected(ClientHandle),
    Failed { kind: ErrorKind, message: String },
}

impl ConnectResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        ConnectResponse::Failed {
            kind: ErrorKind::Connection,
            message: message.into(),
        }
    }

    /// Every establishment failure surfaces as a connection error
    pub fn into_result(self) -> Result<ClientHandle> {
        match self {
            ConnectResponse::Connected(handle) => Ok(handle),
            ConnectResponse::Failed { message, .. } => Err(RelayError::Connection(message)),
        }
    }
}

// =============================================================================
// Reply Text Helpers
// =============================================================================

/// Parse an integer reply
pub fn parse_integer_reply(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| RelayError::UnexpectedReply(format!("expected integer, got {:?}", text)))
}

/// Parse a floating point reply
pub fn parse_float_reply(text: &str) -> Result<f64> {
    text.trim()
        .parse()
        .map_err(|_| RelayError::UnexpectedReply(format!("expected float, got {:?}", text)))
}

/// Parse a boolean reply (`1`/`0`)
pub fn parse_bool_reply(text: &str) -> Result<bool> {
    match parse_integer_reply(text)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RelayError::UnexpectedReply(format!(
            "expected 0 or 1, got {}",
            other
        ))),
    }
}

/// Split a multi-element reply
///
/// Elements are newline-delimited; empty text is an empty list.
pub fn parse_list_reply(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(str::to_string).collect()
}
