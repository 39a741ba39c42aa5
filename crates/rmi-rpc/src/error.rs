//! # Error Definitions
//!
//! `Error` is what a caller sees when a call could not complete.
//! `FailureReason` is what a handler reports back to the caller; it travels
//! inside a failed reply and surfaces as `Error::Remote`.

use crate::ids::ServiceId;

/// Reasons a remote handler failed a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No handler is registered for the service id.
    ServiceNotFound(ServiceId),
    /// The service has no procedure with that id.
    MethodNotFound(String),
    /// Arguments did not match what the procedure accepts.
    BadArguments(String),
    /// The message broke the protocol spoken on the service.
    ProtocolViolation(String),
    /// The service deliberately does not implement the request.
    Unsupported(String),
    /// The invoked code itself failed.
    Failed(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceNotFound(id) => write!(f, "No handler for {}", id),
            Self::MethodNotFound(msg) => write!(f, "Method not found: {}", msg),
            Self::BadArguments(msg) => write!(f, "Bad arguments: {}", msg),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
            Self::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
            Self::Failed(msg) => write!(f, "Call failed: {}", msg),
        }
    }
}

/// Errors that occur while making a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// No reply arrived within the configured timeout.
    Timeout,
    /// The reply slot was dropped before a reply was delivered.
    ChannelClosed,
    /// The peer replied with a failure.
    Remote(FailureReason),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::ChannelClosed => write!(f, "Response channel closed"),
            Self::Remote(reason) => write!(f, "Remote failure: {}", reason),
        }
    }
}

impl std::error::Error for Error {}

impl From<FailureReason> for Error {
    fn from(reason: FailureReason) -> Self {
        Self::Remote(reason)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
