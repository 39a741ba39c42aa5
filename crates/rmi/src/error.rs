//! # Error Definitions
//!
//! One error type for the registry, the dispatcher and user methods.
//! Shared methods fail with `Error::failed(..)`; the reason travels back to a
//! synchronous caller as `Error::Remote(FailureReason::Failed(..))`.

use rmi_rpc::FailureReason;
use rmi_rpc::ValueError;

use crate::ids::ObjectId;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The RPC connection failed (disconnect, timeout).
    Rpc(rmi_rpc::Error),
    /// The peer failed the call.
    Remote(FailureReason),
    /// An argument or result had the wrong shape.
    Value(ValueError),
    /// The peer broke the registry protocol. Fatal for the registry.
    ProtocolViolation(String),
    /// The request is deliberately not implemented.
    Unsupported(String),
    /// A remote object's interface is not the one asked for.
    TypeMismatch { expected: String, found: String },
    /// No object is shared under this id.
    NoSuchObject(ObjectId),
    /// The method is not part of the interface's shared descriptor.
    UnknownMethod(String),
    /// Every object or interface id has been handed out.
    IdsExhausted,
    /// The registry stopped after an earlier protocol violation.
    Faulted(String),
    /// The registry was closed.
    Closed,
    /// A shared method failed.
    Failed(String),
}

impl Error {
    /// Fails a shared method with a message for the caller.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rpc(e) => write!(f, "RPC error: {}", e),
            Self::Remote(reason) => write!(f, "Remote failure: {}", reason),
            Self::Value(e) => write!(f, "{}", e),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
            Self::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
            Self::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            Self::NoSuchObject(id) => write!(f, "No shared object {}", id),
            Self::UnknownMethod(sig) => write!(f, "Method not shared: {}", sig),
            Self::IdsExhausted => write!(f, "No ids left"),
            Self::Faulted(msg) => write!(f, "Registry faulted: {}", msg),
            Self::Closed => write!(f, "Registry closed"),
            Self::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(e) => Some(e),
            Self::Value(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rmi_rpc::Error> for Error {
    fn from(e: rmi_rpc::Error) -> Self {
        match e {
            rmi_rpc::Error::Remote(reason) => Self::Remote(reason),
            other => Self::Rpc(other),
        }
    }
}

impl From<ValueError> for Error {
    fn from(e: ValueError) -> Self {
        Self::Value(e)
    }
}

impl From<Error> for FailureReason {
    fn from(e: Error) -> Self {
        match e {
            Error::Remote(reason) => reason,
            Error::Value(e) => FailureReason::BadArguments(e.to_string()),
            Error::ProtocolViolation(msg) => FailureReason::ProtocolViolation(msg),
            Error::Unsupported(msg) => FailureReason::Unsupported(msg),
            Error::NoSuchObject(id) => FailureReason::ServiceNotFound(id.service()),
            Error::UnknownMethod(sig) => FailureReason::MethodNotFound(sig),
            Error::Failed(msg) => FailureReason::Failed(msg),
            Error::Faulted(msg) => FailureReason::ProtocolViolation(msg),
            other => FailureReason::Failed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
