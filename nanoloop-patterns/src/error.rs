//! Pattern-layer errors.

use nanoloop_core::error::SocketError;
use nanoloop_core::protocol::Protocol;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Topic router errors.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// Underlying socket failure
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    /// Topic is empty or contains the frame separator
    #[error("Invalid topic {0:?}")]
    InvalidTopic(String),

    /// Socket was opened with the wrong protocol
    #[error("expected a {expected} socket, got {found}")]
    WrongProtocol { expected: Protocol, found: Protocol },

    /// Router loop is already running
    #[error("Subscriber already started")]
    AlreadyStarted,
}

/// Encoding or decoding failure.
#[derive(Debug, Error)]
#[error("Codec error: {0}")]
pub struct CodecError(pub String);

/// Failure raised by a call handler on the serving side.
///
/// `kind` names the error type that was raised; `detail` carries its debug
/// rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("<RemoteException {kind}({message})>")]
pub struct RemoteException {
    pub kind: String,
    pub message: String,
    pub detail: Option<String>,
}

impl RemoteException {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Generic failure reported when a response could not be delivered.
    pub fn internal() -> Self {
        Self::new("internal", "rpc error")
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Call dispatcher errors.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The remote handler failed
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteException),

    #[error("call timed out after {0:?}")]
    TimedOut(Duration),

    /// Dispatcher shut down before the call completed
    #[error("dispatcher stopped")]
    Stopped,

    #[error("missing argument {0}")]
    MissingArgument(String),

    #[error("call {0:?} is already registered")]
    DuplicateCall(String),

    /// Calls need a socket that both sends and receives
    #[error("{0} sockets cannot carry calls")]
    WrongProtocol(Protocol),
}

impl RpcError {
    /// Whether the remote handler raised this error.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Result type alias for topic router operations
pub type PubSubResult<T> = std::result::Result<T, PubSubError>;

/// Result type alias for call dispatcher operations
pub type RpcResult<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_exception_display() {
        let e = RemoteException::new("ValueError", "bad input");
        assert_eq!(e.to_string(), "<RemoteException ValueError(bad input)>");
        assert!(RpcError::from(e).is_remote());
    }

    #[test]
    fn test_internal_exception() {
        let e = RemoteException::internal();
        assert_eq!(e.kind, "internal");
        assert_eq!(e.message, "rpc error");
        assert!(e.detail.is_none());
    }
}
