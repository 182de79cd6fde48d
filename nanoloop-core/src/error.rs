/// Nanoloop Error Types
///
/// Transport-level failures and the errors surfaced by the socket adapter.

use crate::endpoint::EndpointError;
use std::io;
use thiserror::Error;

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The operation would block. Consumed by the adapter, never surfaced.
    #[error("operation would block")]
    WouldBlock,

    /// IO error from the underlying socket library
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unknown endpoint
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// Operation not supported by this transport or protocol
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Option rejected by the transport
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Transport already released
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Create an unsupported-operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an invalid-option error
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    /// Check whether this is the would-block signal
    #[must_use]
    pub const fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

/// Errors returned by [`NnSocket`](crate::socket::NnSocket) operations.
#[derive(Error, Debug)]
pub enum SocketError {
    /// Send queue is full; the message was not accepted
    #[error("send queue overflow: {max}")]
    QueueOverflow { max: usize },

    /// A receive is already suspended on this socket
    #[error("recv() already pending on this socket")]
    AlreadyPending,

    /// Socket closed (before or during the operation)
    #[error("Socket closed")]
    SocketClosed,

    /// Options failed validation
    #[error("Invalid socket options: {0}")]
    InvalidOptions(String),

    /// Transport failure, propagated unchanged
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Event loop refused a registration change
    #[error("Reactor error: {0}")]
    Reactor(io::Error),
}

/// Result type alias for socket operations
pub type Result<T> = std::result::Result<T, SocketError>;

impl SocketError {
    /// Create an invalid options error
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    /// Check if the caller may retry the same operation later
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::QueueOverflow { .. } => true,
            Self::Transport(TransportError::Io(e)) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Check if this error means the socket is gone
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::SocketClosed | Self::Transport(TransportError::Closed)
        )
    }
}
