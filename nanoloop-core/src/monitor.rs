//! Socket event monitoring.
//!
//! Provides event streams for tracking socket lifecycle events like
//! binds, connects, endpoint shutdowns and close.

use std::fmt;

/// Socket lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Socket successfully bound to an address.
    Bound(String),

    /// Bind operation failed.
    BindFailed { address: String, reason: String },

    /// Socket successfully connected to an address.
    Connected(String),

    /// Connection attempt failed.
    ConnectFailed { address: String, reason: String },

    /// An endpoint was shut down.
    Shutdown(String),

    /// Socket closed; no further events follow.
    Closed,
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound(addr) => write!(f, "Bound to {addr}"),
            Self::BindFailed { address, reason } => {
                write!(f, "Bind failed for {address}: {reason}")
            }
            Self::Connected(addr) => write!(f, "Connected to {addr}"),
            Self::ConnectFailed { address, reason } => {
                write!(f, "Connect failed for {address}: {reason}")
            }
            Self::Shutdown(addr) => write!(f, "Shut down {addr}"),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Handle for receiving socket events.
pub type SocketMonitor = flume::Receiver<SocketEvent>;

/// Internal sender for socket events.
pub type SocketEventSender = flume::Sender<SocketEvent>;

/// Creates a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (SocketEventSender, SocketMonitor) {
    flume::unbounded()
}
