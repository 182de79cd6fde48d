//! Socket configuration options
//!
//! Adapter-side queue limits and the bundled inproc transport's pipe size.

use crate::error::{Result, SocketError};

/// Default capacity of both adapter queues.
pub const DEFAULT_QUEUE_MAX_SIZE: usize = 500;

/// Default inproc pipe high water mark.
pub const DEFAULT_PIPE_CAPACITY: usize = 1000;

/// Socket adapter options.
///
/// # Examples
///
/// ```
/// use nanoloop_core::options::SocketOptions;
///
/// let opts = SocketOptions::default()
///     .with_recv_queue_max_size(64)
///     .with_send_queue_max_size(16);
/// assert!(opts.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Receive queue capacity
    ///
    /// Messages drained by the receive handler while no caller waits.
    /// When reached the handler is deregistered and further inbound data
    /// stays buffered in the transport.
    /// - Default: 500 messages
    pub recv_queue_max_size: usize,

    /// Send queue capacity
    ///
    /// Messages waiting for the transport to become sendable.
    /// When reached `send()` fails with `QueueOverflow` instead of suspending.
    /// - Default: 500 messages
    pub send_queue_max_size: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            recv_queue_max_size: DEFAULT_QUEUE_MAX_SIZE,
            send_queue_max_size: DEFAULT_QUEUE_MAX_SIZE,
        }
    }
}

impl SocketOptions {
    /// Create new socket options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set receive queue capacity.
    pub fn with_recv_queue_max_size(mut self, size: usize) -> Self {
        self.recv_queue_max_size = size;
        self
    }

    /// Set send queue capacity.
    pub fn with_send_queue_max_size(mut self, size: usize) -> Self {
        self.send_queue_max_size = size;
        self
    }

    /// Check that both capacities are positive.
    pub fn validate(&self) -> Result<()> {
        if self.recv_queue_max_size == 0 {
            return Err(SocketError::invalid_options(
                "recv_queue_max_size must be positive",
            ));
        }
        if self.send_queue_max_size == 0 {
            return Err(SocketError::invalid_options(
                "send_queue_max_size must be positive",
            ));
        }
        Ok(())
    }
}

/// Options for [`InprocTransport`](crate::inproc::InprocTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InprocOptions {
    /// Inbound pipe capacity (messages). Senders see would-block when full.
    pub pipe_capacity: usize,
}

impl Default for InprocOptions {
    fn default() -> Self {
        Self {
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

impl InprocOptions {
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }
}
