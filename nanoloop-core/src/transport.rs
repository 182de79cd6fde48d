//! Transport socket contract.
//!
//! A transport is a non-blocking scalability-protocol socket. It never
//! blocks: operations that cannot complete return
//! [`TransportError::WouldBlock`] and the caller waits on the matching
//! [`ReadinessHandle`] instead.

use crate::error::TransportError;
use crate::protocol::Protocol;
use bytes::Bytes;
use futures::task::AtomicWaker;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// I/O direction of a readiness handle or handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Recv,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Send => "send",
            Self::Recv => "recv",
        })
    }
}

/// Identifier returned by `bind`/`connect`, consumed by `shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u32);

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

struct Readiness {
    id: u64,
    ready: AtomicBool,
    waker: AtomicWaker,
}

/// Pollable readiness descriptor.
///
/// Level-triggered: the flag stays set for as long as the transport can make
/// progress in that direction. The transport owns the level; the event loop
/// only observes it.
#[derive(Clone)]
pub struct ReadinessHandle {
    inner: Arc<Readiness>,
}

impl ReadinessHandle {
    /// Create a handle in the not-ready state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Readiness {
                id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
                ready: AtomicBool::new(false),
                waker: AtomicWaker::new(),
            }),
        }
    }

    /// Stable identity of this descriptor.
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Update the level, waking the watcher when it becomes (or stays) ready.
    pub fn set_ready(&self, ready: bool) {
        self.inner.ready.store(ready, Ordering::Release);
        if ready {
            self.inner.waker.wake();
        }
    }

    /// Wake the current watcher without touching the level.
    pub fn wake(&self) {
        self.inner.waker.wake();
    }

    /// Poll for the ready level, registering `cx`'s waker otherwise.
    pub fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_ready() {
            return Poll::Ready(());
        }
        self.inner.waker.register(cx.waker());
        // Level may have flipped between the check and the registration.
        if self.is_ready() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Default for ReadinessHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ReadinessHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ReadinessHandle {}

impl Hash for ReadinessHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ReadinessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessHandle")
            .field("id", &self.id())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Option namespace, mirroring `nn_getsockopt` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionLevel {
    /// Generic socket level (`NN_SOL_SOCKET`)
    Socket,
    /// SUB protocol level (`NN_SUB`)
    Sub,
}

/// Transport socket options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketOption {
    /// Send readiness descriptor (`NN_SNDFD`)
    SendFd,
    /// Receive readiness descriptor (`NN_RCVFD`)
    RecvFd,
    /// Protocol the socket was created with (`NN_PROTOCOL`)
    Protocol,
    /// Inbound pipe capacity in messages (`NN_RCVBUF`)
    RecvBuffer,
    /// Add a topic prefix filter (`NN_SUB_SUBSCRIBE`)
    Subscribe,
    /// Remove a topic prefix filter (`NN_SUB_UNSUBSCRIBE`)
    Unsubscribe,
}

impl SocketOption {
    pub const fn level(&self) -> OptionLevel {
        match self {
            Self::Subscribe | Self::Unsubscribe => OptionLevel::Sub,
            _ => OptionLevel::Socket,
        }
    }

    /// Descriptor option for the given direction.
    pub const fn readiness(direction: Direction) -> Self {
        match direction {
            Direction::Send => Self::SendFd,
            Direction::Recv => Self::RecvFd,
        }
    }
}

/// Option payloads.
#[derive(Debug, Clone)]
pub enum OptionValue {
    Handle(ReadinessHandle),
    Int(i64),
    Bytes(Bytes),
    Protocol(Protocol),
}

impl OptionValue {
    pub fn into_handle(self) -> Option<ReadinessHandle> {
        match self {
            Self::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Non-blocking transport socket consumed by the adapter.
///
/// Implementations must report [`TransportError::WouldBlock`] instead of
/// blocking and must keep their readiness handles' levels current.
pub trait Transport {
    /// Protocol this socket was created with.
    fn protocol(&self) -> Protocol;

    /// Bind to a local address.
    fn bind(&mut self, addr: &str) -> Result<EndpointId, TransportError>;

    /// Connect to a remote address.
    fn connect(&mut self, addr: &str) -> Result<EndpointId, TransportError>;

    /// Hand one message to the transport without blocking.
    fn try_send(&mut self, msg: &Bytes) -> Result<(), TransportError>;

    /// Take one message from the transport without blocking.
    fn try_recv(&mut self) -> Result<Bytes, TransportError>;

    fn get_option(&self, option: SocketOption) -> Result<OptionValue, TransportError>;

    fn set_option(&mut self, option: SocketOption, value: OptionValue)
        -> Result<(), TransportError>;

    /// Tear down one endpoint created by `bind` or `connect`.
    fn shutdown(&mut self, endpoint: EndpointId) -> Result<(), TransportError>;

    /// Readiness descriptor for `direction`, looked up through `get_option`.
    fn readiness(&self, direction: Direction) -> Result<ReadinessHandle, TransportError> {
        self.get_option(SocketOption::readiness(direction))?
            .into_handle()
            .ok_or_else(|| TransportError::invalid_option("readiness option is not a handle"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;

    #[test]
    fn handles_have_distinct_identity() {
        let a = ReadinessHandle::new();
        let b = ReadinessHandle::new();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn poll_ready_follows_level() {
        let handle = ReadinessHandle::new();
        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(handle.poll_ready(&mut cx).is_pending());

        handle.set_ready(true);
        assert!(handle.poll_ready(&mut cx).is_ready());

        handle.set_ready(false);
        assert!(handle.poll_ready(&mut cx).is_pending());
    }

    #[test]
    fn option_levels() {
        assert_eq!(SocketOption::Subscribe.level(), OptionLevel::Sub);
        assert_eq!(SocketOption::RecvFd.level(), OptionLevel::Socket);
        assert_eq!(SocketOption::readiness(Direction::Send), SocketOption::SendFd);
    }
}
