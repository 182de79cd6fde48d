//! Readiness-driven socket adapter.
//!
//! [`NnSocket`] turns a non-blocking [`Transport`] plus a [`Reactor`] into
//! `async fn send` / `async fn recv`:
//!
//! - **Fast path**: the transport is tried directly on the caller's stack.
//! - **Slow path**: on would-block the caller suspends on a oneshot and the
//!   matching readiness handler is armed. The handler drains (recv) or
//!   flushes (send) until the transport blocks again or there is nothing
//!   left to do, then disarms itself.
//!
//! Invariants:
//! - a handler is registered with the reactor iff its state is `Registered`
//! - while a receiver is suspended the receive queue is empty
//! - queued sends reach the transport in submission order
//!
//! All state lives in one `Rc<RefCell<_>>` touched only from the loop
//! thread; readiness callbacks hold a `Weak` to it.

use crate::error::{Result, SocketError, TransportError};
use crate::handler::{Handler, HandlerState};
use crate::monitor::{create_monitor, SocketEvent, SocketEventSender, SocketMonitor};
use crate::options::SocketOptions;
use crate::protocol::Protocol;
use crate::reactor::{EventLoop, ReadinessCallback, Reactor};
use crate::stats::{SocketStats, StatsSnapshot};
use crate::transport::{Direction, EndpointId, OptionValue, ReadinessHandle, SocketOption, Transport};
use bytes::Bytes;
use futures::channel::oneshot;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// Lifecycle of a socket. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Open,
    Closing,
    Closed,
}

struct PendingSend {
    done: oneshot::Sender<Result<()>>,
    data: Bytes,
}

enum RecvStart {
    Ready(Bytes),
    Wait(oneshot::Receiver<Result<Bytes>>),
}

struct Inner<T: Transport + 'static> {
    /// `None` once closed.
    transport: Option<T>,
    protocol: Protocol,
    reactor: Rc<dyn Reactor>,
    options: SocketOptions,
    state: SocketState,

    recv_queue: VecDeque<Bytes>,
    send_queue: VecDeque<PendingSend>,
    recv_waiter: Option<oneshot::Sender<Result<Bytes>>>,
    /// Receive-drain failure with nobody waiting; handed to the next `recv()`.
    deferred_error: Option<SocketError>,

    recv_handler: Handler,
    send_handler: Handler,
    recv_fd: Option<ReadinessHandle>,
    send_fd: Option<ReadinessHandle>,

    endpoints: Vec<(EndpointId, String)>,
    stats: Rc<SocketStats>,
    monitor: Option<SocketEventSender>,
    this: Weak<RefCell<Inner<T>>>,
}

/// Asynchronous socket over a non-blocking transport.
///
/// Single consumer: at most one `recv()` may be suspended at a time.
/// Any number of `send()` calls may be suspended; they complete in order.
///
/// ## Example
///
/// ```rust,no_run
/// use nanoloop_core::inproc::InprocTransport;
/// use nanoloop_core::protocol::Protocol;
/// use nanoloop_core::socket::NnSocket;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let server = NnSocket::inproc(Protocol::Pair)?;
/// server.bind("inproc://doc-pair")?;
/// let client = NnSocket::inproc(Protocol::Pair)?;
/// client.connect("inproc://doc-pair")?;
///
/// client.send("ping").await?;
/// assert_eq!(server.recv().await?, "ping");
///
/// client.close();
/// server.close();
/// # Ok(())
/// # }
/// ```
pub struct NnSocket<T: Transport + 'static> {
    inner: Rc<RefCell<Inner<T>>>,
    stats: Rc<SocketStats>,
}

impl<T: Transport + 'static> NnSocket<T> {
    /// Wrap `transport`, driving readiness from the current compio runtime.
    pub fn new(transport: T, options: SocketOptions) -> Result<Self> {
        Self::with_reactor(transport, Rc::new(EventLoop::new()), options)
    }

    /// Wrap `transport` using an explicit reactor.
    pub fn with_reactor(
        transport: T,
        reactor: Rc<dyn Reactor>,
        options: SocketOptions,
    ) -> Result<Self> {
        options.validate()?;
        let protocol = transport.protocol();
        let stats = Rc::new(SocketStats::default());

        let inner = Rc::new_cyclic(|this| {
            RefCell::new(Inner {
                transport: Some(transport),
                protocol,
                reactor,
                options,
                state: SocketState::Open,
                recv_queue: VecDeque::new(),
                send_queue: VecDeque::new(),
                recv_waiter: None,
                deferred_error: None,
                recv_handler: Handler::new(Direction::Recv),
                send_handler: Handler::new(Direction::Send),
                recv_fd: None,
                send_fd: None,
                endpoints: Vec::new(),
                stats: stats.clone(),
                monitor: None,
                this: this.clone(),
            })
        });

        debug!(protocol = %protocol, "[SOCKET] created");
        Ok(Self { inner, stats })
    }

    /// Bind to a local address. The address is passed to the transport as is.
    pub fn bind(&self, addr: &str) -> Result<EndpointId> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_open()?;
        match inner.transport_mut()?.bind(addr) {
            Ok(eid) => {
                debug!(addr, eid = eid.0, "[SOCKET] bound");
                inner.endpoints.push((eid, addr.to_string()));
                inner.emit(SocketEvent::Bound(addr.to_string()));
                Ok(eid)
            }
            Err(e) => {
                inner.emit(SocketEvent::BindFailed {
                    address: addr.to_string(),
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Connect to a remote address.
    pub fn connect(&self, addr: &str) -> Result<EndpointId> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_open()?;
        match inner.transport_mut()?.connect(addr) {
            Ok(eid) => {
                debug!(addr, eid = eid.0, "[SOCKET] connected");
                inner.endpoints.push((eid, addr.to_string()));
                inner.emit(SocketEvent::Connected(addr.to_string()));
                Ok(eid)
            }
            Err(e) => {
                inner.emit(SocketEvent::ConnectFailed {
                    address: addr.to_string(),
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Send one message.
    ///
    /// Completes once the transport has accepted the bytes. Fails with
    /// `QueueOverflow` without suspending when the transport is blocked and
    /// the send queue is full.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let pending = self.inner.borrow_mut().start_send(data.into())?;
        match pending {
            None => Ok(()),
            Some(done) => done.await.unwrap_or(Err(SocketError::SocketClosed)),
        }
    }

    /// Receive one message.
    ///
    /// Fails with `AlreadyPending` if another `recv()` is suspended.
    pub async fn recv(&self) -> Result<Bytes> {
        let start = self.inner.borrow_mut().start_recv()?;
        match start {
            RecvStart::Ready(msg) => Ok(msg),
            RecvStart::Wait(waiter) => waiter.await.unwrap_or(Err(SocketError::SocketClosed)),
        }
    }

    /// Close the socket. Idempotent.
    ///
    /// Deregisters both handlers, fails suspended operations with
    /// `SocketClosed`, shuts down every endpoint and releases the transport.
    pub fn close(&self) {
        self.inner.borrow_mut().close();
    }

    /// Shut down all endpoints but keep the socket open.
    pub fn shutdown(&self) {
        self.inner.borrow_mut().shutdown_endpoints();
    }

    /// Re-arm the receive handler after backpressure released it.
    ///
    /// Returns `Ok(true)` if a registration happened. Does nothing while
    /// the receive queue is still full.
    pub fn resume_recv(&self) -> Result<bool> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_open()?;
        if inner.recv_handler.is_registered()
            || inner.recv_queue.len() >= inner.options.recv_queue_max_size
        {
            return Ok(false);
        }
        inner.arm_recv()?;
        Ok(true)
    }

    pub fn get_option(&self, option: SocketOption) -> Result<OptionValue> {
        let inner = self.inner.borrow();
        let transport = inner.transport.as_ref().ok_or(SocketError::SocketClosed)?;
        Ok(transport.get_option(option)?)
    }

    pub fn set_option(&self, option: SocketOption, value: OptionValue) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_open()?;
        inner.transport_mut()?.set_option(option, value)?;
        Ok(())
    }

    /// Enable monitoring for this socket.
    ///
    /// Returns a receiver for socket lifecycle events.
    pub fn monitor(&self) -> SocketMonitor {
        let (sender, receiver) = create_monitor();
        self.inner.borrow_mut().monitor = Some(sender);
        receiver
    }

    pub fn protocol(&self) -> Protocol {
        self.inner.borrow().protocol
    }

    pub fn options(&self) -> SocketOptions {
        self.inner.borrow().options.clone()
    }

    pub fn state(&self) -> SocketState {
        self.inner.borrow().state
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state() == SocketState::Closed
    }

    pub fn recv_queue_len(&self) -> usize {
        self.inner.borrow().recv_queue.len()
    }

    pub fn send_queue_len(&self) -> usize {
        self.inner.borrow().send_queue.len()
    }

    /// Whether a `recv()` is currently suspended.
    pub fn has_pending_recv(&self) -> bool {
        self.inner.borrow().recv_waiter.is_some()
    }

    pub fn handler_state(&self, direction: Direction) -> HandlerState {
        let inner = self.inner.borrow();
        match direction {
            Direction::Send => inner.send_handler.state(),
            Direction::Recv => inner.recv_handler.state(),
        }
    }

    /// Addresses of live endpoints, in creation order.
    pub fn endpoints(&self) -> Vec<String> {
        self.inner
            .borrow()
            .endpoints
            .iter()
            .map(|(_, addr)| addr.clone())
            .collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<T: Transport + 'static> fmt::Debug for NnSocket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("NnSocket")
            .field("protocol", &inner.protocol)
            .field("state", &inner.state)
            .field("recv_queue", &inner.recv_queue.len())
            .field("send_queue", &inner.send_queue.len())
            .field("recv_handler", &inner.recv_handler.state())
            .field("send_handler", &inner.send_handler.state())
            .finish()
    }
}

fn on_sendable<T: Transport + 'static>(this: &Weak<RefCell<Inner<T>>>) {
    let Some(inner) = this.upgrade() else { return };
    match inner.try_borrow_mut() {
        Ok(mut inner) => inner.flush_send_queue(),
        // Level stays high; the loop calls again.
        Err(_) => trace!("[SOCKET] send callback re-entered, skipping"),
    };
}

fn on_recvable<T: Transport + 'static>(this: &Weak<RefCell<Inner<T>>>) {
    let Some(inner) = this.upgrade() else { return };
    match inner.try_borrow_mut() {
        Ok(mut inner) => inner.drain_recv(),
        Err(_) => trace!("[SOCKET] recv callback re-entered, skipping"),
    };
}

impl<T: Transport + 'static> Inner<T> {
    fn ensure_open(&self) -> Result<()> {
        if self.state == SocketState::Open {
            Ok(())
        } else {
            Err(SocketError::SocketClosed)
        }
    }

    fn transport_mut(&mut self) -> Result<&mut T> {
        self.transport.as_mut().ok_or(SocketError::SocketClosed)
    }

    fn emit(&self, event: SocketEvent) {
        if let Some(monitor) = &self.monitor {
            let _ = monitor.send(event);
        }
    }

    /// Cached readiness descriptor for `direction`.
    fn readiness(&mut self, direction: Direction) -> Result<ReadinessHandle> {
        let cached = match direction {
            Direction::Send => self.send_fd.clone(),
            Direction::Recv => self.recv_fd.clone(),
        };
        if let Some(handle) = cached {
            return Ok(handle);
        }
        let handle = self
            .transport
            .as_ref()
            .ok_or(SocketError::SocketClosed)?
            .readiness(direction)?;
        match direction {
            Direction::Send => self.send_fd = Some(handle.clone()),
            Direction::Recv => self.recv_fd = Some(handle.clone()),
        }
        Ok(handle)
    }

    fn arm_send(&mut self) -> Result<()> {
        let handle = self.readiness(Direction::Send)?;
        let this = self.this.clone();
        let callback: ReadinessCallback = Rc::new(move || on_sendable(&this));
        self.send_handler
            .arm(self.reactor.as_ref(), &handle, callback)
            .map_err(SocketError::Reactor)?;
        Ok(())
    }

    fn arm_recv(&mut self) -> Result<()> {
        let handle = self.readiness(Direction::Recv)?;
        let this = self.this.clone();
        let callback: ReadinessCallback = Rc::new(move || on_recvable(&this));
        self.recv_handler
            .arm(self.reactor.as_ref(), &handle, callback)
            .map_err(SocketError::Reactor)?;
        Ok(())
    }

    fn disarm(&mut self, direction: Direction) {
        let (handler, fd) = match direction {
            Direction::Send => (&mut self.send_handler, &self.send_fd),
            Direction::Recv => (&mut self.recv_handler, &self.recv_fd),
        };
        let Some(fd) = fd else { return };
        if let Err(e) = handler.disarm(self.reactor.as_ref(), fd) {
            warn!(%direction, error = %e, "[SOCKET] reactor rejected handler removal");
        }
    }

    fn purge_cancelled_sends(&mut self) {
        let before = self.send_queue.len();
        self.send_queue.retain(|entry| !entry.done.is_canceled());
        let purged = before - self.send_queue.len();
        if purged > 0 {
            trace!(purged, "[SOCKET] dropped abandoned sends");
        }
    }

    fn start_send(&mut self, data: Bytes) -> Result<Option<oneshot::Receiver<Result<()>>>> {
        self.ensure_open()?;
        self.purge_cancelled_sends();

        // Earlier queued messages go first.
        if self.send_queue.is_empty() {
            match self.transport_mut()?.try_send(&data) {
                Ok(()) => {
                    self.stats.foreground_send();
                    trace!(len = data.len(), "[SOCKET] foreground send");
                    return Ok(None);
                }
                Err(TransportError::WouldBlock) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let max = self.options.send_queue_max_size;
        if self.send_queue.len() >= max {
            self.stats.send_overflow();
            debug!(max, "[SOCKET] send queue overflow");
            return Err(SocketError::QueueOverflow { max });
        }

        let (done, waiter) = oneshot::channel();
        self.send_queue.push_back(PendingSend { done, data });
        if let Err(e) = self.arm_send() {
            self.send_queue.pop_back();
            return Err(e);
        }
        trace!(queued = self.send_queue.len(), "[SOCKET] send suspended");
        Ok(Some(waiter))
    }

    /// Send-readiness callback body: flush until blocked or empty.
    fn flush_send_queue(&mut self) {
        let mut sent = 0usize;
        loop {
            let Some(entry) = self.send_queue.pop_front() else {
                self.disarm(Direction::Send);
                break;
            };
            if entry.done.is_canceled() {
                trace!("[SOCKET] skipping abandoned send");
                continue;
            }

            let result = match self.transport.as_mut() {
                Some(transport) => transport.try_send(&entry.data),
                None => Err(TransportError::Closed),
            };
            match result {
                Ok(()) => {
                    self.stats.background_send(sent > 0);
                    sent += 1;
                    let _ = entry.done.send(Ok(()));
                }
                Err(TransportError::WouldBlock) => {
                    self.send_queue.push_front(entry);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "[SOCKET] queued send failed");
                    let _ = entry.done.send(Err(e.into()));
                }
            }
        }
        if sent > 0 {
            trace!(sent, remaining = self.send_queue.len(), "[SOCKET] background send");
        }
    }

    fn start_recv(&mut self) -> Result<RecvStart> {
        self.ensure_open()?;

        if let Some(msg) = self.recv_queue.pop_front() {
            self.stats.foreground_recv();
            return Ok(RecvStart::Ready(msg));
        }
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        if let Some(waiter) = &self.recv_waiter {
            if !waiter.is_canceled() {
                return Err(SocketError::AlreadyPending);
            }
            self.recv_waiter = None;
        }

        match self.transport_mut()?.try_recv() {
            Ok(msg) => {
                self.stats.foreground_recv();
                trace!(len = msg.len(), "[SOCKET] foreground recv");
                return Ok(RecvStart::Ready(msg));
            }
            Err(TransportError::WouldBlock) => {}
            Err(e) => return Err(e.into()),
        }

        self.arm_recv()?;
        let (tx, waiter) = oneshot::channel();
        self.recv_waiter = Some(tx);
        trace!("[SOCKET] recv suspended");
        Ok(RecvStart::Wait(waiter))
    }

    /// Receive-readiness callback body: drain until blocked or full.
    fn drain_recv(&mut self) {
        let max = self.options.recv_queue_max_size;
        loop {
            if self.recv_waiter.is_none() && self.recv_queue.len() >= max {
                debug!(max, "[SOCKET] recv queue full, pausing recv handler");
                self.disarm(Direction::Recv);
                break;
            }

            let result = match self.transport.as_mut() {
                Some(transport) => transport.try_recv(),
                None => Err(TransportError::Closed),
            };
            match result {
                Ok(msg) => {
                    self.stats.background_recv();
                    self.deliver(msg);
                }
                Err(TransportError::WouldBlock) => {
                    self.disarm(Direction::Recv);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "[SOCKET] recv failed in readiness callback");
                    self.disarm(Direction::Recv);
                    self.fail_recv(e.into());
                    break;
                }
            }
        }
    }

    fn deliver(&mut self, msg: Bytes) {
        match self.recv_waiter.take() {
            Some(waiter) => {
                if let Err(Ok(msg)) = waiter.send(Ok(msg)) {
                    trace!("[SOCKET] receiver abandoned, queueing message");
                    self.recv_queue.push_back(msg);
                }
            }
            None => self.recv_queue.push_back(msg),
        }
    }

    fn fail_recv(&mut self, err: SocketError) {
        match self.recv_waiter.take() {
            Some(waiter) => {
                if let Err(Err(err)) = waiter.send(Err(err)) {
                    self.deferred_error = Some(err);
                }
            }
            None => self.deferred_error = Some(err),
        }
    }

    fn shutdown_endpoints(&mut self) {
        while let Some((eid, addr)) = self.endpoints.pop() {
            let Some(transport) = self.transport.as_mut() else { break };
            match transport.shutdown(eid) {
                Ok(()) => {
                    debug!(addr = %addr, eid = eid.0, "[SOCKET] endpoint shut down");
                    self.emit(SocketEvent::Shutdown(addr));
                }
                Err(e) => warn!(addr = %addr, error = %e, "[SOCKET] shutdown error"),
            }
        }
    }

    fn close(&mut self) {
        if self.state != SocketState::Open {
            return;
        }
        self.state = SocketState::Closing;

        self.disarm(Direction::Recv);
        self.disarm(Direction::Send);

        let abandoned = self.send_queue.len();
        for entry in self.send_queue.drain(..) {
            let _ = entry.done.send(Err(SocketError::SocketClosed));
        }
        if let Some(waiter) = self.recv_waiter.take() {
            let _ = waiter.send(Err(SocketError::SocketClosed));
        }
        self.recv_queue.clear();
        self.deferred_error = None;

        self.shutdown_endpoints();
        self.transport = None;
        self.state = SocketState::Closed;
        self.emit(SocketEvent::Closed);
        debug!(protocol = %self.protocol, abandoned, "[SOCKET] closed");
    }
}

impl<T: Transport + 'static> Drop for Inner<T> {
    fn drop(&mut self) {
        if self.state == SocketState::Open {
            warn!(protocol = %self.protocol, "[SOCKET] dropped without close()");
            self.close();
        }
    }
}
