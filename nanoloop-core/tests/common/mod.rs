//! Scripted transport and hand-cranked reactor shared by the adapter tests.

#![allow(dead_code)]

use bytes::Bytes;
use nanoloop_core::error::TransportError;
use nanoloop_core::options::SocketOptions;
use nanoloop_core::protocol::Protocol;
use nanoloop_core::reactor::{ReadinessCallback, Reactor};
use nanoloop_core::socket::NnSocket;
use nanoloop_core::transport::{
    Direction, EndpointId, OptionValue, ReadinessHandle, SocketOption, Transport,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// What the mock transport will do next, and what it has seen.
#[derive(Debug, Default)]
pub struct MockState {
    /// Messages `try_recv` hands out, front first.
    pub inbound: VecDeque<Bytes>,
    /// Every message `try_send` accepted, in order.
    pub sent: Vec<Bytes>,
    /// `try_send` reports would-block while set.
    pub send_blocked: bool,
    /// Next `try_send` fails with this IO error.
    pub send_error: Option<String>,
    /// Next `try_recv` fails with this IO error.
    pub recv_error: Option<String>,
    /// Endpoints passed to `shutdown`, in call order.
    pub shutdowns: Vec<EndpointId>,
    pub subscriptions: Vec<Bytes>,
    next_eid: u32,
}

pub struct MockTransport {
    protocol: Protocol,
    state: Rc<RefCell<MockState>>,
    send_fd: ReadinessHandle,
    recv_fd: ReadinessHandle,
}

impl MockTransport {
    pub fn new(protocol: Protocol) -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        let transport = Self {
            protocol,
            state: state.clone(),
            send_fd: ReadinessHandle::new(),
            recv_fd: ReadinessHandle::new(),
        };
        (transport, state)
    }
}

impl Transport for MockTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn bind(&mut self, _addr: &str) -> Result<EndpointId, TransportError> {
        let mut state = self.state.borrow_mut();
        state.next_eid += 1;
        Ok(EndpointId(state.next_eid))
    }

    fn connect(&mut self, addr: &str) -> Result<EndpointId, TransportError> {
        self.bind(addr)
    }

    fn try_send(&mut self, msg: &Bytes) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = state.send_error.take() {
            return Err(io::Error::new(io::ErrorKind::Other, reason).into());
        }
        if state.send_blocked {
            return Err(TransportError::WouldBlock);
        }
        state.sent.push(msg.clone());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Bytes, TransportError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = state.recv_error.take() {
            return Err(io::Error::new(io::ErrorKind::Other, reason).into());
        }
        state.inbound.pop_front().ok_or(TransportError::WouldBlock)
    }

    fn get_option(&self, option: SocketOption) -> Result<OptionValue, TransportError> {
        match option {
            SocketOption::SendFd => Ok(OptionValue::Handle(self.send_fd.clone())),
            SocketOption::RecvFd => Ok(OptionValue::Handle(self.recv_fd.clone())),
            SocketOption::Protocol => Ok(OptionValue::Protocol(self.protocol)),
            other => Err(TransportError::invalid_option(format!("{other:?}"))),
        }
    }

    fn set_option(
        &mut self,
        option: SocketOption,
        value: OptionValue,
    ) -> Result<(), TransportError> {
        match (option, value) {
            (SocketOption::Subscribe, OptionValue::Bytes(topic)) => {
                self.state.borrow_mut().subscriptions.push(topic);
                Ok(())
            }
            (other, _) => Err(TransportError::invalid_option(format!("{other:?}"))),
        }
    }

    fn shutdown(&mut self, endpoint: EndpointId) -> Result<(), TransportError> {
        self.state.borrow_mut().shutdowns.push(endpoint);
        Ok(())
    }
}

/// Reactor whose callbacks run only when a test calls [`MockReactor::fire`].
#[derive(Default)]
pub struct MockReactor {
    callbacks: RefCell<HashMap<Direction, ReadinessCallback>>,
    adds: Cell<usize>,
    removes: Cell<usize>,
    stray_removes: Cell<usize>,
    /// Refuse the next registration.
    pub fail_next_add: Cell<bool>,
}

impl MockReactor {
    /// Invoke the callback registered for `direction`. Returns false if none.
    pub fn fire(&self, direction: Direction) -> bool {
        // Clone out first: the callback deregisters itself.
        let callback = self.callbacks.borrow().get(&direction).cloned();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, direction: Direction) -> bool {
        self.callbacks.borrow().contains_key(&direction)
    }

    pub fn adds(&self) -> usize {
        self.adds.get()
    }

    pub fn removes(&self) -> usize {
        self.removes.get()
    }

    /// Removals for directions that had nothing registered.
    pub fn stray_removes(&self) -> usize {
        self.stray_removes.get()
    }
}

impl Reactor for MockReactor {
    fn add_readiness(
        &self,
        _handle: &ReadinessHandle,
        direction: Direction,
        callback: ReadinessCallback,
    ) -> io::Result<()> {
        if self.fail_next_add.replace(false) {
            return Err(io::Error::new(io::ErrorKind::Other, "loop is shutting down"));
        }
        let mut callbacks = self.callbacks.borrow_mut();
        if callbacks.contains_key(&direction) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "double add"));
        }
        callbacks.insert(direction, callback);
        self.adds.set(self.adds.get() + 1);
        Ok(())
    }

    fn remove_readiness(&self, _handle: &ReadinessHandle, direction: Direction) -> io::Result<()> {
        match self.callbacks.borrow_mut().remove(&direction) {
            Some(_) => {
                self.removes.set(self.removes.get() + 1);
                Ok(())
            }
            None => {
                self.stray_removes.set(self.stray_removes.get() + 1);
                Err(io::Error::new(io::ErrorKind::NotFound, "stray remove"))
            }
        }
    }
}

/// A socket over a fresh mock transport and reactor.
pub fn mock_socket(
    options: SocketOptions,
) -> (NnSocket<MockTransport>, Rc<MockReactor>, Rc<RefCell<MockState>>) {
    let (transport, state) = MockTransport::new(Protocol::Pair);
    let reactor = Rc::new(MockReactor::default());
    let socket = NnSocket::with_reactor(transport, reactor.clone(), options).unwrap();
    (socket, reactor, state)
}

/// Poll a future once with a no-op waker.
pub fn poll_once<F: Future + ?Sized>(fut: Pin<&mut F>) -> Poll<F::Output> {
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    fut.poll(&mut cx)
}

pub fn msg(s: &'static str) -> Bytes {
    Bytes::from_static(s.as_bytes())
}
