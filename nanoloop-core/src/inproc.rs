//! In-process transport.
//!
//! [`InprocTransport`] is a non-blocking scalability-protocol socket for
//! peers living in the same process, addressed with `inproc://name`.
//!
//! # Features
//!
//! - **Zero-copy**: messages are refcounted `Bytes` moved through `flume` pipes
//! - **Readiness**: every socket exposes send / recv [`ReadinessHandle`]s whose
//!   levels follow its pipes, so it can back an [`NnSocket`]
//! - **Protocols**: PAIR, PUSH/PULL, PUB/SUB (prefix filters), BUS
//!
//! Each socket owns one bounded inbound pipe. Unicast protocols (PAIR, PUSH)
//! report would-block when no peer pipe has room; broadcast protocols
//! (PUB, BUS) never block and drop for peers that are full.

use crate::endpoint::{Endpoint, EndpointError};
use crate::error::{Result as SocketResult, TransportError};
use crate::options::{InprocOptions, SocketOptions};
use crate::protocol::Protocol;
use crate::socket::NnSocket;
use crate::subscription::SubscriptionSet;
use crate::transport::{EndpointId, OptionValue, ReadinessHandle, SocketOption, Transport};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flume::{Receiver, Sender, TryRecvError, TrySendError};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Bound socket and the binder-side endpoint id.
struct Registration {
    socket: Weak<Shared>,
    eid: EndpointId,
}

/// Global registry of bound inproc endpoints
static INPROC_REGISTRY: once_cell::sync::Lazy<DashMap<String, Registration>> =
    once_cell::sync::Lazy::new(DashMap::new);

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// One half of a bidirectional connection.
struct Link {
    id: u64,
    /// Local endpoint that created this link.
    via: EndpointId,
    peer: Weak<Shared>,
}

/// State visible to peers.
struct Shared {
    protocol: Protocol,
    capacity: usize,
    inbox_tx: Sender<Bytes>,
    inbox_rx: Receiver<Bytes>,
    readable: ReadinessHandle,
    writable: ReadinessHandle,
    filters: Mutex<SubscriptionSet>,
    links: Mutex<Vec<Link>>,
    cursor: AtomicUsize,
}

impl Shared {
    fn live_peers(&self) -> Vec<Arc<Shared>> {
        let mut links = self.links.lock();
        links.retain(|link| link.peer.strong_count() > 0);
        links.iter().filter_map(|link| link.peer.upgrade()).collect()
    }

    /// Offer `msg` to this socket's inbound pipe.
    fn offer(&self, msg: &Bytes) -> bool {
        match self.inbox_tx.try_send(msg.clone()) {
            Ok(()) => {
                self.readable.set_ready(true);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn accepts_broadcast(&self, from: Protocol, msg: &[u8]) -> bool {
        from != Protocol::Pub || self.filters.lock().matches(msg)
    }

    fn drop_links<F: Fn(&Link) -> bool>(&self, predicate: F) -> Vec<Link> {
        let mut links = self.links.lock();
        let (removed, kept): (Vec<_>, Vec<_>) = links.drain(..).partition(|l| predicate(l));
        *links = kept;
        removed
    }
}

#[derive(Debug)]
enum EndpointKind {
    Bound(String),
    Connected(String),
}

/// Non-blocking in-process transport socket.
pub struct InprocTransport {
    shared: Arc<Shared>,
    endpoints: HashMap<EndpointId, EndpointKind>,
    next_eid: u32,
}

impl InprocTransport {
    /// Create an unbound socket with default options.
    pub fn new(protocol: Protocol) -> Self {
        Self::with_options(protocol, InprocOptions::default())
    }

    pub fn with_options(protocol: Protocol, options: InprocOptions) -> Self {
        let capacity = options.pipe_capacity.max(1);
        let (inbox_tx, inbox_rx) = flume::bounded(capacity);
        let writable = ReadinessHandle::new();
        // Broadcast sockets never block.
        if matches!(protocol, Protocol::Pub | Protocol::Bus) {
            writable.set_ready(true);
        }
        Self {
            shared: Arc::new(Shared {
                protocol,
                capacity,
                inbox_tx,
                inbox_rx,
                readable: ReadinessHandle::new(),
                writable,
                filters: Mutex::new(SubscriptionSet::new()),
                links: Mutex::new(Vec::new()),
                cursor: AtomicUsize::new(0),
            }),
            endpoints: HashMap::new(),
            next_eid: 1,
        }
    }

    /// Number of live peer connections.
    pub fn peer_count(&self) -> usize {
        self.shared.live_peers().len()
    }

    /// Messages waiting in the inbound pipe.
    pub fn pending(&self) -> usize {
        self.shared.inbox_rx.len()
    }

    fn check_supported(&self) -> Result<(), TransportError> {
        match self.shared.protocol {
            Protocol::Pair | Protocol::Pub | Protocol::Sub | Protocol::Push | Protocol::Pull
            | Protocol::Bus => Ok(()),
            other => Err(TransportError::unsupported(format!(
                "{other} is not available over inproc"
            ))),
        }
    }

    fn next_endpoint(&mut self) -> EndpointId {
        let eid = EndpointId(self.next_eid);
        self.next_eid += 1;
        eid
    }

    fn send_unicast(&self, msg: &Bytes) -> Result<(), TransportError> {
        let peers = self.shared.live_peers();
        let n = peers.len();
        let start = self.shared.cursor.load(Ordering::Relaxed);
        for i in 0..n {
            let idx = (start + i) % n;
            if peers[idx].offer(msg) {
                self.shared.cursor.store(idx + 1, Ordering::Relaxed);
                return Ok(());
            }
        }
        self.shared.writable.set_ready(false);
        // A peer may have drained between the offers and the level reset.
        if peers.iter().any(|p| !p.inbox_tx.is_full()) {
            self.shared.writable.set_ready(true);
        }
        Err(TransportError::WouldBlock)
    }

    fn send_broadcast(&self, msg: &Bytes) {
        let from = self.shared.protocol;
        for peer in self.shared.live_peers() {
            if peer.accepts_broadcast(from, msg) && !peer.offer(msg) {
                trace!("[INPROC] peer pipe full, dropping broadcast");
            }
        }
    }

    fn unlink(&self, removed: Vec<Link>) {
        for link in removed {
            if let Some(peer) = link.peer.upgrade() {
                peer.drop_links(|l| l.id == link.id);
            }
        }
    }
}

impl Transport for InprocTransport {
    fn protocol(&self) -> Protocol {
        self.shared.protocol
    }

    fn bind(&mut self, addr: &str) -> Result<EndpointId, TransportError> {
        self.check_supported()?;
        let Endpoint::Inproc(name) = Endpoint::parse(addr)? else {
            return Err(TransportError::unsupported(format!(
                "inproc transport cannot bind {addr}"
            )));
        };

        let eid = EndpointId(self.next_eid);
        let registration = Registration {
            socket: Arc::downgrade(&self.shared),
            eid,
        };
        match INPROC_REGISTRY.entry(name.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().socket.strong_count() > 0 {
                    return Err(EndpointError::AddrInUse(name).into());
                }
                entry.insert(registration);
            }
            Entry::Vacant(entry) => {
                entry.insert(registration);
            }
        }
        self.next_eid += 1;

        debug!(name = %name, eid = eid.0, "[INPROC] bound");
        self.endpoints.insert(eid, EndpointKind::Bound(name));
        Ok(eid)
    }

    fn connect(&mut self, addr: &str) -> Result<EndpointId, TransportError> {
        self.check_supported()?;
        let Endpoint::Inproc(name) = Endpoint::parse(addr)? else {
            return Err(TransportError::unsupported(format!(
                "inproc transport cannot connect {addr}"
            )));
        };

        let (remote, remote_via) = INPROC_REGISTRY
            .get(&name)
            .and_then(|entry| Some((entry.socket.upgrade()?, entry.eid)))
            .ok_or_else(|| EndpointError::NotFound(name.clone()))?;

        let local = self.shared.protocol;
        if !local.is_compatible(remote.protocol) {
            return Err(TransportError::unsupported(format!(
                "{local} cannot connect to {}",
                remote.protocol
            )));
        }
        if local == Protocol::Pair
            && (!self.shared.live_peers().is_empty() || !remote.live_peers().is_empty())
        {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::AddrInUse,
                "PAIR socket already has a peer",
            )));
        }

        let eid = self.next_endpoint();
        let id = NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed);
        self.shared.links.lock().push(Link {
            id,
            via: eid,
            peer: Arc::downgrade(&remote),
        });
        remote.links.lock().push(Link {
            id,
            via: remote_via,
            peer: Arc::downgrade(&self.shared),
        });

        self.shared.writable.set_ready(true);
        remote.writable.set_ready(true);

        debug!(name = %name, eid = eid.0, "[INPROC] connected");
        self.endpoints.insert(eid, EndpointKind::Connected(name));
        Ok(eid)
    }

    fn try_send(&mut self, msg: &Bytes) -> Result<(), TransportError> {
        if !self.shared.protocol.can_send() {
            return Err(TransportError::unsupported(format!(
                "{} sockets cannot send",
                self.shared.protocol
            )));
        }
        match self.shared.protocol {
            Protocol::Pub | Protocol::Bus => {
                self.send_broadcast(msg);
                Ok(())
            }
            _ => self.send_unicast(msg),
        }
    }

    fn try_recv(&mut self) -> Result<Bytes, TransportError> {
        if !self.shared.protocol.can_recv() {
            return Err(TransportError::unsupported(format!(
                "{} sockets cannot receive",
                self.shared.protocol
            )));
        }
        let shared = &self.shared;
        match shared.inbox_rx.try_recv() {
            Ok(msg) => {
                if shared.inbox_rx.is_empty() {
                    shared.readable.set_ready(false);
                    if !shared.inbox_rx.is_empty() {
                        shared.readable.set_ready(true);
                    }
                }
                // Room opened up for whoever writes to us.
                for peer in shared.live_peers() {
                    peer.writable.set_ready(true);
                }
                Ok(msg)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                shared.readable.set_ready(false);
                if !shared.inbox_rx.is_empty() {
                    shared.readable.set_ready(true);
                }
                Err(TransportError::WouldBlock)
            }
        }
    }

    fn get_option(&self, option: SocketOption) -> Result<OptionValue, TransportError> {
        match option {
            SocketOption::SendFd => Ok(OptionValue::Handle(self.shared.writable.clone())),
            SocketOption::RecvFd => Ok(OptionValue::Handle(self.shared.readable.clone())),
            SocketOption::Protocol => Ok(OptionValue::Protocol(self.shared.protocol)),
            SocketOption::RecvBuffer => Ok(OptionValue::Int(self.shared.capacity as i64)),
            SocketOption::Subscribe | SocketOption::Unsubscribe => Err(
                TransportError::invalid_option(format!("{option:?} is write-only")),
            ),
        }
    }

    fn set_option(
        &mut self,
        option: SocketOption,
        value: OptionValue,
    ) -> Result<(), TransportError> {
        match (option, value) {
            (SocketOption::Subscribe | SocketOption::Unsubscribe, _)
                if self.shared.protocol != Protocol::Sub =>
            {
                Err(TransportError::invalid_option(format!(
                    "{option:?} requires a SUB socket"
                )))
            }
            (SocketOption::Subscribe, OptionValue::Bytes(topic)) => {
                self.shared.filters.lock().subscribe(topic);
                Ok(())
            }
            (SocketOption::Unsubscribe, OptionValue::Bytes(topic)) => {
                self.shared.filters.lock().unsubscribe(&topic);
                Ok(())
            }
            (option, value) => Err(TransportError::invalid_option(format!(
                "cannot set {option:?} to {value:?}"
            ))),
        }
    }

    fn shutdown(&mut self, endpoint: EndpointId) -> Result<(), TransportError> {
        let kind = self.endpoints.remove(&endpoint).ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown endpoint id {}", endpoint.0),
            ))
        })?;

        let name = match kind {
            EndpointKind::Bound(name) => {
                let me = Arc::downgrade(&self.shared);
                INPROC_REGISTRY.remove_if(&name, |_, reg| reg.socket.ptr_eq(&me));
                name
            }
            EndpointKind::Connected(name) => name,
        };
        let removed = self.shared.drop_links(|l| l.via == endpoint);
        trace!(%name, links = removed.len(), "[INPROC] endpoint shut down");
        self.unlink(removed);
        Ok(())
    }
}

impl Drop for InprocTransport {
    fn drop(&mut self) {
        let eids: Vec<EndpointId> = self.endpoints.keys().copied().collect();
        for eid in eids {
            let _ = self.shutdown(eid);
        }
    }
}

impl NnSocket<InprocTransport> {
    /// Open an inproc socket with default transport and adapter options.
    pub fn inproc(protocol: Protocol) -> SocketResult<Self> {
        Self::new(InprocTransport::new(protocol), SocketOptions::default())
    }
}

/// List all currently bound inproc endpoints.
///
/// This is primarily useful for debugging and testing.
pub fn list_inproc_endpoints() -> Vec<String> {
    INPROC_REGISTRY
        .iter()
        .filter(|entry| entry.socket.strong_count() > 0)
        .map(|entry| entry.key().clone())
        .collect()
}
