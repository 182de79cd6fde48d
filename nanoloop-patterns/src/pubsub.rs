//! Topic router over PUB/SUB sockets.
//!
//! Frames are `topic|payload`. The [`Publisher`] prepends the topic; the
//! [`Subscriber`] installs a transport prefix filter per topic and runs a
//! single router loop that splits each frame on the first separator and
//! hands the payload to every listener of that topic.
//!
//! ## Example
//!
//! ```rust,no_run
//! use nanoloop_patterns::pubsub::{Publisher, Subscriber, SubscriberOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = Publisher::inproc()?;
//! publisher.bind("inproc://weather")?;
//!
//! let subscriber = Subscriber::inproc(SubscriberOptions::default())?;
//! subscriber.connect("inproc://weather")?;
//! subscriber.subscribe("rain", |payload| async move {
//!     println!("rain: {payload:?}");
//! })?;
//! subscriber.start()?;
//!
//! publisher.publish("rain", "heavy").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{PubSubError, PubSubResult};
use bytes::{BufMut, Bytes, BytesMut};
use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use hashbrown::HashMap;
use nanoloop_core::error::SocketError;
use nanoloop_core::inproc::InprocTransport;
use nanoloop_core::options::SocketOptions;
use nanoloop_core::protocol::Protocol;
use nanoloop_core::reactor::EventLoop;
use nanoloop_core::socket::NnSocket;
use nanoloop_core::transport::{EndpointId, OptionValue, SocketOption, Transport};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Separator between topic and payload.
pub const TOPIC_SEPARATOR: u8 = b'|';

/// Default interval at which the router loop checks its stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn validate_topic(topic: &str) -> PubSubResult<()> {
    if topic.is_empty() || topic.as_bytes().contains(&TOPIC_SEPARATOR) {
        return Err(PubSubError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

fn expect_protocol(found: Protocol, expected: Protocol) -> PubSubResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(PubSubError::WrongProtocol { expected, found })
    }
}

/// Build a `topic|payload` frame.
pub fn encode_frame(topic: &str, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(topic.len() + 1 + payload.len());
    frame.put_slice(topic.as_bytes());
    frame.put_u8(TOPIC_SEPARATOR);
    frame.put_slice(payload);
    frame.freeze()
}

/// Split a frame on the first separator. Both halves share `frame`'s buffer.
pub fn split_frame(frame: &Bytes) -> Option<(Bytes, Bytes)> {
    let pos = frame.iter().position(|b| *b == TOPIC_SEPARATOR)?;
    Some((frame.slice(..pos), frame.slice(pos + 1..)))
}

/// PUB side of the topic router.
pub struct Publisher<T: Transport + 'static> {
    socket: NnSocket<T>,
}

impl Publisher<InprocTransport> {
    /// Publisher over a fresh inproc PUB socket.
    pub fn inproc() -> PubSubResult<Self> {
        Self::new(NnSocket::inproc(Protocol::Pub)?)
    }
}

impl<T: Transport + 'static> Publisher<T> {
    /// Wrap a PUB socket.
    pub fn new(socket: NnSocket<T>) -> PubSubResult<Self> {
        expect_protocol(socket.protocol(), Protocol::Pub)?;
        Ok(Self { socket })
    }

    pub fn bind(&self, addr: &str) -> PubSubResult<EndpointId> {
        Ok(self.socket.bind(addr)?)
    }

    pub fn connect(&self, addr: &str) -> PubSubResult<EndpointId> {
        Ok(self.socket.connect(addr)?)
    }

    /// Publish a pre-encoded payload to `topic`.
    pub async fn publish(&self, topic: &str, payload: impl AsRef<[u8]>) -> PubSubResult<()> {
        validate_topic(topic)?;
        self.socket.send(encode_frame(topic, payload.as_ref())).await?;
        Ok(())
    }

    pub fn socket(&self) -> &NnSocket<T> {
        &self.socket
    }

    pub fn close(&self) {
        self.socket.close();
    }
}

/// Identifies one listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback run for every payload published to a subscribed topic.
pub type Listener = Rc<dyn Fn(Bytes) -> LocalBoxFuture<'static, ()>>;

type ListenerList = SmallVec<[(ListenerId, Listener); 2]>;

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    /// Adapter options for sockets the subscriber opens itself
    pub socket: SocketOptions,
    /// How often the router loop wakes to check its stop flag
    pub poll_interval: Duration,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self {
            socket: SocketOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SubscriberOptions {
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }
}

struct SubscriberShared<T: Transport + 'static> {
    socket: NnSocket<T>,
    listeners: RefCell<HashMap<Bytes, ListenerList>>,
    next_listener: Cell<u64>,
    poll_interval: Duration,
    stopping: Cell<bool>,
    running: Cell<bool>,
    stopped: RefCell<Option<Shared<oneshot::Receiver<()>>>>,
}

/// SUB side of the topic router.
///
/// Cheap to clone; clones share listeners and the router loop.
pub struct Subscriber<T: Transport + 'static> {
    shared: Rc<SubscriberShared<T>>,
}

impl<T: Transport + 'static> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Subscriber<InprocTransport> {
    /// Subscriber over a fresh inproc SUB socket.
    pub fn inproc(options: SubscriberOptions) -> PubSubResult<Self> {
        let socket = NnSocket::new(InprocTransport::new(Protocol::Sub), options.socket.clone())?;
        Self::new(socket, options)
    }
}

impl<T: Transport + 'static> Subscriber<T> {
    /// Wrap a SUB socket. `options.socket` is ignored; the socket is already built.
    pub fn new(socket: NnSocket<T>, options: SubscriberOptions) -> PubSubResult<Self> {
        expect_protocol(socket.protocol(), Protocol::Sub)?;
        Ok(Self {
            shared: Rc::new(SubscriberShared {
                socket,
                listeners: RefCell::new(HashMap::new()),
                next_listener: Cell::new(1),
                poll_interval: options.poll_interval,
                stopping: Cell::new(false),
                running: Cell::new(false),
                stopped: RefCell::new(None),
            }),
        })
    }

    pub fn bind(&self, addr: &str) -> PubSubResult<EndpointId> {
        Ok(self.shared.socket.bind(addr)?)
    }

    pub fn connect(&self, addr: &str) -> PubSubResult<EndpointId> {
        Ok(self.shared.socket.connect(addr)?)
    }

    /// Hook `listener` to `topic`.
    ///
    /// The first listener of a topic installs the transport filter.
    pub fn subscribe<F, Fut>(&self, topic: &str, listener: F) -> PubSubResult<ListenerId>
    where
        F: Fn(Bytes) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        validate_topic(topic)?;
        let key = Bytes::copy_from_slice(topic.as_bytes());
        let listener: Listener = Rc::new(move |payload| listener(payload).boxed_local());

        let is_new = !self.shared.listeners.borrow().contains_key(&key);
        if is_new {
            self.shared
                .socket
                .set_option(SocketOption::Subscribe, OptionValue::Bytes(key.clone()))?;
        }

        let id = ListenerId(self.shared.next_listener.get());
        self.shared.next_listener.set(id.0 + 1);
        self.shared
            .listeners
            .borrow_mut()
            .entry(key)
            .or_default()
            .push((id, listener));
        debug!(topic, listener = id.0, "[SUB] listener added");
        Ok(id)
    }

    /// Remove one listener. Returns whether it was registered.
    ///
    /// The last listener of a topic removes the transport filter.
    pub fn unsubscribe(&self, topic: &str, id: ListenerId) -> PubSubResult<bool> {
        let key = topic.as_bytes();
        let emptied = {
            let mut listeners = self.shared.listeners.borrow_mut();
            let Some(list) = listeners.get_mut(key) else {
                return Ok(false);
            };
            let before = list.len();
            list.retain(|(lid, _)| *lid != id);
            if list.len() == before {
                return Ok(false);
            }
            let emptied = list.is_empty();
            if emptied {
                listeners.remove(key);
            }
            emptied
        };

        if emptied {
            self.shared.socket.set_option(
                SocketOption::Unsubscribe,
                OptionValue::Bytes(Bytes::copy_from_slice(key)),
            )?;
        }
        debug!(topic, listener = id.0, "[SUB] listener removed");
        Ok(true)
    }

    /// Topics with at least one listener.
    pub fn topics(&self) -> Vec<String> {
        self.shared
            .listeners
            .borrow()
            .keys()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .collect()
    }

    /// Start the router loop on the current runtime.
    pub fn start(&self) -> PubSubResult<()> {
        if self.shared.running.replace(true) {
            return Err(PubSubError::AlreadyStarted);
        }
        self.shared.stopping.set(false);
        let (done, stopped) = oneshot::channel();
        *self.shared.stopped.borrow_mut() = Some(stopped.shared());

        let shared = self.shared.clone();
        EventLoop::spawn(async move {
            route(&shared).await;
            shared.running.set(false);
            let _ = done.send(());
        });
        Ok(())
    }

    /// Ask the router loop to exit. Takes effect at the next iteration.
    pub fn stop(&self) {
        self.shared.stopping.set(true);
    }

    /// Wait until the router loop has exited. Returns at once if it never started.
    pub async fn wait_stopped(&self) {
        let stopped = self.shared.stopped.borrow().clone();
        if let Some(stopped) = stopped {
            let _ = stopped.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.get()
    }

    pub fn socket(&self) -> &NnSocket<T> {
        &self.shared.socket
    }

    /// Stop the router and close the socket.
    pub fn close(&self) {
        self.stop();
        self.shared.socket.close();
    }
}

async fn route<T: Transport + 'static>(shared: &SubscriberShared<T>) {
    debug!("[SUB] router started");
    while !shared.stopping.get() {
        let frame = match compio::time::timeout(shared.poll_interval, shared.socket.recv()).await {
            Err(_elapsed) => continue,
            Ok(Ok(frame)) => frame,
            Ok(Err(SocketError::SocketClosed)) => break,
            Ok(Err(e)) => {
                warn!(error = %e, "[SUB] recv failed, router exiting");
                break;
            }
        };

        let Some((topic, payload)) = split_frame(&frame) else {
            warn!(len = frame.len(), "[SUB] frame without topic separator dropped");
            continue;
        };

        // Snapshot so listeners may (un)subscribe while they run.
        let listeners: ListenerList = match shared.listeners.borrow().get(&topic) {
            Some(list) => list.clone(),
            None => {
                trace!(topic = ?topic, "[SUB] no listener for topic");
                continue;
            }
        };
        for (_, listener) in listeners {
            EventLoop::spawn(listener(payload.clone()));
        }
    }
    debug!("[SUB] router stopped");
}
