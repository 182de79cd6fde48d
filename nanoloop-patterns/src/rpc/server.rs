//! Serving side of the call dispatcher.

use super::{expect_duplex, short_type_name, CallArgs, Outcome, Request, Response};
use crate::codec::{BincodeCodec, Codec};
use crate::error::{CodecError, RemoteException, RpcError, RpcResult};
use crate::pubsub::DEFAULT_POLL_INTERVAL;
use bytes::Bytes;
use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use hashbrown::HashMap;
use nanoloop_core::error::SocketError;
use nanoloop_core::inproc::InprocTransport;
use nanoloop_core::options::SocketOptions;
use nanoloop_core::protocol::Protocol;
use nanoloop_core::reactor::EventLoop;
use nanoloop_core::socket::NnSocket;
use nanoloop_core::transport::Transport;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

type Handler = Rc<dyn Fn(CallArgs) -> LocalBoxFuture<'static, Outcome>>;

/// Call server configuration.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Adapter options for sockets the server opens itself
    pub socket: SocketOptions,
    /// Receive timeout after which the loop re-checks its stop flag
    pub poll_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            socket: SocketOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ServerOptions {
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

struct ServerShared<T: Transport + 'static, C: Codec> {
    socket: NnSocket<T>,
    codec: C,
    calls: RefCell<HashMap<String, Handler>>,
    poll_interval: Duration,
    stopping: Cell<bool>,
    running: Cell<bool>,
    stopped: RefCell<Option<Shared<oneshot::Receiver<()>>>>,
}

/// Dispatches incoming requests to registered handlers.
///
/// Requests are served one at a time, in arrival order. Cheap to clone.
pub struct CallServer<T: Transport + 'static, C: Codec = BincodeCodec> {
    shared: Rc<ServerShared<T, C>>,
}

impl<T: Transport + 'static, C: Codec> Clone for CallServer<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl CallServer<InprocTransport> {
    /// Server over a fresh inproc PAIR socket with the bincode codec.
    pub fn inproc(options: ServerOptions) -> RpcResult<Self> {
        let socket = NnSocket::new(InprocTransport::new(Protocol::Pair), options.socket.clone())?;
        Self::new(socket, BincodeCodec, options)
    }
}

impl<T: Transport + 'static, C: Codec> CallServer<T, C> {
    /// Serve calls over `socket`, which must be able to send and receive.
    pub fn new(socket: NnSocket<T>, codec: C, options: ServerOptions) -> RpcResult<Self> {
        expect_duplex(socket.protocol())?;
        Ok(Self {
            shared: Rc::new(ServerShared {
                socket,
                codec,
                calls: RefCell::new(HashMap::new()),
                poll_interval: options.poll_interval,
                stopping: Cell::new(false),
                running: Cell::new(false),
                stopped: RefCell::new(None),
            }),
        })
    }

    /// Register `handler` under `name`.
    ///
    /// The handler's `Ok` value is encoded with the server's codec; its
    /// `Err` is reported to the caller as a remote exception named after
    /// the error type.
    pub fn register<F, Fut, R, E>(&self, name: &str, handler: F) -> RpcResult<()>
    where
        F: Fn(CallArgs) -> Fut + 'static,
        Fut: Future<Output = Result<R, E>> + 'static,
        R: Serialize + 'static,
        E: StdError + 'static,
    {
        let mut calls = self.shared.calls.borrow_mut();
        if calls.contains_key(name) {
            return Err(RpcError::DuplicateCall(name.to_string()));
        }

        let codec = self.shared.codec.clone();
        let wrapped: Handler = Rc::new(move |args| {
            let codec = codec.clone();
            let fut = handler(args);
            async move {
                match fut.await {
                    Ok(value) => match codec.encode(&value) {
                        Ok(data) => Outcome::Success(data),
                        Err(e) => Outcome::Failure(RemoteException::new(
                            short_type_name::<CodecError>(),
                            e.to_string(),
                        )),
                    },
                    Err(e) => Outcome::Failure(
                        RemoteException::new(short_type_name::<E>(), e.to_string())
                            .with_detail(format!("{e:?}")),
                    ),
                }
            }
            .boxed_local()
        });
        calls.insert(name.to_string(), wrapped);
        debug!(name, "[RPC] call registered");
        Ok(())
    }

    /// Remove the handler for `name`. Returns whether one was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.shared.calls.borrow_mut().remove(name).is_some()
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared.calls.borrow().keys().cloned().collect()
    }

    pub fn bind(&self, addr: &str) -> RpcResult<()> {
        self.shared.socket.bind(addr)?;
        Ok(())
    }

    pub fn connect(&self, addr: &str) -> RpcResult<()> {
        self.shared.socket.connect(addr)?;
        Ok(())
    }

    /// Serve requests until [`stop`](Self::stop) is observed or the socket closes.
    ///
    /// Errors never escape an iteration: handler failures become remote
    /// exceptions and a failed response send is answered with an internal
    /// error.
    pub async fn run(&self) {
        let Some(done) = self.begin() else { return };
        finish(&self.shared, done).await;
    }

    /// Run the server loop as a detached task on the current runtime.
    pub fn start(&self) {
        let Some(done) = self.begin() else { return };
        let shared = self.shared.clone();
        EventLoop::spawn(async move { finish(&shared, done).await });
    }

    fn begin(&self) -> Option<oneshot::Sender<()>> {
        if self.shared.running.replace(true) {
            warn!("[RPC] server loop already running");
            return None;
        }
        self.shared.stopping.set(false);
        let (done, stopped) = oneshot::channel();
        *self.shared.stopped.borrow_mut() = Some(stopped.shared());
        Some(done)
    }

    /// Ask the loop to exit; it notices within one poll interval.
    pub fn stop(&self) {
        self.shared.stopping.set(true);
    }

    /// Wait until the loop has exited. Returns at once if it never ran.
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

    /// Stop the loop and close the socket.
    pub fn close(&self) {
        self.stop();
        self.shared.socket.close();
    }
}

async fn finish<T: Transport + 'static, C: Codec>(
    shared: &ServerShared<T, C>,
    done: oneshot::Sender<()>,
) {
    serve(shared).await;
    shared.running.set(false);
    let _ = done.send(());
}

async fn serve<T: Transport + 'static, C: Codec>(shared: &ServerShared<T, C>) {
    debug!("[RPC] server started");
    while !shared.stopping.get() {
        let frame = match compio::time::timeout(shared.poll_interval, shared.socket.recv()).await {
            Err(_elapsed) => continue,
            Ok(Ok(frame)) => frame,
            Ok(Err(SocketError::SocketClosed)) => break,
            Ok(Err(e)) if e.is_recoverable() => {
                warn!(error = %e, "[RPC] recv failed, retrying");
                compio::time::sleep(shared.poll_interval).await;
                continue;
            }
            Ok(Err(e)) => {
                error!(error = %e, "[RPC] recv failed, server exiting");
                break;
            }
        };

        let request: Request = match shared.codec.decode(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "[RPC] undecodable request dropped");
                continue;
            }
        };
        trace!(id = request.id, name = %request.name, "[RPC] request");

        let handler = shared.calls.borrow().get(&request.name).cloned();
        let outcome = match handler {
            Some(handler) => handler(request.args).await,
            None => Outcome::Failure(RemoteException::new(
                "UnknownCall",
                format!("no call registered under {:?}", request.name),
            )),
        };

        respond(shared, request.id, outcome).await;
    }
    debug!("[RPC] server stopped");
}

async fn respond<T: Transport + 'static, C: Codec>(
    shared: &ServerShared<T, C>,
    id: u64,
    outcome: Outcome,
) {
    let sent = match shared.codec.encode(&Response { id, outcome }) {
        Ok(data) => shared
            .socket
            .send(Bytes::from(data))
            .await
            .map_err(RpcError::from),
        Err(e) => Err(e.into()),
    };
    let Err(e) = sent else { return };
    error!(id, error = %e, "[RPC] unhandled error sending response");

    let fallback = Response {
        id,
        outcome: Outcome::Failure(RemoteException::internal()),
    };
    let result = match shared.codec.encode(&fallback) {
        Ok(data) => shared
            .socket
            .send(Bytes::from(data))
            .await
            .map_err(RpcError::from),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!(id, error = %e, "[RPC] internal error response failed too");
    }
}
