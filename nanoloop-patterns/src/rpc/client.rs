//! Calling side of the call dispatcher.

use super::{expect_duplex, CallArgs, Outcome, Request, Response};
use crate::codec::{BincodeCodec, Codec};
use crate::error::{RpcError, RpcResult};
use bytes::Bytes;
use futures::channel::oneshot;
use hashbrown::HashMap;
use nanoloop_core::error::SocketError;
use nanoloop_core::inproc::InprocTransport;
use nanoloop_core::options::SocketOptions;
use nanoloop_core::protocol::Protocol;
use nanoloop_core::reactor::EventLoop;
use nanoloop_core::socket::NnSocket;
use nanoloop_core::transport::Transport;
use serde::de::DeserializeOwned;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace, warn};

struct ClientShared<T: Transport + 'static, C: Codec> {
    socket: NnSocket<T>,
    codec: C,
    /// Correlation id -> caller waiting for the outcome.
    pending: RefCell<HashMap<u64, oneshot::Sender<Outcome>>>,
    next_id: Cell<u64>,
    running: Cell<bool>,
}

/// Removes a pending entry when its call finishes, times out or is dropped.
struct PendingGuard<'a, T: Transport + 'static, C: Codec> {
    shared: &'a ClientShared<T, C>,
    id: u64,
}

impl<T: Transport + 'static, C: Codec> Drop for PendingGuard<'_, T, C> {
    fn drop(&mut self) {
        self.shared.pending.borrow_mut().remove(&self.id);
    }
}

/// Issues calls and matches responses to them by correlation id.
///
/// Several calls may be in flight at once. Cheap to clone.
///
/// ## Example
///
/// ```rust,no_run
/// use nanoloop_patterns::codec::BincodeCodec;
/// use nanoloop_patterns::rpc::{CallArgs, CallClient};
/// use nanoloop_core::options::SocketOptions;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CallClient::inproc(SocketOptions::default())?;
/// client.connect("inproc://calc")?;
/// client.start();
///
/// let args = CallArgs::new().arg(&BincodeCodec, &2u32)?.arg(&BincodeCodec, &3u32)?;
/// let sum: u32 = client.call("add", args).await?;
/// # Ok(())
/// # }
/// ```
pub struct CallClient<T: Transport + 'static, C: Codec = BincodeCodec> {
    shared: Rc<ClientShared<T, C>>,
}

impl<T: Transport + 'static, C: Codec> Clone for CallClient<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl CallClient<InprocTransport> {
    /// Client over a fresh inproc PAIR socket with the bincode codec.
    pub fn inproc(options: SocketOptions) -> RpcResult<Self> {
        let socket = NnSocket::new(InprocTransport::new(Protocol::Pair), options)?;
        Self::new(socket, BincodeCodec)
    }
}

impl<T: Transport + 'static, C: Codec> CallClient<T, C> {
    /// Issue calls over `socket`, which must be able to send and receive.
    pub fn new(socket: NnSocket<T>, codec: C) -> RpcResult<Self> {
        expect_duplex(socket.protocol())?;
        Ok(Self {
            shared: Rc::new(ClientShared {
                socket,
                codec,
                pending: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
                running: Cell::new(false),
            }),
        })
    }

    pub fn bind(&self, addr: &str) -> RpcResult<()> {
        self.shared.socket.bind(addr)?;
        Ok(())
    }

    pub fn connect(&self, addr: &str) -> RpcResult<()> {
        self.shared.socket.connect(addr)?;
        Ok(())
    }

    /// Start the response loop on the current runtime. Idempotent.
    ///
    /// [`call`](Self::call) starts it on demand.
    pub fn start(&self) {
        if self.shared.running.replace(true) {
            return;
        }
        let shared = self.shared.clone();
        EventLoop::spawn(async move {
            dispatch_responses(&shared).await;
            shared.running.set(false);
            // Dropping the senders fails every waiting call with `Stopped`.
            shared.pending.borrow_mut().clear();
        });
    }

    /// Call `name` and decode its return value.
    ///
    /// A handler failure on the server surfaces as [`RpcError::Remote`].
    pub async fn call<R: DeserializeOwned>(&self, name: &str, args: CallArgs) -> RpcResult<R> {
        self.start();
        let shared = &*self.shared;

        let id = shared.next_id.get();
        shared.next_id.set(id.wrapping_add(1));
        let (tx, rx) = oneshot::channel();
        shared.pending.borrow_mut().insert(id, tx);
        let _guard = PendingGuard { shared, id };

        let request = Request {
            id,
            name: name.to_string(),
            args,
        };
        let data = shared.codec.encode(&request)?;
        shared.socket.send(Bytes::from(data)).await?;
        trace!(id, name, "[RPC] request sent");

        match rx.await.map_err(|_| RpcError::Stopped)? {
            Outcome::Success(data) => Ok(shared.codec.decode(&data)?),
            Outcome::Failure(e) => Err(RpcError::Remote(e)),
        }
    }

    /// [`call`](Self::call) bounded by `timeout`. A late response is dropped.
    pub async fn call_timeout<R: DeserializeOwned>(
        &self,
        name: &str,
        args: CallArgs,
        timeout: Duration,
    ) -> RpcResult<R> {
        match compio::time::timeout(timeout, self.call(name, args)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!(name, ?timeout, "[RPC] call timed out");
                Err(RpcError::TimedOut(timeout))
            }
        }
    }

    /// Calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.borrow().len()
    }

    pub fn socket(&self) -> &NnSocket<T> {
        &self.shared.socket
    }

    /// Close the socket; waiting calls fail with [`RpcError::Stopped`].
    pub fn close(&self) {
        self.shared.pending.borrow_mut().clear();
        self.shared.socket.close();
    }
}

async fn dispatch_responses<T: Transport + 'static, C: Codec>(shared: &ClientShared<T, C>) {
    debug!("[RPC] response loop started");
    loop {
        let frame = match shared.socket.recv().await {
            Ok(frame) => frame,
            Err(SocketError::SocketClosed) => break,
            Err(e) => {
                warn!(error = %e, "[RPC] response recv failed, loop exiting");
                break;
            }
        };

        let response: Response = match shared.codec.decode(&frame) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "[RPC] undecodable response dropped");
                continue;
            }
        };

        let waiter = shared.pending.borrow_mut().remove(&response.id);
        match waiter {
            Some(waiter) => {
                if waiter.send(response.outcome).is_err() {
                    trace!(id = response.id, "[RPC] caller gone");
                }
            }
            None => warn!(id = response.id, "[RPC] response for unknown call dropped"),
        }
    }
    debug!("[RPC] response loop stopped");
}
