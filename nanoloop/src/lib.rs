//! # Nanoloop
//!
//! Asynchronous send/receive over non-blocking, readiness-notifying
//! scalability-protocol sockets (PAIR, PUB/SUB, PUSH/PULL, BUS, ...),
//! multiplexed into a single-threaded event loop.
//!
//! ## Architecture
//!
//! - **`nanoloop-core`**: transport and reactor contracts, the socket
//!   adapter, the compio-backed event loop and the inproc transport
//! - **`nanoloop-patterns`**: topic router and call dispatcher built on the adapter
//! - **`nanoloop`**: Public API surface (this crate)
//!
//! ## Patterns (opt-in via features)
//!
//! - **`patterns`** - PUB/SUB topic routing and named remote calls
//!
//! ```toml
//! [dependencies]
//! nanoloop = { version = "0.1", features = ["patterns"] }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nanoloop::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = NnSocket::inproc(Protocol::Pair)?;
//! server.bind("inproc://echo")?;
//! let client = NnSocket::inproc(Protocol::Pair)?;
//! client.connect("inproc://echo")?;
//!
//! client.send("hello").await?;
//! let msg = server.recv().await?;
//! server.send(msg).await?;
//! assert_eq!(client.recv().await?, "hello");
//!
//! client.close();
//! server.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## How a socket waits
//!
//! `send` and `recv` first try the transport directly. Only when it would
//! block does the caller suspend; the adapter then registers one readiness
//! callback for that direction, and the callback flushes (send) or drains
//! (recv) until the transport blocks again, then deregisters itself. Both
//! directions are bounded: a full send queue fails with
//! [`SocketError::QueueOverflow`](error::SocketError::QueueOverflow), a full
//! receive queue pauses reading until [`NnSocket::resume_recv`](socket::NnSocket::resume_recv).

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export core types
pub use bytes::Bytes;
pub use nanoloop_core::{
    endpoint, error, handler, inproc, monitor, options, protocol, reactor, socket, stats, subscription,
    transport,
};

pub mod dev_tracing;

/// Messaging patterns built on the socket adapter.
#[cfg(feature = "patterns")]
pub mod patterns {
    pub use nanoloop_patterns::{codec, error, pubsub, rpc};
    pub use nanoloop_patterns::{
        BincodeCodec, CallArgs, CallClient, CallServer, Codec, ListenerId, Publisher,
        RemoteException, ServerOptions, Subscriber, SubscriberOptions,
    };
}

/// Common imports.
///
/// ```rust
/// use nanoloop::prelude::*;
/// ```
pub mod prelude {
    pub use bytes::Bytes;
    pub use nanoloop_core::prelude::*;

    #[cfg(feature = "patterns")]
    pub use nanoloop_patterns::prelude::*;
}
