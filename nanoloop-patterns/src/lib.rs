//! # Nanoloop Patterns
//!
//! Messaging patterns built only on `NnSocket::send` / `NnSocket::recv`.
//!
//! ## Overview
//!
//! - **Topic router**: [`Publisher`] frames `topic|payload`; [`Subscriber`]
//!   filters by topic and fans each payload out to its listeners
//! - **Call dispatcher**: [`CallClient`] issues named calls with
//!   correlation ids; [`CallServer`] runs the matching handler and sends
//!   back a value or a [`RemoteException`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nanoloop_patterns::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = CallServer::inproc(ServerOptions::default())?;
//! server.bind("inproc://calc")?;
//! server.register("add", |args: CallArgs| async move {
//!     let a: u32 = args.get(&BincodeCodec, 0)?;
//!     let b: u32 = args.get(&BincodeCodec, 1)?;
//!     Ok::<_, RpcError>(a + b)
//! })?;
//! server.start();
//!
//! let client = CallClient::inproc(Default::default())?;
//! client.connect("inproc://calc")?;
//! let args = CallArgs::new().arg(&BincodeCodec, &2u32)?.arg(&BincodeCodec, &3u32)?;
//! let sum: u32 = client.call("add", args).await?;
//! assert_eq!(sum, 5);
//! # Ok(())
//! # }
//! ```

// Allow some pedantic lints
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::future_not_send)]
#![allow(clippy::missing_errors_doc)]

pub mod codec;
pub mod error;
pub mod pubsub;
pub mod rpc;

pub use codec::{BincodeCodec, Codec};
pub use error::{CodecError, PubSubError, RemoteException, RpcError};
pub use pubsub::{ListenerId, Publisher, Subscriber, SubscriberOptions};
pub use rpc::{CallArgs, CallClient, CallServer, ServerOptions};

/// Prelude module for convenient imports
///
/// ```rust
/// use nanoloop_patterns::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        BincodeCodec, CallArgs, CallClient, CallServer, Codec, ListenerId, PubSubError,
        Publisher, RemoteException, RpcError, ServerOptions, Subscriber, SubscriberOptions,
    };
    pub use bytes::Bytes;
}
