//! Nanoloop Core
//!
//! This crate contains the event-loop-agnostic building blocks of the
//! readiness-driven socket adapter:
//! - Transport contract and readiness descriptors (`transport`)
//! - Event loop contract plus the compio-backed loop (`reactor`)
//! - Per-direction handler state machine (`handler`)
//! - The adapter itself: fast path, slow path, bounded queues (`socket`)
//! - In-process transport (`inproc`)
//! - Addresses, protocols, options, monitoring and counters
//! - Error types (`error`)

#![cfg_attr(not(test), deny(unsafe_code))]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::match_same_arms)]

pub mod endpoint;
pub mod error;
pub mod handler;
pub mod inproc;
pub mod monitor;
pub mod options;
pub mod protocol;
pub mod reactor;
pub mod socket;
pub mod stats;
pub mod subscription;
pub mod transport;

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{SocketError, TransportError};
    pub use crate::handler::HandlerState;
    pub use crate::inproc::InprocTransport;
    pub use crate::monitor::{SocketEvent, SocketMonitor};
    pub use crate::options::{InprocOptions, SocketOptions};
    pub use crate::protocol::Protocol;
    pub use crate::reactor::{EventLoop, ReadinessCallback, Reactor};
    pub use crate::socket::{NnSocket, SocketState};
    pub use crate::stats::StatsSnapshot;
    pub use crate::transport::{
        Direction, EndpointId, OptionValue, ReadinessHandle, SocketOption, Transport,
    };
}
