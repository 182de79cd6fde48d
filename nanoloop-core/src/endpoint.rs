//! Endpoint abstraction for transport addressing.
//!
//! The adapter never interprets addresses; transports parse them with
//! [`Endpoint::parse`]. Monitor events carry the address string exactly as
//! the caller passed it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP transport: `tcp://host:port` (host may be a name or `*`)
    Tcp(String),
    /// IPC transport: `ipc:///path/to/socket`
    Ipc(PathBuf),
    /// In-process transport: `inproc://name`
    Inproc(String),
    /// WebSocket transport: `ws://host:port/path`
    Ws(String),
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `tcp://127.0.0.1:5555`, `tcp://*:5555`
    /// - `ipc:///tmp/socket.sock`
    /// - `inproc://name`
    /// - `ws://127.0.0.1:8080/feed`
    ///
    /// # Examples
    ///
    /// ```
    /// use nanoloop_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("inproc://jobs").unwrap();
    /// assert!(endpoint.is_inproc());
    ///
    /// let endpoint = Endpoint::parse("tcp://*:5555").unwrap();
    /// assert!(matches!(endpoint, Endpoint::Tcp(_)));
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Returns true if this is an inproc endpoint.
    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }

    /// Scheme prefix without the `://` separator.
    pub fn scheme(&self) -> &'static str {
        match self {
            Endpoint::Tcp(_) => "tcp",
            Endpoint::Ipc(_) => "ipc",
            Endpoint::Inproc(_) => "inproc",
            Endpoint::Ws(_) => "ws",
        }
    }
}

fn host_port(scheme: &'static str, rest: &str) -> Result<String, EndpointError> {
    let authority = rest.split('/').next().unwrap_or_default();
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(rest.to_string())
        }
        _ => Err(EndpointError::InvalidAddress {
            scheme,
            address: rest.to_string(),
        }),
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            Ok(Endpoint::Tcp(host_port("tcp", addr)?))
        } else if let Some(addr) = s.strip_prefix("ws://") {
            Ok(Endpoint::Ws(host_port("ws", addr)?))
        } else if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(EndpointError::InvalidAddress {
                    scheme: "ipc",
                    address: String::new(),
                });
            }
            Ok(Endpoint::Ipc(PathBuf::from(path)))
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(EndpointError::InvalidInprocName(
                    "inproc name cannot be empty".to_string(),
                ))
            } else {
                Ok(Endpoint::Inproc(name.to_string()))
            }
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Endpoint::Inproc(name) => write!(f, "inproc://{}", name),
            Endpoint::Ws(addr) => write!(f, "ws://{}", addr),
        }
    }
}

/// Errors that can occur when parsing endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp://, ipc://, inproc:// or ws://)")]
    InvalidScheme(String),

    #[error("Invalid {scheme} address: {address}")]
    InvalidAddress {
        scheme: &'static str,
        address: String,
    },

    #[error("Invalid inproc name: {0}")]
    InvalidInprocName(String),

    #[error("inproc endpoint '{0}' is already bound")]
    AddrInUse(String),

    #[error("inproc endpoint '{0}' not found (must bind before connect)")]
    NotFound(String),
}
