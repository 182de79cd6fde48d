//! Call dispatcher: named remote calls over one socket.
//!
//! A [`CallClient`] sends a [`Request`] carrying a correlation id, a call
//! name and [`CallArgs`]; a [`CallServer`] looks the name up, runs the
//! handler and answers with a [`Response`] under the same id. Handler
//! failures travel back as a [`RemoteException`](crate::error::RemoteException)
//! and surface on the caller as [`RpcError::Remote`].
//!
//! Each request and response is one message. Any transport that pairs one
//! client with one server works (PAIR over inproc in the tests).

mod client;
mod server;

pub use client::CallClient;
pub use server::{CallServer, ServerOptions};

use crate::codec::Codec;
use crate::error::{RemoteException, RpcError, RpcResult};
use nanoloop_core::protocol::Protocol;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Positional and keyword arguments of one call.
///
/// Every argument is encoded on its own so handlers decode exactly the
/// types they expect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallArgs {
    positional: Vec<Vec<u8>>,
    keyword: Vec<(String, Vec<u8>)>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn push<C: Codec, V: Serialize>(&mut self, codec: &C, value: &V) -> RpcResult<()> {
        self.positional.push(codec.encode(value)?);
        Ok(())
    }

    /// Set a keyword argument, replacing an earlier value under the same name.
    pub fn insert<C: Codec, V: Serialize>(
        &mut self,
        codec: &C,
        name: impl Into<String>,
        value: &V,
    ) -> RpcResult<()> {
        let name = name.into();
        let encoded = codec.encode(value)?;
        match self.keyword.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = encoded,
            None => self.keyword.push((name, encoded)),
        }
        Ok(())
    }

    /// Builder form of [`push`](Self::push).
    pub fn arg<C: Codec, V: Serialize>(mut self, codec: &C, value: &V) -> RpcResult<Self> {
        self.push(codec, value)?;
        Ok(self)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn kwarg<C: Codec, V: Serialize>(
        mut self,
        codec: &C,
        name: impl Into<String>,
        value: &V,
    ) -> RpcResult<Self> {
        self.insert(codec, name, value)?;
        Ok(self)
    }

    /// Decode positional argument `index`.
    pub fn get<C: Codec, V: DeserializeOwned>(&self, codec: &C, index: usize) -> RpcResult<V> {
        let raw = self
            .positional
            .get(index)
            .ok_or_else(|| RpcError::MissingArgument(format!("#{index}")))?;
        Ok(codec.decode(raw)?)
    }

    /// Decode keyword argument `name`, if present.
    pub fn get_kw<C: Codec, V: DeserializeOwned>(
        &self,
        codec: &C,
        name: &str,
    ) -> RpcResult<Option<V>> {
        match self.keyword.iter().find(|(k, _)| k == name) {
            Some((_, raw)) => Ok(Some(codec.decode(raw)?)),
            None => Ok(None),
        }
    }

    /// Decode keyword argument `name`, failing if absent.
    pub fn require_kw<C: Codec, V: DeserializeOwned>(&self, codec: &C, name: &str) -> RpcResult<V> {
        self.get_kw(codec, name)?
            .ok_or_else(|| RpcError::MissingArgument(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    pub fn keyword_names(&self) -> impl Iterator<Item = &str> {
        self.keyword.iter().map(|(k, _)| k.as_str())
    }
}

/// Call request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed in the response
    pub id: u64,
    pub name: String,
    pub args: CallArgs,
}

/// Outcome of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Encoded return value
    Success(Vec<u8>),
    Failure(RemoteException),
}

impl Outcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub outcome: Outcome,
}

/// Last path segment of a type name: `my_crate::errors::Timeout` -> `Timeout`.
pub(crate) fn short_type_name<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Reject protocols that cannot carry requests and responses both ways.
pub(crate) fn expect_duplex(protocol: Protocol) -> RpcResult<()> {
    if protocol.can_send() && protocol.can_recv() {
        Ok(())
    } else {
        Err(RpcError::WrongProtocol(protocol))
    }
}
