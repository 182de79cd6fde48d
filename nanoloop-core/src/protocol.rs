//! Scalability protocol enumeration.
//!
//! This module provides the `Protocol` enum which names the socket type a
//! transport socket is created with, using the nanomsg protocol numbers.

use std::fmt;

/// Scalability protocols.
///
/// Corresponds to the `protocol` argument of `nn_socket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Protocol {
    /// PAIR socket for exclusive bidirectional communication
    Pair = 16,

    /// PUB socket for broadcasting to subscribers
    Pub = 32,

    /// SUB socket for receiving filtered broadcasts
    Sub = 33,

    /// REQ socket for request-reply clients
    Req = 48,

    /// REP socket for request-reply servers
    Rep = 49,

    /// PUSH socket for distributing work to pullers
    Push = 80,

    /// PULL socket for collecting work from pushers
    Pull = 81,

    /// SURVEYOR socket for asking every respondent at once
    Surveyor = 98,

    /// RESPONDENT socket for answering surveys
    Respondent = 99,

    /// BUS socket for many-to-many broadcast
    Bus = 112,
}

impl Protocol {
    /// Get the protocol as a string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Push => "PUSH",
            Self::Pull => "PULL",
            Self::Surveyor => "SURVEYOR",
            Self::Respondent => "RESPONDENT",
            Self::Bus => "BUS",
        }
    }

    /// Look up a protocol by its nanomsg number.
    pub fn from_number(value: u16) -> Option<Self> {
        Some(match value {
            16 => Self::Pair,
            32 => Self::Pub,
            33 => Self::Sub,
            48 => Self::Req,
            49 => Self::Rep,
            80 => Self::Push,
            81 => Self::Pull,
            98 => Self::Surveyor,
            99 => Self::Respondent,
            112 => Self::Bus,
            _ => return None,
        })
    }

    /// Whether sockets of this protocol may send.
    pub fn can_send(&self) -> bool {
        !matches!(self, Self::Sub | Self::Pull)
    }

    /// Whether sockets of this protocol may receive.
    pub fn can_recv(&self) -> bool {
        !matches!(self, Self::Pub | Self::Push)
    }

    /// Check if this protocol is compatible with the given peer protocol.
    pub fn is_compatible(&self, peer: Protocol) -> bool {
        matches!(
            (self, peer),
            (Self::Pair, Self::Pair)
                | (Self::Pub, Self::Sub)
                | (Self::Sub, Self::Pub)
                | (Self::Req, Self::Rep)
                | (Self::Rep, Self::Req)
                | (Self::Push, Self::Pull)
                | (Self::Pull, Self::Push)
                | (Self::Surveyor, Self::Respondent)
                | (Self::Respondent, Self::Surveyor)
                | (Self::Bus, Self::Bus)
        )
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
