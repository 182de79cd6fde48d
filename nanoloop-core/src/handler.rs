//! Per-direction readiness handler registration.
//!
//! Each direction is a two-state machine. `arm` is the only way into
//! `Registered` and `disarm` the only way out; both are no-ops from the
//! other state, so the reactor never sees a double add or a stray remove.

use crate::reactor::{ReadinessCallback, Reactor};
use crate::transport::{Direction, ReadinessHandle};
use std::io;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    Registered,
}

#[derive(Debug)]
pub(crate) struct Handler {
    direction: Direction,
    state: HandlerState,
}

impl Handler {
    pub(crate) const fn new(direction: Direction) -> Self {
        Self {
            direction,
            state: HandlerState::Idle,
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> HandlerState {
        self.state
    }

    #[inline]
    pub(crate) fn is_registered(&self) -> bool {
        self.state == HandlerState::Registered
    }

    /// Register `callback` unless already registered. Returns whether a
    /// registration happened.
    pub(crate) fn arm(
        &mut self,
        reactor: &dyn Reactor,
        handle: &ReadinessHandle,
        callback: ReadinessCallback,
    ) -> io::Result<bool> {
        if self.is_registered() {
            return Ok(false);
        }
        reactor.add_readiness(handle, self.direction, callback)?;
        self.state = HandlerState::Registered;
        trace!(direction = %self.direction, fd = handle.id(), "[SOCKET] handler armed");
        Ok(true)
    }

    /// Deregister if registered. The state is `Idle` afterwards even when
    /// the reactor reports an error.
    pub(crate) fn disarm(
        &mut self,
        reactor: &dyn Reactor,
        handle: &ReadinessHandle,
    ) -> io::Result<bool> {
        if !self.is_registered() {
            return Ok(false);
        }
        self.state = HandlerState::Idle;
        reactor.remove_readiness(handle, self.direction)?;
        trace!(direction = %self.direction, fd = handle.id(), "[SOCKET] handler disarmed");
        Ok(true)
    }
}
