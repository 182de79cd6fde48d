//! Event loop contract and the compio-backed implementation.
//!
//! The adapter registers one callback per (descriptor, direction) while it
//! has work pending in that direction. [`EventLoop`] runs each registration
//! as a watcher task on the current compio runtime: wait for the level,
//! invoke the callback, yield, repeat until deregistered.

use crate::transport::{Direction, ReadinessHandle};
use futures::future::poll_fn;
use hashbrown::HashMap;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use tracing::trace;

/// Callback invoked by the loop whenever a descriptor is ready.
pub type ReadinessCallback = Rc<dyn Fn()>;

/// Readiness registration interface of a single-threaded event loop.
///
/// Registering an already registered key, or removing an absent one, is an
/// error: the adapter guarantees it never asks for either.
pub trait Reactor {
    fn add_readiness(
        &self,
        handle: &ReadinessHandle,
        direction: Direction,
        callback: ReadinessCallback,
    ) -> io::Result<()>;

    fn remove_readiness(&self, handle: &ReadinessHandle, direction: Direction) -> io::Result<()>;
}

#[derive(Default)]
struct Registration {
    active: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

impl Registration {
    fn cancel(&self) {
        self.active.set(false);
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

type RegistrationKey = (u64, Direction);

/// Reactor driving readiness callbacks on the current compio runtime.
///
/// Cheap to clone; clones share one registration table. Must be used from
/// inside a running compio runtime.
#[derive(Clone, Default)]
pub struct EventLoop {
    registrations: Rc<RefCell<HashMap<RegistrationKey, Rc<Registration>>>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live registrations.
    pub fn registered(&self) -> usize {
        self.registrations.borrow().len()
    }

    /// Whether `(handle, direction)` currently has a callback.
    pub fn is_registered(&self, handle: &ReadinessHandle, direction: Direction) -> bool {
        self.registrations
            .borrow()
            .contains_key(&(handle.id(), direction))
    }

    /// Spawn a detached task on the current runtime.
    pub fn spawn<F>(future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        compio::runtime::spawn(future).detach();
    }

    /// Run `future` to completion on a fresh runtime.
    pub fn run<F: Future>(future: F) -> io::Result<F::Output> {
        let rt = compio::runtime::Runtime::new()?;
        Ok(rt.block_on(future))
    }
}

impl Reactor for EventLoop {
    fn add_readiness(
        &self,
        handle: &ReadinessHandle,
        direction: Direction,
        callback: ReadinessCallback,
    ) -> io::Result<()> {
        let key = (handle.id(), direction);
        let registration = {
            let mut registrations = self.registrations.borrow_mut();
            if registrations.contains_key(&key) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{direction} handler already registered for fd {}", handle.id()),
                ));
            }
            let registration = Rc::new(Registration::default());
            registration.active.set(true);
            registrations.insert(key, registration.clone());
            registration
        };

        trace!(fd = handle.id(), %direction, "[LOOP] watcher added");
        Self::spawn(watch(handle.clone(), direction, registration, callback));
        Ok(())
    }

    fn remove_readiness(&self, handle: &ReadinessHandle, direction: Direction) -> io::Result<()> {
        let removed = self
            .registrations
            .borrow_mut()
            .remove(&(handle.id(), direction));
        match removed {
            Some(registration) => {
                registration.cancel();
                trace!(fd = handle.id(), %direction, "[LOOP] watcher removed");
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {direction} handler registered for fd {}", handle.id()),
            )),
        }
    }
}

async fn watch(
    handle: ReadinessHandle,
    direction: Direction,
    registration: Rc<Registration>,
    callback: ReadinessCallback,
) {
    loop {
        let active = poll_fn(|cx| {
            if !registration.active.get() {
                return Poll::Ready(false);
            }
            *registration.waker.borrow_mut() = Some(cx.waker().clone());
            handle.poll_ready(cx).map(|()| true)
        })
        .await;

        if !active {
            break;
        }
        callback();
        YieldNow::default().await;
    }
    trace!(fd = handle.id(), %direction, "[LOOP] watcher exited");
}

/// Yield once to the scheduler so a level that stays high cannot starve
/// other tasks.
#[derive(Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
