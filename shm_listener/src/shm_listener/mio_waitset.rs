// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words EINTR epoll kqueue eventfd

//! The [`mio`] backed waitset. On Linux [`mio::Poll`] is [`epoll`], on macOS it is
//! `kqueue`. The wakeup trigger is a [`mio::Waker`] (an `eventfd` on Linux) registered
//! at [`WAKEUP_TOKEN`].
//!
//! A reader's [`event_source()`] is a raw fd that the transport makes readable whenever
//! new chunks are published (eg: an `eventfd`, or the read end of a pipe or unix
//! socket). Readiness is edge triggered, so readers must consume that notification in
//! [`take_next_chunk()`] before returning `None`.
//!
//! [`epoll`]: https://man7.org/linux/man-pages/man7/epoll.7.html
//! [`event_source()`]: crate::ShmReader::event_source
//! [`take_next_chunk()`]: crate::ShmReader::take_next_chunk

use super::{FiredEvent, LostEvents, ReaderId, WAKEUP_TOKEN, WaitSetError, WaitSetFactory,
            WaitSetRegistrar, WaitSetWaiter, WakeupTrigger};
use crate::DEBUG_SHM_LISTENER;
use miette::{Diagnostic, Report};
use mio::{Events, Interest, Poll, Registry, Token, Waker, unix::SourceFd};
use std::{collections::HashMap,
          os::fd::RawFd,
          sync::{Mutex, MutexGuard, PoisonError}};

// ╭──────────────────────────────────────────────────────────╮
// │ Diagnostic error types for waitset creation failures     │
// ╰──────────────────────────────────────────────────────────╯

#[derive(Debug, thiserror::Error, Diagnostic)]
#[error("Failed to create mio::Poll")]
#[diagnostic(
    code(r3bl_shm_listener::mio::poll_creation),
    help("This usually means the system ran out of file descriptors")
)]
pub struct PollCreationError(#[source] pub std::io::Error);

#[derive(Debug, thiserror::Error, Diagnostic)]
#[error("Failed to create mio::Waker")]
#[diagnostic(
    code(r3bl_shm_listener::mio::waker_creation),
    help("This usually means the system ran out of file descriptors")
)]
pub struct WakerCreationError(#[source] pub std::io::Error);

#[derive(Debug, thiserror::Error, Diagnostic)]
#[error("Failed to clone mio::Registry")]
#[diagnostic(code(r3bl_shm_listener::mio::registry_clone))]
pub struct RegistryCloneError(#[source] pub std::io::Error);

// ╭──────────────────────────────────────────────────────────╮
// │ Waiter                                                   │
// ╰──────────────────────────────────────────────────────────╯

#[allow(missing_debug_implementations)]
pub struct MioWaiter {
    pub poll_handle: Poll,

    /// Sized to `capacity + 1` so a single wait can report every attached reader plus
    /// the trigger.
    pub ready_events_buffer: Events,
}

impl WaitSetWaiter for MioWaiter {
    fn wait(&mut self, fired: &mut Vec<FiredEvent>) -> std::io::Result<LostEvents> {
        fired.clear();
        self.poll_handle.poll(&mut self.ready_events_buffer, None)?;
        fired.extend(
            self.ready_events_buffer
                .iter()
                .map(|event| FiredEvent::from_token(event.token().0)),
        );
        // Readiness that doesn't fit in the buffer stays queued in the kernel and is
        // reported by the next poll, so nothing is ever lost here.
        Ok(LostEvents(0))
    }
}

// ╭──────────────────────────────────────────────────────────╮
// │ Registrar                                                │
// ╰──────────────────────────────────────────────────────────╯

#[allow(missing_debug_implementations)]
pub struct MioRegistrar {
    pub registry: Registry,

    pub attached: Mutex<HashMap<ReaderId, RawFd>>,

    pub capacity: usize,
}

impl MioRegistrar {
    fn lock(&self) -> MutexGuard<'_, HashMap<ReaderId, RawFd>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WaitSetRegistrar for MioRegistrar {
    type Source = RawFd;

    fn attach(&self, source: &RawFd, id: ReaderId) -> Result<(), WaitSetError> {
        let mut attached = self.lock();

        if attached.contains_key(&id) {
            return Err(WaitSetError::AlreadyAttached(id));
        }
        if attached.len() >= self.capacity {
            return Err(WaitSetError::Full {
                capacity: self.capacity,
            });
        }
        let token = id.to_token().ok_or(WaitSetError::UnrepresentableId(id))?;

        self.registry
            .register(&mut SourceFd(source), Token(token), Interest::READABLE)
            .map_err(WaitSetError::Io)?;
        attached.insert(id, *source);

        Ok(())
    }

    fn detach(&self, id: ReaderId) -> Result<(), WaitSetError> {
        let mut attached = self.lock();
        let fd = attached.remove(&id).ok_or(WaitSetError::NotAttached(id))?;

        // The kernel already drops closed fds from the interest list, so a failure here
        // just means the reader's transport went away first.
        if let Err(err) = self.registry.deregister(&mut SourceFd(&fd)) {
            DEBUG_SHM_LISTENER.then(|| {
                tracing::debug!(
                    message = "mio-waitset: deregister failed, source already gone",
                    reader_id = %id,
                    fd,
                    error = ?err
                );
            });
        }

        Ok(())
    }

    fn is_attached(&self, id: ReaderId) -> bool { self.lock().contains_key(&id) }

    fn attached_count(&self) -> usize { self.lock().len() }

    fn capacity(&self) -> usize { self.capacity }
}

// ╭──────────────────────────────────────────────────────────╮
// │ Trigger                                                  │
// ╰──────────────────────────────────────────────────────────╯

#[derive(Debug)]
pub struct MioTrigger(pub Waker);

impl WakeupTrigger for MioTrigger {
    fn trigger(&self) -> std::io::Result<()> { self.0.wake() }

    /// [`mio::Waker`] re-arms itself on every [`wake()`], so there is nothing to clear.
    ///
    /// [`wake()`]: mio::Waker::wake
    fn reset(&self) {}
}

// ╭──────────────────────────────────────────────────────────╮
// │ Factory                                                  │
// ╰──────────────────────────────────────────────────────────╯

#[derive(Debug)]
pub struct MioWaitSetFactory;

impl WaitSetFactory for MioWaitSetFactory {
    type Source = RawFd;
    type Waiter = MioWaiter;
    type Registrar = MioRegistrar;
    type Trigger = MioTrigger;

    fn create(
        capacity: usize,
    ) -> Result<(Self::Waiter, Self::Registrar, Self::Trigger), Report> {
        // Create mio::Poll (epoll on Linux, kqueue on macOS).
        let poll_handle = Poll::new().map_err(PollCreationError)?;

        // The trigger takes the reserved slot before any reader can be attached.
        let waker = Waker::new(poll_handle.registry(), Token(WAKEUP_TOKEN))
            .map_err(WakerCreationError)?;

        let registry = poll_handle
            .registry()
            .try_clone()
            .map_err(RegistryCloneError)?;

        let waiter = MioWaiter {
            poll_handle,
            ready_events_buffer: Events::with_capacity(capacity + 1),
        };
        let registrar = MioRegistrar {
            registry,
            attached: Mutex::new(HashMap::with_capacity(capacity)),
            capacity,
        };

        Ok((waiter, registrar, MioTrigger(waker)))
    }
}
