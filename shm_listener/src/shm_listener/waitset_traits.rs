// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words EINTR epoll kqueue eventfd

//! Core traits that wrap the blocking multi-source wait primitive (the "waitset") and
//! its wakeup trigger. The listener is unaware of which OS mechanism backs them. See
//! [`WaitSetFactory`], [`WaitSetWaiter`], [`WaitSetRegistrar`], [`WakeupTrigger`].
//!
//! # Why three pieces?
//!
//! A waitset has one part that blocks and parts that other threads touch while it
//! blocks:
//!
//! ```text
//!                  ┌──────────────────┐
//!  any thread ───► │ WaitSetRegistrar │ ── attach / detach (thread safe)
//!                  └────────┬─────────┘
//!  any thread ───► ┌────────┴─────────┐
//!                  │  WakeupTrigger   │ ── trigger (thread safe)
//!                  └────────┬─────────┘
//!                  ┌────────▼─────────┐
//!  monitor ──────► │  WaitSetWaiter   │ ── wait (blocks, &mut self)
//!                  └──────────────────┘
//! ```
//!
//! The three are coupled (a trigger is useless without the wait call it interrupts), so
//! they're created together by [`WaitSetFactory::create()`].

use super::ReaderId;
use miette::Report;

/// Creates a coupled waiter/registrar/trigger triple for one listener.
///
/// See [`MioWaitSetFactory`] for the implementation backed by [`mio`].
///
/// [`MioWaitSetFactory`]: crate::MioWaitSetFactory
pub trait WaitSetFactory {
    /// What a reader hands over for the waitset to watch.
    type Source;

    type Waiter: WaitSetWaiter;

    type Registrar: WaitSetRegistrar<Source = Self::Source>;

    type Trigger: WakeupTrigger;

    /// `capacity` is the maximum number of readers; the trigger occupies one extra
    /// reserved slot on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS resources can't be created.
    fn create(
        capacity: usize,
    ) -> Result<(Self::Waiter, Self::Registrar, Self::Trigger), Report>;
}

/// The blocking half, owned exclusively by the monitor thread.
pub trait WaitSetWaiter: Send + 'static {
    /// Blocks (no timeout) until at least one attached source or the trigger fires.
    /// Clears `fired` and refills it in the order the waitset reports.
    ///
    /// # Errors
    ///
    /// [`std::io::ErrorKind::Interrupted`] (EINTR) is retried by the caller. Any other
    /// error ends the monitor loop.
    fn wait(&mut self, fired: &mut Vec<FiredEvent>) -> std::io::Result<LostEvents>;
}

/// The registration half. Thread safe: may be called while another thread is blocked
/// in [`WaitSetWaiter::wait()`].
pub trait WaitSetRegistrar: Send + Sync + 'static {
    type Source;

    /// Starts watching `source`, tagging its events with `id`.
    ///
    /// # Errors
    ///
    /// - [`WaitSetError::Full`] if `capacity()` readers are already attached.
    /// - [`WaitSetError::AlreadyAttached`] if `id` is already attached.
    /// - [`WaitSetError::UnrepresentableId`] if `id` can't be packed into a tag.
    /// - [`WaitSetError::Io`] if the OS refuses the registration.
    fn attach(&self, source: &Self::Source, id: ReaderId) -> Result<(), WaitSetError>;

    /// Stops watching the source attached under `id`.
    ///
    /// # Errors
    ///
    /// [`WaitSetError::NotAttached`] if `id` is unknown.
    fn detach(&self, id: ReaderId) -> Result<(), WaitSetError>;

    fn is_attached(&self, id: ReaderId) -> bool;

    fn attached_count(&self) -> usize;

    fn capacity(&self) -> usize;
}

/// Software-only event source, always attached at the reserved slot, used to interrupt
/// a blocking wait on demand.
pub trait WakeupTrigger: Send + Sync + 'static {
    /// Callable from any thread, any number of times. Guarantees that the current (or
    /// next) [`WaitSetWaiter::wait()`] returns with a [`FiredEvent::Wakeup`].
    ///
    /// # Errors
    ///
    /// Returns an error if the OS mechanism (eg: eventfd, pipe) can't be written to.
    fn trigger(&self) -> std::io::Result<()>;

    /// Clears the signalled state. Called by the monitor thread before it acts on a
    /// wakeup; for level-triggered backends forgetting this makes every wait return
    /// immediately.
    fn reset(&self);
}

/// One fired event, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiredEvent {
    /// Originates from the [`WakeupTrigger`].
    Wakeup,
    /// Tagged with an attached reader's id.
    Reader(ReaderId),
    /// A tag that is neither.
    Unknown(usize),
}

impl FiredEvent {
    /// Classifies a raw waitset tag.
    #[must_use]
    pub fn from_token(token: usize) -> Self {
        if token == super::WAKEUP_TOKEN {
            return Self::Wakeup;
        }
        match ReaderId::from_token(token) {
            Some(id) => Self::Reader(id),
            None => Self::Unknown(token),
        }
    }

    #[must_use]
    pub fn is_wakeup(&self) -> bool { matches!(self, Self::Wakeup) }
}

/// How many events the waitset had to drop because the fired-events buffer was too
/// small. Anything other than zero means the capacity was misconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LostEvents(pub usize);

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum WaitSetError {
    #[error("Waitset is full ({capacity} readers attached)")]
    #[diagnostic(
        code(r3bl_shm_listener::waitset::full),
        help("Detach a reader first, or create the listener with a larger capacity")
    )]
    Full { capacity: usize },

    #[error("Reader {0} is already attached to the waitset")]
    #[diagnostic(code(r3bl_shm_listener::waitset::already_attached))]
    AlreadyAttached(ReaderId),

    #[error("Reader {0} is not attached to the waitset")]
    #[diagnostic(code(r3bl_shm_listener::waitset::not_attached))]
    NotAttached(ReaderId),

    #[error("Reader {0} can't be encoded as a waitset tag on this target")]
    #[diagnostic(
        code(r3bl_shm_listener::waitset::unrepresentable_id),
        help("Waitset tags pack index and generation into a 64 bit usize")
    )]
    UnrepresentableId(ReaderId),

    #[error("Waitset registration failed")]
    #[diagnostic(code(r3bl_shm_listener::waitset::io))]
    Io(#[source] std::io::Error),
}
