// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words taskthreads

use super::{ReaderId, WaitSetError};

/// Errors surfaced by the [`ShmListener`] public API.
///
/// | Category                         | Variant(s)                                     |
/// | :------------------------------- | :--------------------------------------------- |
/// | `InitializationFailure`          | [`ThreadSpawn`] (logged, listener still valid) |
/// | `CapacityExceeded`               | [`CapacityExceeded`]                           |
/// | Drain aggregate                  | [`DeferredAttachFailed`]                       |
/// | `MissedEventsInvariantViolation` | [`MonitorThreadPanicked`] (reported by join)   |
///
/// `PinFailure` is deliberately absent: an event for a reader that no longer exists is
/// skipped by the dispatcher and never reaches a caller.
///
/// [`CapacityExceeded`]: Self::CapacityExceeded
/// [`DeferredAttachFailed`]: Self::DeferredAttachFailed
/// [`MonitorThreadPanicked`]: Self::MonitorThreadPanicked
/// [`ShmListener`]: crate::ShmListener
/// [`ThreadSpawn`]: Self::ThreadSpawn
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ListenerError {
    #[error("Listener capacity must be at least 1")]
    #[diagnostic(code(r3bl_shm_listener::listener::invalid_capacity))]
    InvalidCapacity,

    #[error("Out of resources: {what} is full (capacity {capacity})")]
    #[diagnostic(
        code(r3bl_shm_listener::listener::capacity_exceeded),
        help("Capacity is fixed when the listener is created and never grows")
    )]
    CapacityExceeded { what: CapacityKind, capacity: usize },

    #[error("Reader {0} does not exist (destroyed, or never registered)")]
    #[diagnostic(code(r3bl_shm_listener::listener::reader_not_found))]
    ReaderNotFound(ReaderId),

    #[error("Failed to create waitset resources")]
    #[diagnostic(
        code(r3bl_shm_listener::listener::waitset_creation),
        help(
            "Check OS resource limits - \
             use `ulimit -n` for file descriptors"
        )
    )]
    WaitSetCreation(miette::Report),

    #[error(transparent)]
    #[diagnostic(transparent)]
    WaitSet(WaitSetError),

    #[error("Failed to signal the wakeup trigger")]
    #[diagnostic(code(r3bl_shm_listener::listener::trigger))]
    Trigger(#[source] std::io::Error),

    #[error("{} deferred attach request(s) failed: {failed:?}", failed.len())]
    #[diagnostic(
        code(r3bl_shm_listener::listener::deferred_attach_failed),
        help("The remaining requests in the same drain were still applied")
    )]
    DeferredAttachFailed { failed: Vec<ReaderId> },

    #[error("Failed to spawn the listener monitor thread")]
    #[diagnostic(code(r3bl_shm_listener::listener::thread_spawn))]
    #[cfg_attr(
        target_os = "linux",
        diagnostic(help(
            "The system may have reached its thread limit - \
             check `ulimit -u` for per-user limit, \
             `cat /proc/sys/kernel/threads-max` for system-wide limit"
        ))
    )]
    #[cfg_attr(
        target_os = "macos",
        diagnostic(help(
            "The system may have reached its thread limit - \
             check `ulimit -u` for per-user limit, \
             `sysctl kern.num_taskthreads` for per-process limit"
        ))
    )]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Listener monitor thread panicked: {message}")]
    #[diagnostic(
        code(r3bl_shm_listener::listener::monitor_thread_panicked),
        help("A waitset that reports lost events means the capacity was undersized")
    )]
    MonitorThreadPanicked { message: String },

    #[error("Listener internal mutex poisoned ({which})")]
    #[diagnostic(
        code(r3bl_shm_listener::listener::mutex_poisoned),
        help("A prior thread panicked while holding a listener lock")
    )]
    MutexPoisoned { which: &'static str },
}

impl ListenerError {
    /// Whether this maps to the `OUT_OF_RESOURCES` status.
    #[must_use]
    pub fn is_out_of_resources(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::WaitSet(WaitSetError::Full { .. })
        )
    }
}

impl From<WaitSetError> for ListenerError {
    fn from(err: WaitSetError) -> Self {
        match err {
            WaitSetError::Full { capacity } => Self::CapacityExceeded {
                what: CapacityKind::WaitSet,
                capacity,
            },
            other => Self::WaitSet(other),
        }
    }
}

/// Which fixed capacity was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    PendingAttach,
    PendingDetach,
    WaitSet,
    ReaderTable,
}

impl std::fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PendingAttach => "pending attach queue",
            Self::PendingDetach => "pending detach queue",
            Self::WaitSet => "waitset",
            Self::ReaderTable => "reader table",
        })
    }
}
