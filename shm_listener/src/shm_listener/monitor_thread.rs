// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words EINTR

//! The monitor thread's loop. See [`run_monitor_loop()`].
//!
//! # Missed wakeup protocol
//!
//! Two writers race with the monitor thread: callers that enqueue a request and then
//! trigger, and [`destroy()`] which stores [`RunState::Stop`] and then triggers. The
//! monitor thread, for every wakeup it sees, resets the trigger *first* and only then
//! drains the queue and (after the batch) re-reads the run state.
//!
//! ```text
//!  caller / destroy()            monitor thread
//!  ──────────────────            ──────────────────────────────
//!  write (enqueue / Stop)
//!  trigger() ──────────────────► wait() returns Wakeup
//!                                reset()
//!                                drain()        ◄─ sees the write
//!                                run_state.get() ◄─ sees the write
//! ```
//!
//! - A write that lands before the `reset()` is observed by the drain or state check
//!   that follows it.
//! - A write that lands after the `reset()` is followed by its own `trigger()`, which
//!   makes the next `wait()` return.
//!
//! Either way nothing is left sitting in the queue, and shutdown can't be missed.
//!
//! [`destroy()`]: crate::ShmListener::destroy

use super::{FiredEvent, ListenerShared, ReaderRegistry, RunState, RunStateCell,
            ShmReader, WaitSetFactory, WaitSetWaiter, dispatch_event};
use crate::{Continuation, DEBUG_SHM_LISTENER};
use std::io::ErrorKind;

/// RAII guard that marks the run state [`RunState::Stopped`] when the loop exits,
/// including when it unwinds from a panic.
#[derive(Debug)]
pub struct StoppedGuard<'a> {
    pub run_state: &'a RunStateCell,
}

impl Drop for StoppedGuard<'_> {
    fn drop(&mut self) { self.run_state.mark_stopped(); }
}

/// Runs on the dedicated monitor thread until the run state leaves [`RunState::Run`]
/// or the wait call fails.
pub fn run_monitor_loop<F, G>(mut waiter: F::Waiter, shared: &ListenerShared<F, G>)
where
    F: WaitSetFactory,
    G: ReaderRegistry,
    G::Reader: ShmReader<Source = F::Source>,
{
    let _guard = StoppedGuard {
        run_state: &shared.run_state,
    };

    // Sized once; a wait never reports more than the attached readers + the trigger.
    let mut fired: Vec<FiredEvent> = Vec::with_capacity(shared.capacity + 1);

    DEBUG_SHM_LISTENER.then(|| {
        tracing::debug!(
            message = "shm-listener: monitor thread started",
            capacity = shared.capacity
        );
    });

    while shared.run_state.get() == RunState::Run {
        if wait_and_dispatch(&mut waiter, &mut fired, shared) == Continuation::Stop {
            break;
        }
    }

    DEBUG_SHM_LISTENER.then(|| {
        tracing::debug!(
            message = "shm-listener: monitor thread exiting",
            run_state = ?shared.run_state.get()
        );
    });
    // _guard dropped here (or during unwinding), calling mark_stopped()
}

/// One iteration: block, then handle every fired event in the order the waitset
/// returned them.
///
/// # Panics
///
/// If the waitset reports lost events. The fired-events buffer is sized to hold every
/// source that can be attached, so this only happens when the capacity is
/// misconfigured, and silently dropping reader notifications is not acceptable.
pub fn wait_and_dispatch<F, G>(
    waiter: &mut F::Waiter,
    fired: &mut Vec<FiredEvent>,
    shared: &ListenerShared<F, G>,
) -> Continuation
where
    F: WaitSetFactory,
    G: ReaderRegistry,
    G::Reader: ShmReader<Source = F::Source>,
{
    let lost = match waiter.wait(fired) {
        Ok(lost) => lost,
        // EINTR - retry.
        Err(err) if err.kind() == ErrorKind::Interrupted => return Continuation::Continue,
        Err(err) => {
            tracing::error!(
                message = "shm-listener: wait failed, monitor thread exiting",
                error = ?err
            );
            return Continuation::Stop;
        }
    };

    if lost.0 > 0 {
        tracing::error!(
            message = "shm-listener: waitset lost events",
            lost = lost.0,
            capacity = shared.capacity
        );
        panic!(
            "missed events invariant violated: waitset lost {} event(s), capacity {} \
             is undersized",
            lost.0, shared.capacity
        );
    }

    for event in fired.iter() {
        dispatch_event(*event, shared);
    }

    Continuation::Continue
}
