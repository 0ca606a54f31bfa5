// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The public listener API. See [`ShmListener`].

use super::{DrainReport, EnqueueOutcome, ListenerConfig, ListenerError,
            PendingModifications, ReaderId, ReaderRegistry, RunState, RunStateCell,
            ShmReader, WaitSetFactory, WaitSetRegistrar, WakeupTrigger,
            run_monitor_loop};
use crate::DEBUG_SHM_LISTENER;
use std::{any::Any,
          sync::{Arc, Mutex, MutexGuard},
          thread::JoinHandle};

/// State shared between the caller threads and the monitor thread.
///
/// The waiter is missing on purpose: it is moved into the monitor thread and nothing
/// else may ever touch it.
#[allow(missing_debug_implementations)]
pub struct ListenerShared<F, G>
where
    F: WaitSetFactory,
    G: ReaderRegistry,
{
    pub registrar: F::Registrar,
    pub trigger: F::Trigger,
    /// The only shared-state lock. Held for the whole of each enqueue (including the
    /// trigger signal) and each drain.
    pub pending: Mutex<PendingModifications>,
    pub run_state: RunStateCell,
    pub registry: Arc<G>,
    pub capacity: usize,
}

impl<F, G> ListenerShared<F, G>
where
    F: WaitSetFactory,
    G: ReaderRegistry,
    G::Reader: ShmReader<Source = F::Source>,
{
    /// # Errors
    ///
    /// [`ListenerError::MutexPoisoned`] if a thread panicked while holding the lock.
    pub fn lock_pending(
        &self,
    ) -> Result<MutexGuard<'_, PendingModifications>, ListenerError> {
        self.pending
            .lock()
            .map_err(|_| ListenerError::MutexPoisoned { which: "pending" })
    }

    /// Applies every pending modification under the lock.
    ///
    /// # Errors
    ///
    /// See [`PendingModifications::drain_and_apply()`].
    pub fn drain(&self) -> Result<DrainReport, ListenerError> {
        let mut pending = self.lock_pending()?;
        pending.drain_and_apply(self.registry.as_ref(), &self.registrar)
    }
}

/// Bridges a blocking waitset to shared-memory readers.
///
/// One dedicated monitor thread blocks on the waitset. When a reader's event source
/// fires, the thread pins the reader through the registry and feeds every available
/// chunk into the reader's data callback. Attach/detach requests from other threads
/// are queued and applied by the monitor thread between two waits.
///
/// ```text
///  caller threads                                   monitor thread
///  ───────────────────────────────────              ────────────────────────────
///  deferred_attach_reader(id) ─┐                    loop while Run {
///  deferred_detach_reader(id) ─┼─► pending (Mutex)     wait()
///                              └─► trigger() ─────►    Wakeup    → reset, drain
///  destroy() ── Stop ─────────────► trigger() ─────►    Reader(id) → pin, chunks
///            └─ join() ◄──────────────────────────  }  Stopped
/// ```
///
/// # Lifecycle
///
/// | Call          | [`RunState`] after                                         |
/// | :------------ | :--------------------------------------------------------- |
/// | [`init()`]    | `Run`, or `NotRunning` if the thread couldn't be spawned    |
/// | [`destroy()`] | `NotRunning` (passing through `Stop` and `Stopped`)         |
///
/// A destroyed listener is never restarted; create a new one instead. Dropping the
/// listener destroys it.
///
/// [`destroy()`]: Self::destroy
/// [`init()`]: Self::init
#[allow(missing_debug_implementations)]
pub struct ShmListener<F, G>
where
    F: WaitSetFactory + 'static,
    G: ReaderRegistry,
    G::Reader: ShmReader<Source = F::Source>,
{
    shared: Arc<ListenerShared<F, G>>,
    monitor_thread: Option<JoinHandle<()>>,
}

impl<F, G> ShmListener<F, G>
where
    F: WaitSetFactory + 'static,
    G: ReaderRegistry,
    G::Reader: ShmReader<Source = F::Source>,
{
    /// Creates the waitset resources and spawns the monitor thread.
    ///
    /// If the thread can't be spawned the error is logged and the listener is returned
    /// anyway, in [`RunState::NotRunning`]. It is inert but still safe to use and to
    /// destroy.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::InvalidCapacity`] if `config.capacity` is 0.
    /// - [`ListenerError::WaitSetCreation`] if [`WaitSetFactory::create()`] fails.
    pub fn init(config: ListenerConfig, registry: Arc<G>) -> Result<Self, ListenerError> {
        let ListenerConfig {
            capacity,
            thread_name,
            stack_size,
        } = config;

        if capacity == 0 {
            return Err(ListenerError::InvalidCapacity);
        }

        let (waiter, registrar, trigger) =
            F::create(capacity).map_err(ListenerError::WaitSetCreation)?;

        let shared = Arc::new(ListenerShared {
            registrar,
            trigger,
            pending: Mutex::new(PendingModifications::new(capacity)),
            run_state: RunStateCell::new(RunState::Run),
            registry,
            capacity,
        });

        let mut builder = std::thread::Builder::new().name(thread_name.clone());
        if let Some(stack_size) = stack_size {
            builder = builder.stack_size(stack_size);
        }

        let shared_clone = Arc::clone(&shared);
        let monitor_thread = match builder.spawn(move || {
            run_monitor_loop::<F, G>(waiter, &shared_clone);
        }) {
            Ok(handle) => Some(handle),
            Err(err) => {
                shared.run_state.mark_not_running();
                tracing::error!(
                    message = "shm-listener: failed to spawn monitor thread",
                    thread_name,
                    error = ?ListenerError::ThreadSpawn(err)
                );
                None
            }
        };

        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(
                message = "shm-listener: initialized",
                capacity,
                run_state = ?shared.run_state.get()
            );
        });

        Ok(Self {
            shared,
            monitor_thread,
        })
    }

    /// Requests termination, wakes the monitor thread, and joins it.
    ///
    /// Calling this again (or on a listener whose thread was never spawned) only
    /// confirms [`RunState::NotRunning`].
    ///
    /// # Errors
    ///
    /// - [`ListenerError::Trigger`] if the monitor thread can't be woken. The thread is
    ///   left in [`RunState::Stop`] and a later call retries.
    /// - [`ListenerError::MonitorThreadPanicked`] if the monitor thread died from a
    ///   panic (eg: the waitset lost events).
    pub fn destroy(&mut self) -> Result<(), ListenerError> {
        let Some(handle) = self.monitor_thread.take() else {
            self.shared.run_state.mark_not_running();
            return Ok(());
        };

        // Store Stop before triggering. The monitor resets the trigger before it checks
        // the state, so it can't miss this.
        let prev = self.shared.run_state.request_stop();

        if let Err(err) = self.shared.trigger.trigger() {
            self.monitor_thread = Some(handle);
            return Err(ListenerError::Trigger(err));
        }

        let join_result = handle.join();
        self.shared.run_state.mark_not_running();

        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(
                message = "shm-listener: destroyed",
                prev_run_state = ?prev,
                panicked = join_result.is_err()
            );
        });

        join_result.map_err(|payload| ListenerError::MonitorThreadPanicked {
            message: panic_message(payload.as_ref()),
        })
    }

    /// Makes the monitor thread return from its current (or next) wait and apply any
    /// pending modifications.
    ///
    /// # Errors
    ///
    /// [`ListenerError::Trigger`] if the OS refuses the signal.
    pub fn wake(&self) -> Result<(), ListenerError> {
        self.shared.trigger.trigger().map_err(ListenerError::Trigger)?;
        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(message = "shm-listener: wake");
        });
        Ok(())
    }

    /// Attaches a reader to the waitset right away, bypassing the pending queue.
    ///
    /// The registrar is thread safe so this is sound even while the monitor thread is
    /// blocked, but it isn't coordinated with pending requests for the same id. Prefer
    /// [`deferred_attach_reader()`] from threads other than the monitor thread.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::ReaderNotFound`] if `id` doesn't pin.
    /// - [`ListenerError::CapacityExceeded`] if the waitset is full.
    /// - [`ListenerError::WaitSet`] for any other registration failure.
    ///
    /// [`deferred_attach_reader()`]: Self::deferred_attach_reader
    pub fn attach_reader(&self, id: ReaderId) -> Result<(), ListenerError> {
        let reader = self
            .shared
            .registry
            .pin(id)
            .ok_or(ListenerError::ReaderNotFound(id))?;
        self.shared.registrar.attach(&reader.event_source(), id)?;
        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(message = "shm-listener: attached reader", reader_id = %id);
        });
        Ok(())
    }

    /// Immediate counterpart of [`attach_reader()`]. The reader need not be alive.
    ///
    /// # Errors
    ///
    /// [`ListenerError::WaitSet`] if `id` isn't attached.
    ///
    /// [`attach_reader()`]: Self::attach_reader
    pub fn detach_reader(&self, id: ReaderId) -> Result<(), ListenerError> {
        self.shared.registrar.detach(id)?;
        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(message = "shm-listener: detached reader", reader_id = %id);
        });
        Ok(())
    }

    /// Queues an attach for the monitor thread and wakes it. See [`EnqueueOutcome`]
    /// for what happens when the request is redundant or cancels a pending detach.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::CapacityExceeded`] if the pending attach queue is full, or if
    ///   the attached readers plus the pending attaches already fill the waitset.
    /// - [`ListenerError::Trigger`] if the wakeup can't be signalled. The request is
    ///   rolled back in that case.
    /// - [`ListenerError::MutexPoisoned`].
    pub fn deferred_attach_reader(
        &self,
        id: ReaderId,
    ) -> Result<EnqueueOutcome, ListenerError> {
        let mut pending = self.shared.lock_pending()?;
        let outcome = pending.enqueue_attach(id, &self.shared.registrar)?;
        if outcome.needs_trigger()
            && let Err(err) = self.shared.trigger.trigger()
        {
            pending.rollback_attach(id);
            return Err(ListenerError::Trigger(err));
        }
        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(
                message = "shm-listener: deferred attach",
                reader_id = %id,
                outcome = ?outcome
            );
        });
        Ok(outcome)
    }

    /// Queues a detach for the monitor thread and wakes it. A pending attach for the
    /// same id is cancelled instead.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::CapacityExceeded`] if the pending detach queue is full.
    /// - [`ListenerError::Trigger`] if the wakeup can't be signalled. The request is
    ///   rolled back in that case.
    /// - [`ListenerError::MutexPoisoned`].
    pub fn deferred_detach_reader(
        &self,
        id: ReaderId,
    ) -> Result<EnqueueOutcome, ListenerError> {
        let mut pending = self.shared.lock_pending()?;
        let outcome = pending.enqueue_detach(id, &self.shared.registrar)?;
        if outcome.needs_trigger()
            && let Err(err) = self.shared.trigger.trigger()
        {
            pending.rollback_detach(id);
            return Err(ListenerError::Trigger(err));
        }
        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(
                message = "shm-listener: deferred detach",
                reader_id = %id,
                outcome = ?outcome
            );
        });
        Ok(outcome)
    }

    /// Applies every pending request now, on the calling thread. The monitor thread
    /// does this on every wakeup; calling it yourself is only useful when the monitor
    /// thread isn't running.
    ///
    /// # Errors
    ///
    /// [`ListenerError::DeferredAttachFailed`] listing each attach that failed. Every
    /// other request in the batch was still applied.
    pub fn perform_deferred_modifications(&self) -> Result<DrainReport, ListenerError> {
        self.shared.drain()
    }

    #[must_use]
    pub fn run_state(&self) -> RunState { self.shared.run_state.get() }

    /// Requests queued and not yet applied. Returns 0 if the lock is poisoned.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared
            .lock_pending()
            .map(|pending| pending.pending_count())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn attached_count(&self) -> usize { self.shared.registrar.attached_count() }

    #[must_use]
    pub fn is_attached(&self, id: ReaderId) -> bool {
        self.shared.registrar.is_attached(id)
    }

    #[must_use]
    pub fn capacity(&self) -> usize { self.shared.capacity }
}

impl<F, G> Drop for ShmListener<F, G>
where
    F: WaitSetFactory + 'static,
    G: ReaderRegistry,
    G::Reader: ShmReader<Source = F::Source>,
{
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::error!(
                message = "shm-listener: destroy on drop failed",
                error = %err
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
