// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Deferred attach/detach requests. Any thread may enqueue; only the monitor thread
//! applies them, and only between two waits, because the waitset must not be mutated
//! by the thread that is blocked in it.
//!
//! The listener wraps [`PendingModifications`] in a [`Mutex`] and holds it for the
//! whole of each enqueue (including the trigger signal) and each drain, so no partial
//! interleaving is ever observable.
//!
//! [`Mutex`]: std::sync::Mutex

use super::{CapacityKind, ListenerError, ReaderId, ReaderRegistry, ShmReader,
            WaitSetRegistrar};
use crate::DEBUG_SHM_LISTENER;

/// Fixed arena of `capacity` slots. Allocated once; an empty slot is a tombstone
/// (`None`). All operations are a linear scan, O(capacity) worst case.
#[derive(Debug)]
pub struct PendingSlots {
    slots: Box<[Option<ReaderId>]>,
}

impl PendingSlots {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn contains(&self, id: ReaderId) -> bool { self.slots.contains(&Some(id)) }

    /// Stores `id` in the first empty slot. Returns `false` if there is none.
    pub fn insert(&mut self, id: ReaderId) -> bool {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(id);
                true
            }
            None => false,
        }
    }

    /// Clears the slot holding `id` in place. Returns `false` if `id` isn't there.
    pub fn remove(&mut self, id: ReaderId) -> bool {
        match self.slots.iter_mut().find(|slot| **slot == Some(id)) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn occupied(&self) -> usize { self.slots.iter().flatten().count() }

    #[must_use]
    pub fn capacity(&self) -> usize { self.slots.len() }

    /// Empties every slot, yielding the ids in slot order.
    pub fn take_all(&mut self) -> impl Iterator<Item = ReaderId> + '_ {
        self.slots.iter_mut().filter_map(Option::take)
    }
}

/// What an enqueue call did. Only [`Queued`] needs the monitor thread to wake up.
///
/// [`Queued`]: Self::Queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new request now occupies a slot.
    Queued,
    /// The same request was already pending.
    AlreadyPending,
    /// The opposite request was still pending for this id; both are gone now.
    CancelledOpposite,
    /// The waitset already is in the requested state for this id.
    AlreadyApplied,
}

impl EnqueueOutcome {
    #[must_use]
    pub fn needs_trigger(self) -> bool { self == Self::Queued }
}

/// What one [`PendingModifications::drain_and_apply()`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub attached: usize,
    pub detached: usize,
}

/// The two pending arrays plus the pending count.
///
/// Invariants (with the listener's mutex held):
/// - An id is never in both `attach` and `detach`.
/// - An id in `attach` is not attached to the waitset.
/// - `pending_count` equals the number of occupied slots across both arrays.
#[derive(Debug)]
pub struct PendingModifications {
    attach: PendingSlots,
    detach: PendingSlots,
    pending_count: usize,
}

impl PendingModifications {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            attach: PendingSlots::new(capacity),
            detach: PendingSlots::new(capacity),
            pending_count: 0,
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize { self.pending_count }

    #[must_use]
    pub fn is_attach_pending(&self, id: ReaderId) -> bool { self.attach.contains(id) }

    #[must_use]
    pub fn is_detach_pending(&self, id: ReaderId) -> bool { self.detach.contains(id) }

    /// Queues an attach request.
    ///
    /// The waitset's room is checked here, on the caller's thread, so a request that
    /// can't fit is refused now instead of failing later in the drain. The drain
    /// applies attaches before detaches, so a pending detach frees no room for them.
    ///
    /// # Errors
    ///
    /// [`ListenerError::CapacityExceeded`] if every attach slot is taken, or if the
    /// attached readers plus the pending attaches already fill the waitset. Nothing is
    /// changed in either case.
    pub fn enqueue_attach(
        &mut self,
        id: ReaderId,
        registrar: &impl WaitSetRegistrar,
    ) -> Result<EnqueueOutcome, ListenerError> {
        if self.detach.remove(id) {
            self.pending_count -= 1;
            return Ok(EnqueueOutcome::CancelledOpposite);
        }
        if self.attach.contains(id) {
            return Ok(EnqueueOutcome::AlreadyPending);
        }
        if registrar.is_attached(id) {
            return Ok(EnqueueOutcome::AlreadyApplied);
        }
        let waitset_capacity = registrar.capacity();
        if registrar.attached_count() + self.attach.occupied() >= waitset_capacity {
            return Err(ListenerError::CapacityExceeded {
                what: CapacityKind::WaitSet,
                capacity: waitset_capacity,
            });
        }
        if !self.attach.insert(id) {
            return Err(ListenerError::CapacityExceeded {
                what: CapacityKind::PendingAttach,
                capacity: self.attach.capacity(),
            });
        }
        self.pending_count += 1;
        Ok(EnqueueOutcome::Queued)
    }

    /// Queues a detach request. A still-pending attach for the same id is cancelled in
    /// place instead, since nothing external has changed yet.
    ///
    /// # Errors
    ///
    /// [`ListenerError::CapacityExceeded`] if every detach slot is taken. Nothing is
    /// changed in that case.
    pub fn enqueue_detach(
        &mut self,
        id: ReaderId,
        registrar: &impl WaitSetRegistrar,
    ) -> Result<EnqueueOutcome, ListenerError> {
        if self.attach.remove(id) {
            self.pending_count -= 1;
            return Ok(EnqueueOutcome::CancelledOpposite);
        }
        if self.detach.contains(id) {
            return Ok(EnqueueOutcome::AlreadyPending);
        }
        if !registrar.is_attached(id) {
            return Ok(EnqueueOutcome::AlreadyApplied);
        }
        if !self.detach.insert(id) {
            return Err(ListenerError::CapacityExceeded {
                what: CapacityKind::PendingDetach,
                capacity: self.detach.capacity(),
            });
        }
        self.pending_count += 1;
        Ok(EnqueueOutcome::Queued)
    }

    /// Undoes a [`EnqueueOutcome::Queued`] attach whose trigger signal failed.
    pub fn rollback_attach(&mut self, id: ReaderId) {
        if self.attach.remove(id) {
            self.pending_count -= 1;
        }
    }

    /// Undoes a [`EnqueueOutcome::Queued`] detach whose trigger signal failed.
    pub fn rollback_detach(&mut self, id: ReaderId) {
        if self.detach.remove(id) {
            self.pending_count -= 1;
        }
    }

    /// Applies every pending request to the waitset: all attaches first, then all
    /// detaches. Every slot is cleared whether or not its request succeeded, and the
    /// pending count ends at zero.
    ///
    /// Each attach pins its reader before registering it. A reader that no longer pins
    /// is reported as failed without a register call, so the number of register calls
    /// is the number of pending attaches minus the destroyed readers among them.
    ///
    /// # Errors
    ///
    /// [`ListenerError::DeferredAttachFailed`] listing every id whose attach failed
    /// (reader already destroyed, waitset full, OS error). The drain is never aborted
    /// part way.
    pub fn drain_and_apply<G, W>(
        &mut self,
        registry: &G,
        registrar: &W,
    ) -> Result<DrainReport, ListenerError>
    where
        G: ReaderRegistry,
        G::Reader: ShmReader<Source = W::Source>,
        W: WaitSetRegistrar,
    {
        let mut report = DrainReport::default();
        if self.pending_count == 0 {
            return Ok(report);
        }

        let mut failed = vec![];

        for id in self.attach.take_all() {
            let Some(reader) = registry.pin(id) else {
                tracing::warn!(
                    message = "shm-listener: deferred attach for destroyed reader",
                    reader_id = %id
                );
                failed.push(id);
                continue;
            };
            match registrar.attach(&reader.event_source(), id) {
                Ok(()) => {
                    report.attached += 1;
                    DEBUG_SHM_LISTENER.then(|| {
                        tracing::debug!(
                            message = "shm-listener: attached reader",
                            reader_id = %id
                        );
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        message = "shm-listener: deferred attach failed",
                        reader_id = %id,
                        error = %err
                    );
                    failed.push(id);
                }
            }
        }

        for id in self.detach.take_all() {
            match registrar.detach(id) {
                Ok(()) => {
                    report.detached += 1;
                    DEBUG_SHM_LISTENER.then(|| {
                        tracing::debug!(
                            message = "shm-listener: detached reader",
                            reader_id = %id
                        );
                    });
                }
                Err(err) => {
                    DEBUG_SHM_LISTENER.then(|| {
                        tracing::debug!(
                            message = "shm-listener: deferred detach failed",
                            reader_id = %id,
                            error = %err
                        );
                    });
                }
            }
        }

        self.pending_count = 0;

        if failed.is_empty() {
            Ok(report)
        } else {
            Err(ListenerError::DeferredAttachFailed { failed })
        }
    }
}
