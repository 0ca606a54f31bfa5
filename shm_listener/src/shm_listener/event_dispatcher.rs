// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Per-event handling on the monitor thread. [`dispatch_event()`] classifies a
//! [`FiredEvent`] and routes it to one of the handlers below.

use super::{FiredEvent, ListenerShared, ReaderId, ReaderRegistry, ShmReader,
            WaitSetFactory, WakeupTrigger};
use crate::DEBUG_SHM_LISTENER;

pub fn dispatch_event<F, G>(event: FiredEvent, shared: &ListenerShared<F, G>)
where
    F: WaitSetFactory,
    G: ReaderRegistry,
    G::Reader: ShmReader<Source = F::Source>,
{
    match event {
        FiredEvent::Wakeup => handle_wakeup(shared),
        FiredEvent::Reader(id) => {
            handle_reader_event(id, shared.registry.as_ref());
        }
        FiredEvent::Unknown(token) => handle_unknown(token),
    }
}

/// Resets the trigger, then applies every pending modification. See the missed wakeup
/// protocol in [`monitor_thread`] for why the reset comes first.
///
/// [`monitor_thread`]: super::monitor_thread
pub fn handle_wakeup<F, G>(shared: &ListenerShared<F, G>)
where
    F: WaitSetFactory,
    G: ReaderRegistry,
    G::Reader: ShmReader<Source = F::Source>,
{
    shared.trigger.reset();

    match shared.drain() {
        Ok(report) => {
            DEBUG_SHM_LISTENER.then(|| {
                tracing::debug!(
                    message = "shm-listener: wakeup handled",
                    attached = report.attached,
                    detached = report.detached
                );
            });
        }
        Err(err) => {
            // Nobody is waiting on this drain's result, so logging is all we can do.
            tracing::warn!(
                message = "shm-listener: deferred modifications failed",
                error = %err
            );
        }
    }
}

/// Drains every available chunk of the reader behind `id` into its data callback, in
/// arrival order. Returns the number of chunks delivered.
///
/// A reader that can't be pinned was destroyed concurrently with a pending or just
/// applied detach. That is an expected race, so the event is skipped.
pub fn handle_reader_event<G>(id: ReaderId, registry: &G) -> usize
where
    G: ReaderRegistry,
    G::Reader: ShmReader,
{
    let Some(reader) = registry.pin(id) else {
        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(
                message = "shm-listener: event for destroyed reader skipped",
                reader_id = %id
            );
        });
        return 0;
    };

    let mut delivered = 0;
    while let Some(chunk) = reader.take_next_chunk() {
        reader.on_data_available(chunk);
        delivered += 1;
    }

    DEBUG_SHM_LISTENER.then(|| {
        tracing::trace!(
            message = "shm-listener: chunks delivered",
            reader_id = %id,
            delivered
        );
    });

    delivered
    // reader unpinned here
}

pub fn handle_unknown(token: usize) {
    DEBUG_SHM_LISTENER.then(|| {
        tracing::debug!(message = "shm-listener: unknown waitset tag", token);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReaderTable, test_fixtures::FakeReader};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reader_event_delivers_in_arrival_order() {
        let registry = ReaderTable::new();
        let id = registry.insert(FakeReader::with_chunks([10, 20, 30])).unwrap();

        assert_eq!(handle_reader_event(id, &registry), 3);
        assert_eq!(registry.pin(id).unwrap().received(), vec![10, 20, 30]);

        // Queue is empty now.
        assert_eq!(handle_reader_event(id, &registry), 0);
    }

    #[test]
    fn test_reader_event_for_destroyed_reader_is_skipped() {
        let registry = ReaderTable::new();
        let id = registry.insert(FakeReader::with_chunks([1, 2])).unwrap();
        let reader = registry.remove(id).unwrap();

        assert_eq!(handle_reader_event(id, &registry), 0);
        assert!(reader.received().is_empty());
    }
}
