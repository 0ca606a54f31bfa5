// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Safe resolution of a [`ReaderId`] to a live reader, guarded against concurrent
//! destruction. The listener only ever touches a reader through a [`PinnedReader`].

use super::{CapacityKind, ListenerError, ReaderId};
use crate::DEBUG_SHM_LISTENER;
use std::{ops::Deref,
          sync::{Arc, Mutex, MutexGuard}};

/// The registry contract consumed by the listener. It owns the readers; the listener
/// only holds their ids.
///
/// Implementations must make [`pin()`] safe against a reader being removed from another
/// thread at the same time, and must return `None` for ids whose generation is stale.
///
/// [`pin()`]: Self::pin
pub trait ReaderRegistry: Send + Sync + 'static {
    type Reader: Send + Sync + 'static;

    /// Resolves `id` to a live reader, or `None` if it was destroyed.
    fn pin(&self, id: ReaderId) -> Option<PinnedReader<Self::Reader>>;
}

/// RAII pin on a reader. The reader can't be freed while this is alive. Dropping it is
/// the unpin operation.
#[derive(Debug)]
pub struct PinnedReader<R> {
    id: ReaderId,
    reader: Arc<R>,
}

impl<R> PinnedReader<R> {
    #[must_use]
    pub fn new(id: ReaderId, reader: Arc<R>) -> Self { Self { id, reader } }

    #[must_use]
    pub fn id(&self) -> ReaderId { self.id }

    /// Explicit form of dropping the pin.
    pub fn unpin(self) { drop(self); }
}

impl<R> Deref for PinnedReader<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target { &self.reader }
}

#[derive(Debug)]
struct Slot<R> {
    generation: u32,
    reader: Option<Arc<R>>,
}

#[derive(Debug)]
struct ReaderTableInner<R> {
    slots: Vec<Slot<R>>,
    free_list: Vec<u32>,
    live: usize,
}

/// Slab-backed [`ReaderRegistry`] with generation-tagged slots.
///
/// Removing a reader bumps its slot generation, so an id handed out before the removal
/// can never resolve again, even after the slot is reused by a new reader.
#[derive(Debug)]
pub struct ReaderTable<R> {
    inner: Mutex<ReaderTableInner<R>>,
}

impl<R> Default for ReaderTable<R> {
    fn default() -> Self { Self::new() }
}

impl<R> ReaderTable<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ReaderTableInner {
                slots: Vec::new(),
                free_list: Vec::new(),
                live: 0,
            }),
        }
    }

    /// A poisoned lock here only means a reader callback panicked on another thread
    /// while pinned; the table itself is never left half-updated.
    fn lock(&self) -> MutexGuard<'_, ReaderTableInner<R>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Stores `reader` and returns its id. Freed slots are reused first.
    ///
    /// # Errors
    ///
    /// [`ListenerError::CapacityExceeded`] if every `u32` slot index is in use.
    pub fn insert(&self, reader: R) -> Result<ReaderId, ListenerError> {
        let mut inner = self.lock();
        if let Some(index) = inner.free_list.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.reader = Some(Arc::new(reader));
            let id = ReaderId::new(index, slot.generation);
            inner.live += 1;
            return Ok(id);
        }
        let index = u32::try_from(inner.slots.len()).map_err(|_| {
            ListenerError::CapacityExceeded {
                what: CapacityKind::ReaderTable,
                capacity: u32::MAX as usize,
            }
        })?;
        inner.slots.push(Slot {
            generation: 0,
            reader: Some(Arc::new(reader)),
        });
        inner.live += 1;
        Ok(ReaderId::new(index, 0))
    }

    /// Destroys the reader behind `id`. Any pin taken before this call keeps the reader
    /// alive until it is dropped, but no new pin will succeed.
    pub fn remove(&self, id: ReaderId) -> Option<Arc<R>> {
        let mut inner = self.lock();
        let slot = inner.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let reader = slot.reader.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free_list.push(id.index);
        inner.live -= 1;

        DEBUG_SHM_LISTENER.then(|| {
            tracing::debug!(message = "reader-table: removed reader", reader_id = %id);
        });

        Some(reader)
    }

    #[must_use]
    pub fn contains(&self, id: ReaderId) -> bool {
        self.lock()
            .slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.reader.is_some())
    }

    #[must_use]
    pub fn len(&self) -> usize { self.lock().live }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl<R> ReaderRegistry for ReaderTable<R>
where
    R: Send + Sync + 'static,
{
    type Reader = R;

    fn pin(&self, id: ReaderId) -> Option<PinnedReader<R>> {
        let inner = self.lock();
        let slot = inner.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.reader
            .as_ref()
            .map(|reader| PinnedReader::new(id, Arc::clone(reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_then_pin() {
        let table = ReaderTable::new();
        let id = table.insert("r1").unwrap();
        let pinned = table.pin(id).unwrap();
        assert_eq!(*pinned, "r1");
        assert_eq!(pinned.id(), id);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_removed_id_does_not_pin() {
        let table = ReaderTable::new();
        let id = table.insert("r1").unwrap();
        assert!(table.remove(id).is_some());
        assert!(table.pin(id).is_none());
        assert!(!table.contains(id));
        assert!(table.is_empty());
    }

    #[test]
    fn test_stale_id_does_not_pin_after_slot_reuse() {
        let table = ReaderTable::new();
        let old = table.insert("old").unwrap();
        table.remove(old);
        let new = table.insert("new").unwrap();

        assert_eq!(old.index, new.index);
        assert_ne!(old.generation, new.generation);
        assert!(table.pin(old).is_none());
        assert_eq!(*table.pin(new).unwrap(), "new");
    }

    #[test]
    fn test_insert_reuses_freed_slot_without_growing() {
        let table = ReaderTable::new();
        let a = table.insert(1_u8).unwrap();
        let b = table.insert(2_u8).unwrap();
        table.remove(a);

        let c = table.insert(3_u8).unwrap();

        assert_eq!(c.index, a.index);
        assert_ne!(c.index, b.index);
        assert_eq!(table.len(), 2);
        assert_eq!(*table.pin(c).unwrap(), 3);
    }

    #[test]
    fn test_remove_twice_is_none() {
        let table = ReaderTable::new();
        let id = table.insert(1_u8).unwrap();
        assert!(table.remove(id).is_some());
        assert!(table.remove(id).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_pin_keeps_reader_alive_across_remove() {
        let table = ReaderTable::new();
        let id = table.insert(String::from("payload")).unwrap();
        let pinned = table.pin(id).unwrap();
        let removed = table.remove(id).unwrap();

        // Table reference dropped, pin still holds the reader.
        drop(removed);
        assert_eq!(pinned.as_str(), "payload");
        pinned.unpin();
    }

    #[test]
    fn test_unknown_index_does_not_pin() {
        let table: ReaderTable<u8> = ReaderTable::new();
        assert!(table.pin(ReaderId::new(99, 0)).is_none());
    }
}
