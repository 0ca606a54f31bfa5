// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll kqueue

//! A shared-memory waitset listener. One monitor thread per [`ShmListener`] blocks on a
//! waitset that multiplexes the event sources of many subscriber readers, plus one
//! software [`WakeupTrigger`] used to interrupt the wait.
//!
//! ```text
//!  ┌─────────────────┐   deferred_attach/detach   ┌──────────────────────────┐
//!  │ caller threads  │ ─────────────────────────► │ PendingModifications     │
//!  └────────┬────────┘                            │ (Mutex, 2 x capacity)    │
//!           │ trigger()                           └────────────┬─────────────┘
//!           ▼                                                  │ drain
//!  ┌─────────────────┐  Wakeup / Reader(id)       ┌────────────▼─────────────┐
//!  │ waitset         │ ─────────────────────────► │ monitor thread           │
//!  │ (epoll, kqueue) │ ◄───── attach / detach ─── │ pin → take_next_chunk    │
//!  └─────────────────┘                            │     → on_data_available  │
//!                                                 └──────────────────────────┘
//! ```
//!
//! Readers are never referenced by address. They are owned by a [`ReaderRegistry`] and
//! named by a generation-checked [`ReaderId`], which is also the waitset tag. A stale id
//! simply fails to [`pin()`].
//!
//! [`pin()`]: ReaderRegistry::pin

/// Turns the `shm-listener:` debug events on or off at compile time.
pub const DEBUG_SHM_LISTENER: bool = true;

// Attach sources.
pub mod event_dispatcher;
pub mod listener;
pub mod listener_config;
pub mod listener_error;
#[cfg(unix)]
pub mod mio_waitset;
pub mod monitor_thread;
pub mod pending_modifications;
pub mod reader_id;
pub mod reader_registry;
pub mod run_state;
pub mod shm_reader;
pub mod waitset_traits;

#[cfg(test)]
pub mod test_fixtures;

// Re-export.
pub use event_dispatcher::*;
pub use listener::*;
pub use listener_config::*;
pub use listener_error::*;
#[cfg(unix)]
pub use mio_waitset::*;
pub use monitor_thread::*;
pub use pending_modifications::*;
pub use reader_id::*;
pub use reader_registry::*;
pub use run_state::*;
pub use shm_reader::*;
pub use waitset_traits::*;
