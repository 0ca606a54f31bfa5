// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll kqueue iceoryx

//! # r3bl_shm_listener
//!
//! Bridges a blocking waitset to shared-memory subscriber readers. A dedicated monitor
//! thread blocks on the waitset (`epoll` on Linux, `kqueue` on macOS, via [`mio`]),
//! applies attach/detach requests that other threads queued while it was blocked, and
//! drains newly arrived chunks into per-reader callbacks.
//!
//! The moving parts:
//!
//! | Piece                       | Role                                                |
//! | :-------------------------- | :-------------------------------------------------- |
//! | [`ShmListener`]             | Public API: init, destroy, wake, (deferred) attach  |
//! | [`WakeupTrigger`]           | Interrupts a blocked wait from any thread           |
//! | [`PendingModifications`]    | Bounded attach/detach queue, drained between waits  |
//! | [`RunStateCell`]            | Atomic `Run → Stop → Stopped → NotRunning` state    |
//! | [`run_monitor_loop()`]      | The monitor thread: wait, dispatch, repeat          |
//! | [`ReaderRegistry`]          | Owns readers, resolves a [`ReaderId`] to a pin      |
//!
//! # Example
//!
//! ```no_run
//! # use r3bl_shm_listener::*;
//! # use std::{os::fd::RawFd, sync::Arc};
//! struct MyReader {
//!     fd: RawFd,
//! }
//!
//! impl ShmReader for MyReader {
//!     type Chunk = Vec<u8>;
//!     type Source = RawFd;
//!     fn event_source(&self) -> RawFd { self.fd }
//!     fn take_next_chunk(&self) -> Option<Vec<u8>> { None }
//!     fn on_data_available(&self, chunk: Vec<u8>) { println!("{} bytes", chunk.len()); }
//! }
//!
//! # fn main() -> miette::Result<()> {
//! let registry = Arc::new(ReaderTable::new());
//! let id = registry.insert(MyReader { fd: 0 })?;
//!
//! let mut listener = ShmListener::<MioWaitSetFactory, _>::init(
//!     ListenerConfig::default().with_capacity(16),
//!     Arc::clone(&registry),
//! )?;
//! listener.deferred_attach_reader(id)?;
//! // ...
//! listener.deferred_detach_reader(id)?;
//! listener.destroy()?;
//! # Ok(())
//! # }
//! ```
//!
//! Logging goes through [`tracing`]; see [`TracingConfig`] to install a subscriber.

// Enforce strict error handling in production library code only. Tests are allowed to use
// .unwrap() (workspace `Cargo.toml` config allows it).
#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

// Attach modules (re-exported below to provide clean public API).
pub mod common;
pub mod log;
pub mod shm_listener;

// Re-export.
pub use common::*;
pub use log::*;
pub use shm_listener::*;
