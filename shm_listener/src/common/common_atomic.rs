// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Extension trait for [`AtomicU8`] with ergonomic methods for common operations. See
//! [`AtomicU8Ext`] for details.
//!
//! [`AtomicU8`]: std::sync::atomic::AtomicU8

use std::sync::atomic::{AtomicU8, Ordering};

/// Ergonomic helpers for [`AtomicU8`] that hide [`SeqCst`] boilerplate.
///
/// All operations use [`SeqCst`] ordering so callers never have to choose. The
/// [`RunStateCell`] is built on top of this, since the monitor thread reads the run
/// state on every iteration while other threads write it during shutdown.
///
/// [`AtomicU8`]: std::sync::atomic::AtomicU8
/// [`RunStateCell`]: crate::RunStateCell
/// [`SeqCst`]: Ordering::SeqCst
pub trait AtomicU8Ext {
    /// Reads the current value.
    fn get(&self) -> u8;

    /// Writes `value`.
    fn set(&self, value: u8);

    /// Atomically replaces `current` with `new`. Returns the value that was actually
    /// stored before the call, whether or not the swap happened.
    fn swap_if(&self, current: u8, new: u8) -> Result<u8, u8>;
}

impl AtomicU8Ext for AtomicU8 {
    fn get(&self) -> u8 { self.load(Ordering::SeqCst) }

    fn set(&self, value: u8) { self.store(value, Ordering::SeqCst) }

    fn swap_if(&self, current: u8, new: u8) -> Result<u8, u8> {
        self.compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
    }
}
