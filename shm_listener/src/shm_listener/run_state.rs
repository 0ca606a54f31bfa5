// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use crate::AtomicU8Ext as _;
use std::sync::atomic::AtomicU8;

/// Lifecycle of the monitor thread.
///
/// ```text
///  init ──► Run ──► Stop ──► Stopped ──► NotRunning
///   │        │                  ▲
///   │        └──(wait error)────┘
///   └──(spawn failure)──────────────────► NotRunning
/// ```
///
/// No backward transition exists; a listener is never restarted.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Termination requested, thread may still be finishing the current iteration.
    Stop = 0,
    /// Thread alive and polling.
    Run = 1,
    /// Thread loop exited, not yet joined.
    Stopped = 2,
    /// Inert: never started, or terminated and joined.
    NotRunning = 3,
}

impl RunState {
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Stop,
            1 => Self::Run,
            2 => Self::Stopped,
            _ => Self::NotRunning,
        }
    }
}

/// Atomic holder for [`RunState`]. The monitor thread reads it every iteration while
/// other threads write it during shutdown. All accesses are `SeqCst`.
#[derive(Debug)]
pub struct RunStateCell(AtomicU8);

impl RunStateCell {
    #[must_use]
    pub fn new(state: RunState) -> Self { Self(AtomicU8::new(state as u8)) }

    #[must_use]
    pub fn get(&self) -> RunState { RunState::from_u8(self.0.get()) }

    /// `Run → Stop`. Returns the state that was observed; any other state is left as
    /// is.
    pub fn request_stop(&self) -> RunState {
        match self.0.swap_if(RunState::Run as u8, RunState::Stop as u8) {
            Ok(prev) | Err(prev) => RunState::from_u8(prev),
        }
    }

    /// `Run | Stop → Stopped`. Called once by the monitor thread on its way out.
    pub fn mark_stopped(&self) {
        for from in [RunState::Stop, RunState::Run] {
            if self.0.swap_if(from as u8, RunState::Stopped as u8).is_ok() {
                return;
            }
        }
    }

    /// Terminal state. Only set after the monitor thread was joined (or never existed).
    pub fn mark_not_running(&self) { self.0.set(RunState::NotRunning as u8); }
}
