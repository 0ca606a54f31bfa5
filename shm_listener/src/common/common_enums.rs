// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// Control flow signal for loops and threads.
///
/// Used by the [monitor loop] to decide, after each fired event and after each wait
/// iteration, whether it should keep blocking on the waitset or exit.
///
/// [monitor loop]: crate::run_monitor_loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    /// Continue to the next iteration.
    #[default]
    Continue,

    /// Stop processing and exit the loop/thread.
    Stop,
}
