// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// Default maximum number of readers a single listener can watch.
pub const DEFAULT_MAX_READERS: usize = 128;

/// Default name of the monitor thread.
pub const DEFAULT_THREAD_NAME: &str = "shm-listener";

/// Fixed at [`ShmListener::init()`]; nothing here can change afterwards.
///
/// [`ShmListener::init()`]: crate::ShmListener::init
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Max readers (`MAX`). Sizes both pending queues and the waitset; the wakeup
    /// trigger takes one extra slot on top.
    pub capacity: usize,

    pub thread_name: String,

    /// `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAX_READERS,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stack_size: None,
        }
    }
}

impl ListenerConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    #[must_use]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }
}
