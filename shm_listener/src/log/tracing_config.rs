// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::path::PathBuf;
use tracing_core::LevelFilter;

pub const DEFAULT_LOG_FILE: &str = "shm_listener_debug.log";

/// Where listener events go, and how verbose they are. Nothing is installed until
/// [`TracingConfig::install_global()`] (once per process) or
/// [`TracingConfig::install_thread_local()`] (tests) is called. Without a subscriber
/// the listener's events are simply dropped.
///
/// ```no_run
/// # use r3bl_shm_listener::{DisplayPreference, TracingConfig};
/// # use tracing_core::LevelFilter;
/// TracingConfig::display(DisplayPreference::Stderr)
///     .with_file("/tmp/shm_listener.log")
///     .with_level_filter(LevelFilter::INFO)
///     .install_global()?;
/// # Ok::<(), miette::Report>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    pub writer_config: WriterConfig,
    pub level_filter: LevelFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterConfig {
    None,
    Display(DisplayPreference),
    File(PathBuf),
    DisplayAndFile(DisplayPreference, PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPreference {
    Stdout,
    Stderr,
}

impl Default for TracingConfig {
    fn default() -> Self { Self::display(DisplayPreference::Stderr) }
}

impl TracingConfig {
    #[must_use]
    pub fn display(preference: DisplayPreference) -> Self {
        Self {
            writer_config: WriterConfig::Display(preference),
            level_filter: LevelFilter::DEBUG,
        }
    }

    /// Logs to `path`, or [`DEFAULT_LOG_FILE`] in the working directory.
    #[must_use]
    pub fn file(path: Option<PathBuf>) -> Self {
        Self {
            writer_config: WriterConfig::File(
                path.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            ),
            level_filter: LevelFilter::DEBUG,
        }
    }

    /// Adds (or replaces) the log file, keeping any display output.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.writer_config = match self.writer_config {
            WriterConfig::Display(preference)
            | WriterConfig::DisplayAndFile(preference, _) => {
                WriterConfig::DisplayAndFile(preference, path)
            }
            WriterConfig::None | WriterConfig::File(_) => WriterConfig::File(path),
        };
        self
    }

    #[must_use]
    pub fn with_level_filter(mut self, level_filter: LevelFilter) -> Self {
        self.level_filter = level_filter;
        self
    }

    #[must_use]
    pub fn display_preference(&self) -> Option<DisplayPreference> {
        match &self.writer_config {
            WriterConfig::Display(preference)
            | WriterConfig::DisplayAndFile(preference, _) => Some(*preference),
            WriterConfig::None | WriterConfig::File(_) => None,
        }
    }

    #[must_use]
    pub fn file_path(&self) -> Option<&PathBuf> {
        match &self.writer_config {
            WriterConfig::File(path) | WriterConfig::DisplayAndFile(_, path) => Some(path),
            WriterConfig::None | WriterConfig::Display(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_default_is_stderr_at_debug() {
        let it = TracingConfig::default();
        assert_eq!(it.level_filter, LevelFilter::DEBUG);
        assert_eq!(it.display_preference(), Some(DisplayPreference::Stderr));
        assert_eq!(it.file_path(), None);
    }

    #[test]
    fn test_file_uses_default_name() {
        let it = TracingConfig::file(None).with_level_filter(LevelFilter::WARN);
        assert_eq!(it.level_filter, LevelFilter::WARN);
        assert_eq!(it.file_path(), Some(&PathBuf::from(DEFAULT_LOG_FILE)));
        assert_eq!(it.display_preference(), None);
    }

    #[test_case(WriterConfig::None, WriterConfig::File("a.log".into()))]
    #[test_case(
        WriterConfig::Display(DisplayPreference::Stdout),
        WriterConfig::DisplayAndFile(DisplayPreference::Stdout, "a.log".into())
    )]
    #[test_case(
        WriterConfig::DisplayAndFile(DisplayPreference::Stderr, "old.log".into()),
        WriterConfig::DisplayAndFile(DisplayPreference::Stderr, "a.log".into())
    )]
    fn test_with_file(before: WriterConfig, after: WriterConfig) {
        let it = TracingConfig {
            writer_config: before,
            level_filter: LevelFilter::DEBUG,
        }
        .with_file("a.log");
        assert_eq!(it.writer_config, after);
    }
}
