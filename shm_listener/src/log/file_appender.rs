// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::path::{Path, PathBuf};
use tracing_appender::rolling::RollingFileAppender;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FileAppenderError {
    #[error("Log file path {} has no parent folder", path.display())]
    #[diagnostic(
        code(r3bl_shm_listener::log::no_parent),
        help("Use a path like `/tmp/shm_listener.log`")
    )]
    NoParent { path: PathBuf },

    #[error("Log file path {} has no file name", path.display())]
    #[diagnostic(code(r3bl_shm_listener::log::no_file_name))]
    NoFileName { path: PathBuf },
}

/// Creates a file appender that never rotates. Writes are synchronous, so the last
/// events the monitor thread emits before exiting are never dropped. Don't wrap this in
/// [`tracing_appender::non_blocking()`] unless losing those is acceptable.
///
/// # Errors
///
/// [`FileAppenderError`] if `path` can't be split into a folder and a file name.
pub fn create_file_appender(
    path: impl AsRef<Path>,
) -> Result<RollingFileAppender, FileAppenderError> {
    let path = path.as_ref();

    let file_name = path.file_name().ok_or_else(|| FileAppenderError::NoFileName {
        path: path.to_path_buf(),
    })?;

    let parent = path.parent().ok_or_else(|| FileAppenderError::NoParent {
        path: path.to_path_buf(),
    })?;

    Ok(tracing_appender::rolling::never(parent, file_name))
}
