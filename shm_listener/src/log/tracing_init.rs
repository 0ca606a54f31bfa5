// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use super::{DisplayPreference, TracingConfig, create_file_appender};
use miette::IntoDiagnostic;
use std::path::Path;
use tracing_core::LevelFilter;
use tracing_subscriber::{Layer, Registry, layer::SubscriberExt, registry::LookupSpan,
                         util::SubscriberInitExt};

/// Type alias for a boxed layer.
pub type DynLayer<S> = dyn Layer<S> + Send + Sync + 'static;

impl TracingConfig {
    /// Installs the layers as the process wide default subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file can't be opened or a global subscriber was
    /// already installed.
    pub fn install_global(self) -> miette::Result<()> {
        let layers = create_layers(&self)?;
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .into_diagnostic()
    }

    /// Installs the layers as the default subscriber for the current thread only, until
    /// the returned guard is dropped. Events emitted from the monitor thread are not
    /// captured by this.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file can't be opened.
    pub fn install_thread_local(
        self,
    ) -> miette::Result<tracing::subscriber::DefaultGuard> {
        let layers = create_layers(&self)?;
        Ok(tracing::subscriber::set_default(
            tracing_subscriber::registry().with(layers),
        ))
    }
}

/// Builds the layers for `config` without installing them. The level filter comes
/// first so it also applies to layers added later by the caller. Empty for
/// [`WriterConfig::None`].
///
/// # Errors
///
/// Returns an error if the log file can't be opened.
///
/// [`WriterConfig::None`]: super::WriterConfig::None
pub fn create_layers(
    config: &TracingConfig,
) -> miette::Result<Vec<Box<DynLayer<Registry>>>> {
    let mut layers: Vec<Box<DynLayer<Registry>>> = vec![];

    if let Some(preference) = config.display_preference() {
        layers.push(create_display_layer(config.level_filter, preference));
    }

    if let Some(path) = config.file_path() {
        layers.push(create_file_layer(config.level_filter, path)?);
    }

    if !layers.is_empty() {
        layers.insert(0, Box::new(config.level_filter));
    }

    Ok(layers)
}

/// This erases the concrete type of the writer, and returns a boxed layer.
pub fn create_display_layer<S>(
    level_filter: LevelFilter,
    preference: DisplayPreference,
) -> Box<DynLayer<S>>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let fmt_layer = tracing_subscriber::fmt::layer().with_thread_names(true);
    match preference {
        DisplayPreference::Stdout => Box::new(
            fmt_layer
                .with_writer(std::io::stdout)
                .with_filter(level_filter),
        ),
        DisplayPreference::Stderr => Box::new(
            fmt_layer
                .with_writer(std::io::stderr)
                .with_filter(level_filter),
        ),
    }
}

/// This erases the concrete type of the writer, and returns a boxed layer. ANSI colors
/// are off, since the output is a file.
///
/// # Errors
///
/// Returns an error if the file appender can't be created for `path`.
pub fn create_file_layer<S>(
    level_filter: LevelFilter,
    path: &Path,
) -> miette::Result<Box<DynLayer<S>>>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let file = create_file_appender(path)?;
    Ok(Box::new(
        tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file)
            .with_filter(level_filter),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WriterConfig;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_file_layer_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_temp_log_file.log");

        let layer: miette::Result<Box<DynLayer<Registry>>> =
            create_file_layer(LevelFilter::DEBUG, &path);

        assert!(layer.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_display_and_file_makes_three_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my_temp_log_file.log");

        let config = TracingConfig::display(DisplayPreference::Stdout).with_file(&path);
        let layers = create_layers(&config).unwrap();

        // Level filter, display, file.
        assert_eq!(layers.len(), 3);
        assert!(path.exists());
    }

    #[test]
    fn test_writer_config_none_creates_no_layers() {
        let config = TracingConfig {
            writer_config: WriterConfig::None,
            level_filter: LevelFilter::DEBUG,
        };
        assert!(create_layers(&config).unwrap().is_empty());
    }

    #[test]
    fn test_bad_file_path_is_an_error() {
        let config = TracingConfig::file(Some("/".into()));
        assert!(create_layers(&config).is_err());
    }

    #[test]
    #[serial]
    fn test_install_thread_local_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thread_local.log");

        let guard = TracingConfig::file(Some(path.clone()))
            .install_thread_local()
            .unwrap();
        tracing::warn!(message = "shm-listener: test event", reader_id = 7);
        tracing::trace!(message = "shm-listener: filtered out");
        drop(guard);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("shm-listener: test event"));
        assert!(contents.contains("reader_id=7"));
        assert!(!contents.contains("filtered out"));
    }
}
