// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// A subscriber-side entity that receives chunks over the shared-memory transport.
///
/// The listener needs three things from a reader:
///
/// | Method                  | Used by                  | When                             |
/// | :---------------------- | :----------------------- | :------------------------------- |
/// | [`event_source()`]      | waitset registration     | attach (immediate or deferred)   |
/// | [`take_next_chunk()`]   | event dispatcher         | repeatedly, until `None`         |
/// | [`on_data_available()`] | event dispatcher         | once per chunk, in arrival order |
///
/// All three are called on a pinned reader, so the reader can't be destroyed while they
/// run.
///
/// [`event_source()`]: Self::event_source
/// [`on_data_available()`]: Self::on_data_available
/// [`take_next_chunk()`]: Self::take_next_chunk
pub trait ShmReader: Send + Sync + 'static {
    /// One discrete unit of payload.
    type Chunk;

    /// What the waitset watches for "has data" notifications. For the
    /// [`MioWaitSetFactory`] this is a raw fd.
    ///
    /// [`MioWaitSetFactory`]: crate::MioWaitSetFactory
    type Source;

    fn event_source(&self) -> Self::Source;

    /// Non-blocking. `None` means nothing more is available right now.
    fn take_next_chunk(&self) -> Option<Self::Chunk>;

    /// The data callback.
    fn on_data_available(&self, chunk: Self::Chunk);
}
