// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Generation-checked reader handle. See [`ReaderId`] for details.

use std::fmt::{Display, Formatter};

/// Opaque, non-owning handle to a reader, used as the per-event tag in the waitset.
///
/// It is never a reinterpreted address. A reader that is destroyed while it is still
/// attached (or still pending) leaves a dangling tag behind, and the only way to turn a
/// tag back into a reader is [`ReaderRegistry::pin`], which compares the `generation`
/// with the slot's current generation and returns `None` for stale handles.
///
/// # Token layout
///
/// ```text
/// 63            32 31             0
/// ┌──────────────┬────────────────┐
/// │  generation  │   index + 1    │
/// └──────────────┴────────────────┘
/// ```
///
/// The low half is offset by one because token `0` is reserved for the
/// [`WakeupTrigger`].
///
/// [`ReaderRegistry::pin`]: crate::ReaderRegistry::pin
/// [`WakeupTrigger`]: crate::WakeupTrigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReaderId {
    pub index: u32,
    pub generation: u32,
}

/// Token value reserved for the wakeup trigger. No [`ReaderId`] ever maps to it.
pub const WAKEUP_TOKEN: usize = 0;

impl ReaderId {
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self { Self { index, generation } }

    /// Packs this id into a waitset tag. Returns `None` on targets where `usize` is
    /// narrower than 64 bits, or for the one index that would overflow the offset.
    #[must_use]
    pub fn to_token(self) -> Option<usize> {
        let low = u64::from(self.index.checked_add(1)?);
        let packed = (u64::from(self.generation) << 32) | low;
        usize::try_from(packed).ok()
    }

    /// Inverse of [`Self::to_token`]. Returns `None` for [`WAKEUP_TOKEN`] and for any
    /// token whose low half is zero.
    #[must_use]
    pub fn from_token(token: usize) -> Option<Self> {
        let packed = u64::try_from(token).ok()?;
        #[allow(clippy::cast_possible_truncation)]
        let low = (packed & u64::from(u32::MAX)) as u32;
        #[allow(clippy::cast_possible_truncation)]
        let generation = (packed >> 32) as u32;
        let index = low.checked_sub(1)?;
        Some(Self { index, generation })
    }
}

impl Display for ReaderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}
