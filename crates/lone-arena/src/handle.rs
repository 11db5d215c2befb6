//! Payload handles.
//!
//! An [`ArenaPtr`] is the byte offset of an allocation's payload within
//! the arena region. Offsets rather than native pointers keep the arena
//! free of `unsafe` and let handles be stored as plain words inside other
//! allocations (cell records, vector buffers, table entry arrays).

use std::fmt;
use std::num::NonZeroUsize;

use crate::block::HEADER_BYTES;

/// Handle to a live allocation's payload.
///
/// Never zero: every payload sits after a block header, which lets word 0
/// stand for "no buffer" wherever handles are stored as words.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct ArenaPtr(NonZeroUsize);

impl ArenaPtr {
    /// Handle for the payload of the block starting at `block`.
    pub(crate) fn for_block(block: usize) -> Self {
        Self(NonZeroUsize::MIN.saturating_add(block + HEADER_BYTES - 1))
    }

    /// Offset of the owning block's header, if the payload offset can
    /// belong to a block at all.
    pub(crate) fn block(self) -> Option<usize> {
        self.0.get().checked_sub(HEADER_BYTES)
    }

    /// Byte offset of the payload within the region.
    pub fn offset(self) -> usize {
        self.0.get()
    }

    /// Word form for storing a handle inside another allocation.
    pub fn to_word(self) -> u64 {
        self.0.get() as u64
    }

    /// Decode a stored word. `0` decodes to `None`.
    pub fn from_word(word: u64) -> Option<Self> {
        usize::try_from(word).ok().and_then(NonZeroUsize::new).map(Self)
    }
}

impl fmt::Display for ArenaPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}
