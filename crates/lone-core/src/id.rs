//! Strongly-typed identifiers for heaps, cells and native primitives.

use std::fmt;
use std::num::NonZeroU64;

/// Identifies one heap in the runtime's heap list.
///
/// Heap ids come from a monotonically increasing counter and are never
/// reused, so a reference into a released heap cannot alias a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(pub u32);

impl HeapId {
    /// Largest representable heap id. Ids are biased by one inside a
    /// [`CellRef`] word, so `u32::MAX` itself is unavailable.
    pub const MAX: HeapId = HeapId(u32::MAX - 1);

    /// The id following this one, or `None` once the id space is spent.
    pub fn next(self) -> Option<HeapId> {
        (self < Self::MAX).then(|| HeapId(self.0 + 1))
    }
}

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for HeapId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Reference to a value cell: a heap id and a slot within that heap.
///
/// A `CellRef` packs into a single 64-bit word as
/// `((heap + 1) << 32) | slot`. The bias keeps every valid reference
/// above `u32::MAX`, which leaves word 0 free to mean "no reference" in
/// table entry arrays and cell payloads, and keeps small integers from
/// resembling references during conservative scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CellRef(NonZeroU64);

impl CellRef {
    /// Build a reference to `slot` within `heap`.
    ///
    /// # Panics
    ///
    /// Panics if `heap` exceeds [`HeapId::MAX`].
    pub fn new(heap: HeapId, slot: u32) -> Self {
        assert!(heap <= HeapId::MAX, "heap id {heap} out of range");
        let word = ((u64::from(heap.0) + 1) << 32) | u64::from(slot);
        Self(NonZeroU64::MIN.saturating_add(word - 1))
    }

    /// Decode a reference from its word form. Returns `None` for words
    /// that cannot be a reference (zero, or no heap bits set).
    pub fn from_word(word: u64) -> Option<Self> {
        if word >> 32 == 0 {
            return None;
        }
        NonZeroU64::new(word).map(Self)
    }

    /// The word form stored in cell payloads and table entries.
    pub fn to_word(self) -> u64 {
        self.0.get()
    }

    /// The heap holding the referenced cell.
    pub fn heap(self) -> HeapId {
        HeapId(((self.0.get() >> 32) - 1) as u32)
    }

    /// Slot index of the referenced cell within its heap.
    pub fn slot(self) -> u32 {
        self.0.get() as u32
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.heap(), self.slot())
    }
}

/// Identifies a native primitive in the host's primitive table.
///
/// The memory core stores it opaquely in primitive cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId(pub u32);

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
