//! Errors surfaced by the runtime's memory API.

use lone_arena::{ArenaError, ArenaPtr};
use lone_core::{CellRef, Tag};

use crate::config::ConfigError;

/// Errors returned by [`Runtime`](crate::Runtime) operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// Allocation failed again after a full collection. Fatal: the caller
    /// is expected to abort.
    #[error(
        "memory exhausted after collection: requested {requested} bytes, \
         largest free block {largest_free} bytes"
    )]
    Exhausted {
        /// Number of bytes the failed allocation asked for.
        requested: usize,
        /// Largest free payload left in the arena.
        largest_free: usize,
    },
    /// A reference named a dead cell or no cell at all.
    #[error("cell {cell} is not live")]
    DeadCell {
        /// The offending reference.
        cell: CellRef,
    },
    /// A cell of one variant was passed where another was required.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Variant the operation needs.
        expected: Tag,
        /// Variant the cell holds.
        found: Tag,
    },
    /// A vector index past the element count.
    #[error("index {index} out of bounds for vector of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Current element count.
        len: usize,
    },
    /// A span was longer than the buffer it names.
    #[error("span of {len} bytes exceeds a {usable}-byte buffer")]
    SpanTooLong {
        /// Requested span length.
        len: usize,
        /// Usable payload bytes of the buffer.
        usable: usize,
    },
    /// A buffer handed to the runtime already belongs to a live cell.
    #[error("buffer {buffer} is owned by cell {cell}")]
    BufferOwned {
        /// The buffer.
        buffer: ArenaPtr,
        /// Its owner.
        cell: CellRef,
    },
    /// The runtime configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An arena operation failed for a reason other than exhaustion.
    #[error(transparent)]
    Arena(#[from] ArenaError),
}
