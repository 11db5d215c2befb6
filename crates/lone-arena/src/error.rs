//! Arena-specific error types.

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    /// No free block is large enough for the request.
    #[error(
        "arena out of memory: requested {requested} bytes, largest free block {largest_free} bytes"
    )]
    OutOfMemory {
        /// Number of payload bytes requested.
        requested: usize,
        /// Payload capacity of the largest free block at the time of failure.
        largest_free: usize,
    },
    /// The pointer does not name a live allocation: it was never handed
    /// out, lies outside the region, or has already been freed.
    #[error("invalid arena pointer {offset:#x}")]
    InvalidPointer {
        /// The payload offset that was rejected.
        offset: usize,
    },
    /// Requested alignment is not a power of two.
    #[error("invalid alignment {alignment}: must be a power of two")]
    InvalidAlignment {
        /// The rejected alignment.
        alignment: usize,
    },
    /// The arena configuration or the supplied region is unusable.
    #[error("invalid arena configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with it.
        reason: String,
    },
    /// [`Arena::verify`](crate::Arena::verify) found a broken header or
    /// link.
    #[error("arena corrupted at block {offset:#x}: {reason}")]
    Corrupted {
        /// Offset of the offending block header.
        offset: usize,
        /// Which check failed.
        reason: &'static str,
    },
}
