//! Fixed-region allocator for the lone runtime.
//!
//! The whole runtime lives in one byte region obtained once at start-up.
//! [`Arena`] carves that region into blocks described by in-band headers
//! and hands out [`ArenaPtr`] payload offsets.
//!
//! # Layout
//!
//! ```text
//! region: [ hdr | payload ][ hdr | payload ][ hdr |  free  ] ...
//!           ^ 16 bytes: size|in-use, prev+1
//! ```
//!
//! - Blocks tile the region exactly, with no gaps and no overlaps.
//! - The next neighbor of a block is found at `offset + size`; the
//!   previous neighbor is linked from the header.
//! - Adjacent free blocks are always coalesced.
//! - Payloads are aligned to at least [`ALIGNMENT`] bytes relative to the
//!   region origin and are zero-filled when handed out.
//!
//! The region never grows. When no block fits, allocation fails with
//! [`ArenaError::OutOfMemory`] and the caller decides what to do; the
//! lone runtime collects garbage and retries once.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod block;
pub mod config;
pub mod error;
pub mod handle;

pub use arena::Arena;
pub use block::{BlockInfo, Blocks, ALIGNMENT, HEADER_BYTES, MIN_BLOCK_BYTES};
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use handle::ArenaPtr;
