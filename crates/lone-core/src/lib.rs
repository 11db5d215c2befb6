//! Core identifiers and value tags for the lone runtime's memory core.
//!
//! This is the leaf crate in the lone dependency graph. It defines the
//! handles every other crate passes around:
//!
//! - [`CellRef`]: a one-word reference to a value cell, `(heap, slot)`.
//! - [`HeapId`]: the never-reused identifier of a heap of cells.
//! - [`Tag`]: the variant of a value cell.
//! - [`Fnv1a`]: the hash used for table keys.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod hash;
pub mod id;
pub mod tag;

pub use hash::{fnv1a, Fnv1a};
pub use id::{CellRef, HeapId, PrimitiveId};
pub use tag::Tag;
