//! Value cells, garbage collection and tables for the lone runtime.
//!
//! Every lone value is a fixed-size cell in one of a list of heaps carved
//! out of a [`lone_arena::Arena`]. Variable-length data (text, vector
//! elements, table entries) lives in separate arena buffers owned by the
//! cell.
//!
//! [`Runtime`] ties it together: it owns the arena, the heap list, the
//! collector and the roots, and exposes constructors and accessors that
//! work on [`CellRef`](lone_core::CellRef) handles. When the arena runs out,
//! the runtime runs a mark-sweep collection that traces precise roots and
//! conservatively scans the native stack, then retries the allocation once.
//!
//! # Example
//!
//! ```
//! use lone_heap::{Runtime, RuntimeConfig};
//!
//! let mut rt = Runtime::new(RuntimeConfig::new(256 * 1024)).unwrap();
//! let env = rt.table_create(8, None).unwrap();
//! rt.push_temporary_root(env).unwrap();
//!
//! let name = rt.intern(b"answer").unwrap();
//! let value = rt.integer(42).unwrap();
//! rt.table_set(env, name, value).unwrap();
//!
//! rt.collect();
//! let found = rt.table_get(env, name).unwrap().unwrap();
//! assert_eq!(rt.as_integer(found).unwrap(), 42);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod cell;
pub mod collector;
pub mod config;
pub mod error;
mod hash;
pub mod heap;
pub mod roots;
pub mod runtime;
pub mod scan;
pub mod stats;
pub mod table;
mod value;

pub use cell::{ByteSpan, CellHeader, TableData, Value, VectorData};
pub use collector::{Collector, Phase, RootSet};
pub use config::{ConfigError, RuntimeConfig};
pub use error::MemoryError;
pub use heap::HeapList;
pub use roots::{RootField, Roots, ROOT_FIELDS};
pub use runtime::Runtime;
pub use scan::StackRoots;
pub use stats::{CycleStats, GcStats};
pub use table::{ENTRY_BYTES, MIN_TABLE_CAPACITY};
