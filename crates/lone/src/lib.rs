//! Lone: the memory core of a small Lisp runtime.
//!
//! This is the facade crate that re-exports the public API of the lone
//! sub-crates. Reader and evaluator code usually only needs the
//! [`prelude`].
//!
//! # Quick start
//!
//! ```rust
//! use lone::prelude::*;
//!
//! let mut rt = Runtime::new(RuntimeConfig::new(512 * 1024)).unwrap();
//!
//! // (define greeting "hello") in the root module.
//! let module = rt.root_module();
//! let env = rt.module_environment(module).unwrap();
//! let name = rt.intern(b"greeting").unwrap();
//! let text = rt.text("hello").unwrap();
//! rt.table_set(env, name, text).unwrap();
//!
//! // Unreachable values are reclaimed; bound ones stay.
//! let scratch = rt.list(name, rt.nil()).unwrap();
//! let stats = rt.collect();
//! assert!(stats.freed_cells >= 1);
//! assert!(!rt.is_live(scratch));
//! assert_eq!(rt.byte_contents(text).unwrap(), b"hello");
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `lone-core` | Cell references, tags, FNV-1a |
//! | [`arena`] | `lone-arena` | Fixed-region block allocator |
//! | [`heap`] | `lone-heap` | Cells, collector, tables and the runtime |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Cell references, value tags and hashing (`lone-core`).
pub use lone_core as types;

/// The fixed-region allocator (`lone-arena`).
///
/// [`arena::Arena`] is usually reached through
/// [`heap::Runtime::arena`] rather than used directly.
pub use lone_arena as arena;

/// Cells, heaps, garbage collection and tables (`lone-heap`).
pub use lone_heap as heap;

/// Common imports for reader and evaluator code.
///
/// ```rust
/// use lone::prelude::*;
/// ```
pub mod prelude {
    // Handles
    pub use lone_core::{CellRef, PrimitiveId, Tag};

    // Runtime
    pub use lone_heap::{CycleStats, Runtime, RuntimeConfig, Value};

    // Errors
    pub use lone_arena::ArenaError;
    pub use lone_heap::{ConfigError, MemoryError};
}
