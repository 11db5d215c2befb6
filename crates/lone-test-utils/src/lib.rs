//! Test utilities for lone development.
//!
//! Small-runtime constructors, object-graph [`fixtures`] and a reference
//! [`model`] of table semantics to check the real tables against.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod model;

use lone_heap::{Runtime, RuntimeConfig};
use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber that writes to the test harness's
/// captured output. Filtered by `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A runtime with `heap_capacity` cells per heap in a region of
/// `region_bytes`, so tests hit heap growth and exhaustion quickly.
pub fn small_runtime(heap_capacity: u32, region_bytes: usize) -> Runtime {
    Runtime::new(RuntimeConfig {
        heap_capacity,
        symbol_table_capacity: 16,
        environment_capacity: 4,
        ..RuntimeConfig::new(region_bytes)
    })
    .expect("test runtime config is valid")
}
